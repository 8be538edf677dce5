//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000/";
const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SYNTHESIZER: &str = "espeak-ng";
const DEFAULT_PLAYER: &str = "ffplay -nodisp -autoexit -loglevel error";
const DEFAULT_CAPTURE_DEVICE: &str = "/dev/snd";

/// A program and its leading arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    fn parse(value: &str) -> Option<Self> {
        let mut words = value.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the text-processing backend
    pub backend_url: Url,

    /// Upper bound on one backend call
    pub resolve_timeout: Duration,

    /// Speech recognizer; `None` means recognition is unsupported
    pub recognizer: Option<CommandLine>,

    /// Speech synthesizer program
    pub synthesizer: String,

    /// Media player for delivered audio
    pub player: CommandLine,

    /// Directory holding the capture device nodes
    pub capture_device: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("shevanta");

        let socket_path = data_dir.join("daemon.sock");

        let backend_url = backend_url(
            &lookup("SHEVANTA_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
        )?;

        let resolve_timeout = match lookup("SHEVANTA_RESOLVE_TIMEOUT_SECS") {
            Some(secs) => {
                let secs: u64 = secs
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid SHEVANTA_RESOLVE_TIMEOUT_SECS: {secs}"))?;
                if secs == 0 {
                    bail!("SHEVANTA_RESOLVE_TIMEOUT_SECS must be positive");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_RESOLVE_TIMEOUT_SECS),
        };

        let recognizer = lookup("SHEVANTA_RECOGNIZER").and_then(|v| CommandLine::parse(&v));

        let synthesizer = lookup("SHEVANTA_SYNTHESIZER")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYNTHESIZER.to_string());

        let player = lookup("SHEVANTA_PLAYER")
            .and_then(|v| CommandLine::parse(&v))
            .or_else(|| CommandLine::parse(DEFAULT_PLAYER))
            .context("no media player configured")?;

        let capture_device = lookup("SHEVANTA_CAPTURE_DEVICE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CAPTURE_DEVICE));

        Ok(Self {
            backend_url,
            resolve_timeout,
            recognizer,
            synthesizer,
            player,
            capture_device,
            socket_path,
            data_dir,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Parse the backend base, making sure relative joins keep its path
fn backend_url(value: &str) -> Result<Url> {
    let mut url =
        Url::parse(value.trim()).with_context(|| format!("invalid SHEVANTA_BACKEND_URL: {value}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("SHEVANTA_BACKEND_URL must be http or https, got {}", url.scheme());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
