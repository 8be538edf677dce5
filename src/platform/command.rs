//! Capability providers backed by external programs
//!
//! Each provider spawns one child process per request. Children are
//! spawned with `kill_on_drop`, so dropping a request future also halts
//! the child.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PlatformError;
use crate::state::AudioRef;

use super::{
    MediaPlayer, RecognitionError, RecognitionOptions, SpeechRecognizer, SpeechSynthesizer,
    SpeechUtterance,
};

/// `EX_NOPERM` from sysexits.h
const EXIT_NO_PERMISSION: i32 = 77;

/// espeak-ng's default speaking rate in words per minute
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Runs a recognizer program and reads the transcript from its stdout
///
/// The recognition settings are passed as `SHEVANTA_LANG`,
/// `SHEVANTA_CONTINUOUS` and `SHEVANTA_INTERIM_RESULTS`. Exit code 77
/// means microphone access was refused; empty output means no speech.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for CommandRecognizer {
    async fn recognize(
        &self,
        options: &RecognitionOptions,
        stop: CancellationToken,
    ) -> Result<Option<String>, RecognitionError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env("SHEVANTA_LANG", options.lang)
            .env("SHEVANTA_CONTINUOUS", flag(options.continuous))
            .env("SHEVANTA_INTERIM_RESULTS", flag(options.interim_results))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecognitionError::Failed(format!("{}: {}", self.program, e)))?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| RecognitionError::Failed(e.to_string()))?
            }
            _ = stop.cancelled() => {
                debug!("recognizer stopped before producing a transcript");
                return Ok(None);
            }
        };

        if output.status.code() == Some(EXIT_NO_PERMISSION) {
            return Err(RecognitionError::NotAllowed);
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => output.status.to_string(),
                message => message.to_string(),
            };
            return Err(RecognitionError::Failed(reason));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(RecognitionError::NoSpeech);
        }
        Ok(Some(transcript))
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Speaks through an espeak-ng compatible program
pub struct CommandSynthesizer {
    program: String,
    halt: Notify,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            halt: Notify::new(),
        }
    }

    fn command_for(&self, utterance: &SpeechUtterance) -> Command {
        let voice = utterance.lang.split('-').next().unwrap_or(utterance.lang);
        let pitch = (utterance.pitch / 2.0 * 99.0).round().clamp(0.0, 99.0) as u32;
        let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).round().max(80.0) as u32;
        let amplitude = (utterance.volume * 100.0).round().clamp(0.0, 200.0) as u32;

        let mut command = Command::new(&self.program);
        command
            .arg("-v")
            .arg(voice)
            .arg("-p")
            .arg(pitch.to_string())
            .arg("-s")
            .arg(words_per_minute.to_string())
            .arg("-a")
            .arg(amplitude.to_string())
            .arg(&utterance.text);
        command
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, utterance: &SpeechUtterance) -> Result<(), PlatformError> {
        run_until_halted(self.command_for(utterance), &self.halt).await
    }

    async fn cancel(&self) {
        self.halt.notify_waiters();
    }
}

/// Plays URLs and files through an ffplay compatible program
///
/// `args` go before the source, e.g. `-nodisp -autoexit`.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    halt: Notify,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            halt: Notify::new(),
        }
    }
}

#[async_trait]
impl MediaPlayer for CommandPlayer {
    async fn play(&self, source: &AudioRef) -> Result<(), PlatformError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(source.as_str());
        run_until_halted(command, &self.halt).await
    }

    async fn stop(&self) {
        self.halt.notify_waiters();
    }
}

/// Run `command` to completion, or kill it once `halt` is notified
async fn run_until_halted(mut command: Command, halt: &Notify) -> Result<(), PlatformError> {
    let halted = halt.notified();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                Err(PlatformError::Exited(status.to_string()))
            }
        }
        _ = halted => {
            debug!("halting child process");
            let _ = child.kill().await;
            Ok(())
        }
    }
}
