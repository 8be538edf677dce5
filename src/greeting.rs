//! Startup greeting
//!
//! The pre-generated greeting audio is fetched once before the dialogue
//! loop starts. When it cannot be fetched the greeting is synthesized.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::state::{AudioRef, Origin, Response};

pub const GREETING_TEXT: &str =
    "नमस्कार! मी शेवंता आहे. तुम्ही माझ्याशी बोलू शकता. मी तुमच्या आवाजाला उत्तर देईन.";

/// Greeting asset, relative to the backend base URL
pub const GREETING_ASSET_PATH: &str = "shevanta_greeting.wav";

/// The greeting response, with its audio when the asset is available
pub fn greeting_response(audio: Option<AudioRef>) -> Response {
    Response::from_parts(GREETING_TEXT.to_string(), audio, Origin::Backend)
}

/// Download the greeting asset into `data_dir`
///
/// Returns `None` when the asset is unavailable for any reason.
pub async fn prefetch(client: &reqwest::Client, base: &Url, data_dir: &Path) -> Option<AudioRef> {
    match download(client, base, data_dir).await {
        Ok(path) => {
            info!(path = %path.display(), "greeting audio cached");
            Some(AudioRef::new(path.to_string_lossy()))
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "greeting audio unavailable, will synthesize");
            None
        }
    }
}

async fn download(client: &reqwest::Client, base: &Url, data_dir: &Path) -> Result<PathBuf> {
    let url = base
        .join(GREETING_ASSET_PATH)
        .context("invalid greeting asset URL")?;

    let bytes = client
        .get(url)
        .send()
        .await
        .context("greeting request failed")?
        .error_for_status()
        .context("greeting request rejected")?
        .bytes()
        .await
        .context("greeting download interrupted")?;
    if bytes.is_empty() {
        anyhow::bail!("greeting asset is empty");
    }

    tokio::fs::create_dir_all(data_dir)
        .await
        .context("failed to create data directory")?;
    let path = data_dir.join(GREETING_ASSET_PATH);
    tokio::fs::write(&path, &bytes)
        .await
        .context("failed to store greeting audio")?;
    Ok(path)
}
