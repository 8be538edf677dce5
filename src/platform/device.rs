//! Microphone permission from the capture device nodes
//!
//! Permission is granted when a capture node (`pcmC<card>D<dev>c`) under
//! the device directory can be opened for reading.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tracing::debug;

use crate::error::PlatformError;
use crate::state::PermissionState;

use super::{CaptureStream, PermissionProvider};

/// Permission provider probing a device directory such as `/dev/snd`
pub struct DevicePermission {
    dir: PathBuf,
}

impl DevicePermission {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn capture_nodes(&self) -> Result<Vec<PathBuf>, PlatformError> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            PlatformError::Unavailable(format!("{}: {}", self.dir.display(), e))
        })?;

        let mut nodes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if is_capture_node(&entry.path()) {
                nodes.push(entry.path());
            }
        }
        nodes.sort();
        Ok(nodes)
    }

    async fn open_first(&self) -> Result<(PathBuf, File), PlatformError> {
        let nodes = self.capture_nodes().await?;
        if nodes.is_empty() {
            return Err(PlatformError::Unavailable(format!(
                "no capture device under {}",
                self.dir.display()
            )));
        }

        let mut last_error = None;
        for node in nodes {
            match File::open(&node).await {
                Ok(file) => return Ok((node, file)),
                Err(e) => {
                    debug!(node = %node.display(), error = %e, "capture node not readable");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(PlatformError::Denied(e.to_string()))
            }
            Some(e) => Err(e.into()),
            None => Err(PlatformError::Unavailable("no capture device".to_string())),
        }
    }
}

fn is_capture_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("pcmC") && name.ends_with('c'))
}

#[async_trait]
impl PermissionProvider for DevicePermission {
    async fn query(&self) -> Result<PermissionState, PlatformError> {
        match self.open_first().await {
            Ok(_) => Ok(PermissionState::Granted),
            Err(PlatformError::Denied(_)) => Ok(PermissionState::Denied),
            Err(PlatformError::Unavailable(reason)) if self.dir.is_dir() => {
                debug!(%reason, "no capture node, reporting prompt");
                Ok(PermissionState::Prompt)
            }
            Err(e) => Err(e),
        }
    }

    async fn open_capture(&self) -> Result<Box<dyn CaptureStream>, PlatformError> {
        let (node, file) = self.open_first().await?;
        Ok(Box::new(DeviceStream { node, file }))
    }
}

struct DeviceStream {
    node: PathBuf,
    file: File,
}

impl CaptureStream for DeviceStream {
    fn release(self: Box<Self>) {
        debug!(node = %self.node.display(), "capture stream released");
        drop(self.file);
    }
}
