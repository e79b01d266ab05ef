//! Configuration for the local processing service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`LocalProcessingService`](super::LocalProcessingService).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalServiceConfig {
    /// Path to the ImageMagick binary.
    #[serde(default = "default_magick_path")]
    pub magick_path: PathBuf,

    /// Timeout for one encoder invocation, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Directory for intermediate encoder output.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory where pasted images are persisted.
    #[serde(default = "default_paste_dir")]
    pub paste_dir: PathBuf,
}

fn default_magick_path() -> PathBuf {
    PathBuf::from("magick")
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("leap-compress")
}

fn default_paste_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for LocalServiceConfig {
    fn default() -> Self {
        Self {
            magick_path: default_magick_path(),
            timeout_secs: default_timeout(),
            work_dir: default_work_dir(),
            paste_dir: default_paste_dir(),
        }
    }
}

impl LocalServiceConfig {
    pub fn with_magick_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.magick_path = path.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_paste_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paste_dir = dir.into();
        self
    }
}
