//! Session configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration.

use crate::codec::WireCodec;
use crate::error::Result;
use mm_core::layout::Placement;
use mm_core::viewport::ZoomLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period before a content update is broadcast.
    pub debounce_ms: u64,
    /// Quiet period before the tree is saved.
    pub save_debounce_ms: u64,
    pub codec: WireCodec,
    pub relay_addr: String,
    pub placement: Placement,
    pub zoom: ZoomLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            save_debounce_ms: 1000,
            codec: WireCodec::Json,
            relay_addr: "127.0.0.1:7878".to_owned(),
            placement: Placement::default(),
            zoom: ZoomLimits::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}
