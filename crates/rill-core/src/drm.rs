//! DRM session handle
//!
//! License exchange and key handling belong to the external DRM layer.
//! The controller owns one session per protected content; the session
//! relays key status updates and its lifetime bounds the keys' use.

use crate::error::{Error, Result};
use crate::types::KeySystemConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

/// Status of the active content keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// License request in flight
    Pending,
    /// Keys available, decryption may proceed
    Usable,
    /// License expired; a renewal may recover
    Expired,
    /// Session closed; keys unusable
    Closed,
}

/// One DRM session, lifetime bound to one content
#[derive(Debug)]
pub struct DrmSession {
    config: KeySystemConfig,
    status_tx: watch::Sender<KeyStatus>,
}

impl DrmSession {
    /// Pick the first requested key system and open a session for it
    pub fn initialize(key_systems: &[KeySystemConfig]) -> Result<Self> {
        let config = key_systems.first().cloned().ok_or(Error::KeySystemUnsupported {
            system: "none requested".to_string(),
        })?;
        info!(key_system = %config.key_system, "DRM session opened");
        let (status_tx, _) = watch::channel(KeyStatus::Pending);
        Ok(Self { config, status_tx })
    }

    pub fn key_system(&self) -> &KeySystemConfig {
        &self.config
    }

    pub fn status_watch(&self) -> watch::Receiver<KeyStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> KeyStatus {
        *self.status_tx.borrow()
    }

    /// Fed by the external DRM layer; closed sessions ignore updates
    pub fn update_status(&self, status: KeyStatus) {
        if self.status() == KeyStatus::Closed {
            return;
        }
        debug!(?status, "Key status updated");
        self.status_tx.send_replace(status);
    }

    /// Idempotent teardown
    pub fn close(&self) {
        if self.status() != KeyStatus::Closed {
            info!(key_system = %self.config.key_system, "DRM session closed");
            self.status_tx.send_replace(KeyStatus::Closed);
        }
    }
}

impl Drop for DrmSession {
    fn drop(&mut self) {
        self.close();
    }
}
