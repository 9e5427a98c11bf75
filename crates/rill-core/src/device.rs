//! Device state feeding the representation chooser
//!
//! The embedding layer reports viewport size and document visibility;
//! both are published on last-value-cached watch channels.

use tokio::sync::watch;
use tracing::debug;

/// Source of viewport-width and visibility edges
#[derive(Debug)]
pub struct DeviceMonitor {
    width_tx: watch::Sender<Option<u32>>,
    visible_tx: watch::Sender<bool>,
}

impl DeviceMonitor {
    pub fn new() -> Self {
        let (width_tx, _) = watch::channel(None);
        let (visible_tx, _) = watch::channel(true);
        Self { width_tx, visible_tx }
    }

    /// Report the viewport width in device pixels; `None` lifts the limit
    pub fn set_viewport_width(&self, width: Option<u32>) {
        debug!(?width, "Viewport width changed");
        self.width_tx.send_replace(width);
    }

    /// Report document visibility
    pub fn set_visible(&self, visible: bool) {
        debug!(visible, "Visibility changed");
        self.visible_tx.send_replace(visible);
    }

    pub fn width_watch(&self) -> watch::Receiver<Option<u32>> {
        self.width_tx.subscribe()
    }

    pub fn visibility_watch(&self) -> watch::Receiver<bool> {
        self.visible_tx.subscribe()
    }

    pub fn viewport_width(&self) -> Option<u32> {
        *self.width_tx.borrow()
    }

    pub fn is_visible(&self) -> bool {
        *self.visible_tx.borrow()
    }
}

impl Default for DeviceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
