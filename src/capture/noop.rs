//! Non-macOS stub of the capture layer.
//!
//! This exists so the crate (and binary) can compile on non-Apple targets
//! without pulling in CoreGraphics/CoreFoundation dependencies.

use super::CaptureError;
use crate::config::SourceConfig;
use crate::dispatcher::EventHandler;
use std::sync::Arc;

/// A capture that can never be registered.
pub struct NoopCapture {
    _handler: Arc<dyn EventHandler>,
    _sources: SourceConfig,
}

impl NoopCapture {
    pub fn new(handler: Arc<dyn EventHandler>, sources: SourceConfig) -> Self {
        Self {
            _handler: handler,
            _sources: sources,
        }
    }

    /// Always fails: there is no event tap on this platform.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported)
    }

    pub fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        false
    }
}

/// There is no tap to register here.
pub fn check_permission() -> bool {
    false
}
