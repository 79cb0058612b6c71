//! OS capture layer.
//!
//! The macOS binding registers an active CoreGraphics event tap and hands
//! every event to an [`EventHandler`](crate::dispatcher::EventHandler). Other
//! platforms get a stub whose `start` reports [`CaptureError::Unsupported`].

pub mod keys;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

// Re-export commonly used types
pub use types::{CapturedEvent, EventKind, EventPayload, Modifier, ModifierSet, SubKind, Verdict};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, EventTapCapture};

/// Platform-agnostic capture type alias
#[cfg(target_os = "macos")]
pub type Capture = EventTapCapture;

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, NoopCapture};

/// Platform-agnostic capture type alias
#[cfg(not(target_os = "macos"))]
pub type Capture = NoopCapture;

/// Errors that can occur while registering or running the capture.
#[derive(Debug)]
pub enum CaptureError {
    AlreadyRunning,
    TapCreationFailed,
    RunLoopSourceFailed,
    /// The OS kept disabling the tap and the re-enable budget ran out.
    TapDisabled,
    ThreadSpawn(String),
    Unsupported,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::AlreadyRunning => write!(f, "Capture is already running"),
            CaptureError::TapCreationFailed => write!(
                f,
                "Failed to create CGEvent tap (is Accessibility permission granted?)"
            ),
            CaptureError::RunLoopSourceFailed => {
                write!(f, "Failed to create run loop source")
            }
            CaptureError::TapDisabled => {
                write!(f, "Event tap was disabled by the OS and could not be kept alive")
            }
            CaptureError::ThreadSpawn(e) => write!(f, "Failed to spawn capture thread: {e}"),
            CaptureError::Unsupported => {
                write!(f, "System-wide input capture is not supported on this platform")
            }
        }
    }
}

impl std::error::Error for CaptureError {}
