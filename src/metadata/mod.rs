//! Active application and window metadata.
//!
//! Queries are plain reads of OS window state. They take no arbiter locks and
//! never fail as a whole: attributes the OS withholds (window titles without
//! Screen Recording permission, for instance) are replaced by
//! [`UNKNOWN_NAME`] and [`UNKNOWN_NUMBER`].

use serde::{Deserialize, Serialize};

#[cfg(target_os = "macos")]
pub mod macos;

/// Sentinel for a missing string attribute.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Sentinel for a missing numeric attribute.
pub const UNKNOWN_NUMBER: i64 = -1;

/// Screen rectangle of a window, in global display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn unknown() -> Self {
        let n = UNKNOWN_NUMBER as f64;
        Self {
            x: n,
            y: n,
            width: n,
            height: n,
        }
    }
}

/// Snapshot of one on-screen window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub owner_name: String,
    pub title: String,
    pub window_id: i64,
    pub layer: i64,
    pub bounds: Bounds,
    pub memory_usage: i64,
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self {
            owner_name: UNKNOWN_NAME.to_string(),
            title: UNKNOWN_NAME.to_string(),
            window_id: UNKNOWN_NUMBER,
            layer: UNKNOWN_NUMBER,
            bounds: Bounds::unknown(),
            memory_usage: UNKNOWN_NUMBER,
        }
    }
}

/// Snapshot of the frontmost application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub pid: i64,
}

/// Source of window metadata.
pub trait WindowSource: Send + Sync {
    /// The window that currently has focus, if any.
    fn active_window(&self) -> Option<WindowInfo>;

    /// All on-screen windows, front to back.
    fn all_windows(&self) -> Vec<WindowInfo>;

    /// The application owning the focused window.
    fn frontmost_app(&self) -> Option<AppInfo>;
}

/// A source that reports no windows, used where window listing is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWindows;

impl WindowSource for NoWindows {
    fn active_window(&self) -> Option<WindowInfo> {
        None
    }

    fn all_windows(&self) -> Vec<WindowInfo> {
        Vec::new()
    }

    fn frontmost_app(&self) -> Option<AppInfo> {
        None
    }
}

/// The window source for the current platform.
#[cfg(target_os = "macos")]
pub fn platform_source() -> Box<dyn WindowSource> {
    Box::new(macos::QuartzWindowSource)
}

/// The window source for the current platform.
#[cfg(not(target_os = "macos"))]
pub fn platform_source() -> Box<dyn WindowSource> {
    Box::new(NoWindows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_uses_sentinels() {
        let window = WindowInfo::default();
        assert_eq!(window.owner_name, "Unknown");
        assert_eq!(window.window_id, -1);
        assert_eq!(window.bounds.width, -1.0);
    }

    #[test]
    fn test_window_json_field_names() {
        let json = serde_json::to_value(WindowInfo::default()).unwrap();
        assert_eq!(json["ownerName"], "Unknown");
        assert_eq!(json["windowId"], -1);
        assert_eq!(json["memoryUsage"], -1);
        assert!(json["bounds"].is_object());
    }
}
