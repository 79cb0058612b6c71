//! Window metadata from the Quartz window server (`CGWindowListCopyWindowInfo`).

use super::{AppInfo, Bounds, WindowInfo, WindowSource, UNKNOWN_NAME, UNKNOWN_NUMBER};
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly,
};
use tracing::trace;

type WindowDict = CFDictionary<CFString, CFType>;

/// Layer of ordinary application windows.
const NORMAL_WINDOW_LAYER: i64 = 0;

/// Reads on-screen windows from the window server.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuartzWindowSource;

impl QuartzWindowSource {
    fn window_dicts(&self) -> Vec<WindowDict> {
        let Some(array) = copy_window_info(
            kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
            kCGNullWindowID,
        ) else {
            trace!("window list unavailable");
            return Vec::new();
        };

        array
            .get_all_values()
            .into_iter()
            .filter(|ptr| !ptr.is_null())
            // Safety: every element of the window list is a CFDictionary, and
            // the get rule retains it for the lifetime of the wrapper.
            .map(|ptr| unsafe { WindowDict::wrap_under_get_rule(ptr as CFDictionaryRef) })
            .collect()
    }

    /// Frontmost normal window and its owner's pid.
    fn front_window(&self) -> Option<(WindowInfo, i64)> {
        self.window_dicts().iter().find_map(|dict| {
            let info = window_from_dict(dict);
            (info.layer == NORMAL_WINDOW_LAYER).then(|| (info, number(dict, "kCGWindowOwnerPID")))
        })
    }
}

impl WindowSource for QuartzWindowSource {
    fn active_window(&self) -> Option<WindowInfo> {
        self.front_window().map(|(info, _)| info)
    }

    fn all_windows(&self) -> Vec<WindowInfo> {
        self.window_dicts().iter().map(window_from_dict).collect()
    }

    fn frontmost_app(&self) -> Option<AppInfo> {
        self.front_window().map(|(info, pid)| AppInfo {
            name: info.owner_name,
            pid,
        })
    }
}

fn window_from_dict(dict: &WindowDict) -> WindowInfo {
    WindowInfo {
        owner_name: string(dict, "kCGWindowOwnerName"),
        title: string(dict, "kCGWindowName"),
        window_id: number(dict, "kCGWindowNumber"),
        layer: number(dict, "kCGWindowLayer"),
        bounds: bounds(dict).unwrap_or_else(Bounds::unknown),
        memory_usage: number(dict, "kCGWindowMemoryUsage"),
    }
}

fn string(dict: &WindowDict, key: &'static str) -> String {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFString>())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

fn number(dict: &WindowDict, key: &'static str) -> i64 {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFNumber>())
        .and_then(|n| n.to_i64())
        .unwrap_or(UNKNOWN_NUMBER)
}

fn float(dict: &WindowDict, key: &'static str) -> Option<f64> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFNumber>())
        .and_then(|n| n.to_f64())
}

fn bounds(dict: &WindowDict) -> Option<Bounds> {
    let value = dict.find(CFString::from_static_string("kCGWindowBounds"))?;
    if !value.instance_of::<WindowDict>() {
        return None;
    }
    // Safety: type checked above; the get rule retains the nested dictionary.
    let rect = unsafe { WindowDict::wrap_under_get_rule(value.as_CFTypeRef() as CFDictionaryRef) };
    Some(Bounds {
        x: float(&rect, "X")?,
        y: float(&rect, "Y")?,
        width: float(&rect, "Width")?,
        height: float(&rect, "Height")?,
    })
}
