//! macOS capture using an active CGEvent tap.
//!
//! The tap runs on its own CFRunLoop thread, which is the capture thread:
//! every callback converts the event, calls the handler synchronously and
//! turns the verdict into `Keep` or `Drop`. Requires Accessibility
//! permission.

use super::types::{CapturedEvent, Modifier, ModifierSet, SubKind, Verdict};
use super::CaptureError;
use crate::config::SourceConfig;
use crate::dispatcher::{EventHandler, TapAction, TapDisableReason};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, CallbackResult, EventField,
};
use crossbeam_channel::{bounded, Sender};
use foreign_types::ForeignType;
use std::ffi::c_void;
use std::os::raw::c_ulong;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventKeyboardGetUnicodeString(
        event: *const c_void,
        max_len: c_ulong,
        actual_len: *mut c_ulong,
        buffer: *mut u16,
    );
}

/// Longest composed string read from a key event.
const MAX_KEY_CHARS: usize = 16;

/// The macOS capture, owning the run loop thread.
pub struct EventTapCapture {
    handler: Arc<dyn EventHandler>,
    sources: SourceConfig,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl EventTapCapture {
    pub fn new(handler: Arc<dyn EventHandler>, sources: SourceConfig) -> Self {
        Self {
            handler,
            sources,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Register the tap and start the capture thread.
    ///
    /// Returns only once registration has succeeded or failed, so a missing
    /// permission is reported here rather than later.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = bounded(1);
        let handler = self.handler.clone();
        let running = self.running.clone();
        let sources = self.sources;

        let handle = thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let result = run_event_loop(handler, running.clone(), sources, ready_tx);
                if let Err(ref e) = result {
                    error!("capture loop ended: {e}");
                }
                running.store(false, Ordering::SeqCst);
                result
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::ThreadSpawn(e.to_string())
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::TapCreationFailed)
            }
        }
    }

    /// Stop the run loop and return how it ended.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        match self.thread_handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(CaptureError::TapDisabled)),
            None => Ok(()),
        }
    }

    /// Whether the capture thread is still servicing the tap.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for EventTapCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Build a list of event types to capture based on configuration.
fn build_event_types(sources: &SourceConfig) -> Vec<CGEventType> {
    let mut types = Vec::new();

    if sources.keyboard {
        types.push(CGEventType::KeyDown);
        types.push(CGEventType::KeyUp);
        types.push(CGEventType::FlagsChanged);
    }

    if sources.mouse {
        types.push(CGEventType::MouseMoved);
        types.push(CGEventType::LeftMouseDown);
        types.push(CGEventType::LeftMouseUp);
        types.push(CGEventType::RightMouseDown);
        types.push(CGEventType::RightMouseUp);
        types.push(CGEventType::OtherMouseDown);
        types.push(CGEventType::OtherMouseUp);
        types.push(CGEventType::LeftMouseDragged);
        types.push(CGEventType::RightMouseDragged);
        types.push(CGEventType::OtherMouseDragged);
        types.push(CGEventType::ScrollWheel);
    }

    types
}

/// Run the Core Graphics event loop on the current thread.
fn run_event_loop(
    handler: Arc<dyn EventHandler>,
    running: Arc<AtomicBool>,
    sources: SourceConfig,
    ready: Sender<Result<(), CaptureError>>,
) -> Result<(), CaptureError> {
    let control = Arc::new(TapControl::default());

    let callback = {
        let control = control.clone();
        move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| -> CallbackResult {
            let reason = match event_type {
                CGEventType::TapDisabledByTimeout => Some(TapDisableReason::Timeout),
                CGEventType::TapDisabledByUserInput => Some(TapDisableReason::UserInput),
                _ => None,
            };
            if let Some(reason) = reason {
                control.request(handler.on_tap_disabled(reason));
                // The callback runs on the tap's run loop; stopping it returns
                // control to the loop below at once.
                CFRunLoop::get_current().stop();
                return CallbackResult::Keep;
            }

            match convert_event(event_type, event).map(|captured| handler.on_event(captured)) {
                Some(Verdict::Suppress) => CallbackResult::Drop,
                Some(Verdict::Propagate) | None => CallbackResult::Keep,
            }
        }
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        build_event_types(&sources),
        callback,
    ) {
        Ok(tap) => tap,
        Err(_) => {
            let _ = ready.send(Err(CaptureError::TapCreationFailed));
            return Err(CaptureError::TapCreationFailed);
        }
    };

    let source = match tap.mach_port().create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = ready.send(Err(CaptureError::RunLoopSourceFailed));
            return Err(CaptureError::RunLoopSourceFailed);
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }

    tap.enable();
    let _ = ready.send(Ok(()));
    info!("event tap registered");

    while running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopCommonModes },
            Duration::from_millis(100),
            false,
        );

        match control.take() {
            Some(TapAction::Terminate) => return Err(CaptureError::TapDisabled),
            Some(TapAction::Reenable) => {
                tap.enable();
                info!("event tap re-enabled");
            }
            None => {}
        }
    }

    // The tap is automatically disabled when dropped
    Ok(())
}

/// Action requested by the tap callback, applied by the run loop thread.
#[derive(Debug, Default)]
struct TapControl {
    reenable: AtomicBool,
    terminate: AtomicBool,
}

impl TapControl {
    fn request(&self, action: TapAction) {
        match action {
            TapAction::Reenable => self.reenable.store(true, Ordering::SeqCst),
            TapAction::Terminate => self.terminate.store(true, Ordering::SeqCst),
        }
    }

    /// The pending action, if any. Termination wins over re-enabling.
    fn take(&self) -> Option<TapAction> {
        if self.terminate.load(Ordering::SeqCst) {
            Some(TapAction::Terminate)
        } else if self.reenable.swap(false, Ordering::SeqCst) {
            Some(TapAction::Reenable)
        } else {
            None
        }
    }
}

/// Convert a CGEvent into a [`CapturedEvent`]. Returns `None` for types
/// outside the registered mask.
fn convert_event(event_type: CGEventType, event: &CGEvent) -> Option<CapturedEvent> {
    use core_graphics::event::CGEventType::*;

    let location = event.location();
    let position = (location.x, location.y);

    let captured = match event_type {
        LeftMouseDown => CapturedEvent::pointer_button(SubKind::Down, 0, position),
        LeftMouseUp => CapturedEvent::pointer_button(SubKind::Up, 0, position),
        RightMouseDown => CapturedEvent::pointer_button(SubKind::Down, 1, position),
        RightMouseUp => CapturedEvent::pointer_button(SubKind::Up, 1, position),
        OtherMouseDown | OtherMouseUp => {
            let button = event.get_integer_value_field(EventField::MOUSE_EVENT_BUTTON_NUMBER);
            let subkind = if matches!(event_type, OtherMouseDown) {
                SubKind::Down
            } else {
                SubKind::Up
            };
            CapturedEvent::pointer_button(subkind, button, position)
        }
        MouseMoved | LeftMouseDragged | RightMouseDragged | OtherMouseDragged => {
            CapturedEvent::pointer_move(position)
        }
        ScrollWheel => {
            let delta =
                event.get_integer_value_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_1);
            CapturedEvent::scroll(delta, position)
        }
        KeyDown | KeyUp => {
            let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let subkind = if matches!(event_type, KeyDown) {
                SubKind::Down
            } else {
                SubKind::Up
            };
            CapturedEvent::key(
                subkind,
                keycode,
                composed_characters(event),
                position,
                modifiers_from_flags(event.get_flags()),
            )
        }
        FlagsChanged => {
            let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            CapturedEvent::modifier_change(keycode, position, modifiers_from_flags(event.get_flags()))
        }
        _ => return None,
    };

    Some(captured)
}

fn modifiers_from_flags(flags: CGEventFlags) -> ModifierSet {
    let mut set = ModifierSet::empty();
    let table = [
        (CGEventFlags::CGEventFlagCommand, Modifier::Cmd),
        (CGEventFlags::CGEventFlagShift, Modifier::Shift),
        (CGEventFlags::CGEventFlagControl, Modifier::Ctrl),
        (CGEventFlags::CGEventFlagAlternate, Modifier::Alt),
        (CGEventFlags::CGEventFlagSecondaryFn, Modifier::Fn),
        (CGEventFlags::CGEventFlagAlphaShift, Modifier::CapsLock),
    ];
    for (flag, modifier) in table {
        if flags.contains(flag) {
            set.insert(modifier);
        }
    }
    set
}

/// Characters the key event composed, as reported by the keyboard layout.
fn composed_characters(event: &CGEvent) -> String {
    let mut buffer = [0u16; MAX_KEY_CHARS];
    let mut len: c_ulong = 0;
    // Safety: the event pointer is valid for the duration of the callback and
    // the buffer length passed matches the buffer.
    unsafe {
        CGEventKeyboardGetUnicodeString(
            event.as_ptr() as *const c_void,
            MAX_KEY_CHARS as c_ulong,
            &mut len,
            buffer.as_mut_ptr(),
        );
    }
    let len = (len as usize).min(MAX_KEY_CHARS);
    String::from_utf16_lossy(&buffer[..len])
}

/// Check whether an active event tap can be registered.
///
/// macOS has no direct query for the Accessibility grant; creating a tap
/// fails when it is missing.
pub fn check_permission() -> bool {
    let result = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    );

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types_follow_sources() {
        let keyboard_only = SourceConfig {
            keyboard: true,
            mouse: false,
        };
        assert_eq!(build_event_types(&keyboard_only).len(), 3);
        assert_eq!(build_event_types(&SourceConfig::default()).len(), 14);
    }

    #[test]
    fn test_tap_control_hands_over_each_reenable_once() {
        let control = TapControl::default();
        assert_eq!(control.take(), None);

        control.request(TapAction::Reenable);
        assert_eq!(control.take(), Some(TapAction::Reenable));
        assert_eq!(control.take(), None);

        control.request(TapAction::Reenable);
        control.request(TapAction::Terminate);
        assert_eq!(control.take(), Some(TapAction::Terminate));
        assert_eq!(control.take(), Some(TapAction::Terminate));
    }

    #[test]
    fn test_modifiers_from_flags() {
        let flags = CGEventFlags::CGEventFlagCommand | CGEventFlags::CGEventFlagShift;
        let set = modifiers_from_flags(flags);
        assert!(set.contains(Modifier::Cmd));
        assert!(set.contains(Modifier::Shift));
        assert!(!set.contains(Modifier::Alt));
    }
}
