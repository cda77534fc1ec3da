//! macOS CGEventTap backend
//!
//! Installs an active (modifying) session-level tap at the head of the
//! tap list and attaches it to the calling thread's CFRunLoop. The
//! callback runs on that run loop and must never block.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use core_foundation::base::TCFType;
use core_foundation::mach_port::CFMachPortRef;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop, CFRunLoopSource};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use tracing::trace;

use super::controller::{HookBackend, HookError};
use super::keys::{EventKind, KeyEvent, ModifierFlags};
use super::router::{Disposition, KeyRouter};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventTapIsEnabled(tap: CFMachPortRef) -> bool;
}

/// A tap registered with a run loop
pub struct InstalledTap {
    tap: CGEventTap<'static>,
    source: CFRunLoopSource,
    run_loop: CFRunLoop,
}

impl InstalledTap {
    fn port(&self) -> CFMachPortRef {
        self.tap.mach_port.as_concrete_TypeRef()
    }
}

/// Event tap backed by `CGEventTapCreate`
#[derive(Debug, Default)]
pub struct CgEventTapBackend;

impl HookBackend for CgEventTapBackend {
    type Hook = InstalledTap;

    fn install(&mut self, router: Rc<RefCell<KeyRouter>>) -> Result<InstalledTap, HookError> {
        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
            ],
            move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| {
                handle_cg_event(&router, event_type, event)
            },
        )
        .map_err(|_| HookError::Create)?;

        let source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HookError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        // SAFETY: kCFRunLoopCommonModes is an immutable framework constant
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
        }

        let installed = InstalledTap {
            tap,
            source,
            run_loop,
        };
        // SAFETY: the mach port is owned by `installed` and still valid
        unsafe { CGEventTapEnable(installed.port(), true) };

        Ok(installed)
    }

    fn is_enabled(&self, hook: &InstalledTap) -> bool {
        // SAFETY: the mach port is owned by `hook` and still valid
        unsafe { CGEventTapIsEnabled(hook.port()) }
    }

    fn remove(&mut self, hook: InstalledTap) {
        // SAFETY: the port stays valid until `hook` is dropped at scope end
        unsafe {
            CGEventTapEnable(hook.port(), false);
            hook.run_loop.remove_source(&hook.source, kCFRunLoopCommonModes);
        }
    }
}

/// Tap callback body: translate, route, and write back any flag rewrite
fn handle_cg_event(
    router: &RefCell<KeyRouter>,
    event_type: CGEventType,
    event: &CGEvent,
) -> Option<CGEvent> {
    let kind = match event_type {
        CGEventType::KeyDown => EventKind::KeyDown,
        CGEventType::KeyUp => EventKind::KeyUp,
        CGEventType::FlagsChanged => EventKind::FlagsChanged,
        CGEventType::TapDisabledByTimeout => {
            if let Ok(router) = router.try_borrow() {
                router.tap_disabled("timeout");
            }
            return Some(event.clone());
        }
        CGEventType::TapDisabledByUserInput => {
            if let Ok(router) = router.try_borrow() {
                router.tap_disabled("user input");
            }
            return Some(event.clone());
        }
        _ => return Some(event.clone()),
    };

    let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
    let key_event = KeyEvent {
        kind,
        keycode,
        flags: ModifierFlags::from_bits_retain(event.get_flags().bits()),
    };

    // A re-entrant delivery is passed through untouched rather than risking
    // a panic on the event path.
    let disposition = match router.try_borrow_mut() {
        Ok(mut router) => router.route(&key_event, Instant::now()),
        Err(_) => Disposition::PassThrough,
    };

    if let Disposition::Rewrite(flags) = disposition {
        trace!(keycode, flags = flags.bits(), "rewriting event flags");
        event.set_flags(CGEventFlags::from_bits_truncate(flags.bits()));
    }

    Some(event.clone())
}
