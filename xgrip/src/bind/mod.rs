//! Grab bookkeeping shared by key and button bindings.
use std::sync::{Arc, Mutex};

use x11rb::protocol::xproto::{ModMask, Window};
use xgrip_core::config::IGNORED_MODIFIER_COMBINATIONS;

use crate::bind::registry::{BindingKey, BindingRegistry};
use crate::callback::Callback;
use crate::error::{Error, Result};
use crate::x11::event::{Event, EventKind};
use crate::xutil::lock;
use crate::XUtil;

pub mod registry;

/// Modifier bits of a key or button event state, the rest are pointer buttons.
const MODIFIER_BITS: u16 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Device {
    Keyboard,
    Pointer,
}

impl Device {
    pub(crate) fn registry(self, xu: &XUtil) -> &Mutex<BindingRegistry> {
        match self {
            Device::Keyboard => &xu.keybinds,
            Device::Pointer => &xu.mousebinds,
        }
    }

    fn grab(self, xu: &XUtil, window: Window, mods: u16, code: u8) -> Result<()> {
        match self {
            Device::Keyboard => xu.transport().grab_key(window, mods, code),
            Device::Pointer => xu.transport().grab_button(window, mods, code),
        }
    }

    fn ungrab(self, xu: &XUtil, window: Window, mods: u16, code: u8) -> Result<()> {
        match self {
            Device::Keyboard => xu.transport().ungrab_key(window, mods, code),
            Device::Pointer => xu.transport().ungrab_button(window, mods, code),
        }
    }
}

/// Registered in the generic registry once per (kind, window) that has bindings.
struct Dispatcher {
    kind: EventKind,
    device: Device,
}

impl Callback for Dispatcher {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn run(&self, xu: &XUtil, event: &Event) {
        dispatch(xu, self.device, event);
    }
}

fn any() -> u16 {
    u16::from(ModMask::ANY)
}

/// The mask a binding is stored under, ignored modifiers never take part.
pub(crate) fn normalize(xu: &XUtil, mods: u16) -> u16 {
    if mods & any() == 0 {
        mods & !xu.ignore_mask
    } else {
        any()
    }
}

/// Every mask the server grab is issued for, one per combination of ignored modifiers.
fn grab_masks(xu: &XUtil, mods: u16) -> heapless::Vec<u16, IGNORED_MODIFIER_COMBINATIONS> {
    let mut masks = heapless::Vec::new();
    if mods == any() {
        let _ = masks.push(mods);
    } else {
        for ignored in &xu.ignore_combinations {
            let _ = masks.push(mods | ignored);
        }
    }
    masks
}

/// Grabs all variants, releasing the ones already taken if any is refused.
pub(crate) fn grab_all(
    xu: &XUtil,
    device: Device,
    window: Window,
    mods: u16,
    code: u8,
) -> Result<()> {
    let masks = grab_masks(xu, mods);
    for (ind, mask) in masks.iter().enumerate() {
        if let Err(e) = device.grab(xu, window, *mask, code) {
            for taken in &masks[..ind] {
                if let Err(e) = device.ungrab(xu, window, *taken, code) {
                    tracing::warn!("Failed to roll back grab of {code} on {window}: {e}");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

pub(crate) fn ungrab_all(xu: &XUtil, device: Device, window: Window, mods: u16, code: u8) {
    for mask in grab_masks(xu, mods) {
        if let Err(e) = device.ungrab(xu, window, mask, code) {
            tracing::warn!("Failed to ungrab {code} with mask {mask:#x} on {window}: {e}");
        }
    }
}

/// Adds a binding, grabbing on the server when no binding of either kind holds the grab.
pub(crate) fn bind(
    xu: &XUtil,
    device: Device,
    descriptor: &str,
    key: BindingKey,
    callback: Arc<dyn Callback>,
) -> Result<()> {
    let mut registry = lock(device.registry(xu));
    if !registry.accepts(key.kind) {
        return Err(Error::BindingKind(key.kind));
    }
    if registry.server_refs(&key) == 0 {
        grab_all(xu, device, key.window, key.mods, key.code).map_err(|e| match e {
            Error::GrabDenied => Error::GrabConflict {
                descriptor: descriptor.to_owned(),
                window: key.window,
            },
            other => other,
        })?;
        tracing::debug!("Grabbed {descriptor:?} on {}", key.window);
    }
    let count = registry.attach(key, callback);
    tracing::debug!("Bound {descriptor:?} {:?} on {}, count {count}", key.kind, key.window);
    if registry.has_dispatcher(key.kind, key.window) {
        return Ok(());
    }
    let dispatcher: Arc<dyn Callback> = Arc::new(Dispatcher {
        kind: key.kind,
        device,
    });
    registry.set_dispatcher(key.kind, key.window, dispatcher.clone());
    drop(registry);
    xu.connect(key.window, dispatcher);
    Ok(())
}

/// Removes the latest binding under `key`, returns whether there was one.
pub(crate) fn unbind(xu: &XUtil, device: Device, key: BindingKey) -> bool {
    let mut registry = lock(device.registry(xu));
    if registry.pop(&key).is_none() {
        return false;
    }
    if registry.server_refs(&key) == 0 {
        ungrab_all(xu, device, key.window, key.mods, key.code);
        tracing::debug!("Ungrabbed {} with mask {:#x} on {}", key.code, key.mods, key.window);
    }
    let dispatcher = if registry.has_bindings(key.kind, key.window) {
        None
    } else {
        registry.take_dispatcher(key.kind, key.window)
    };
    drop(registry);
    if let Some(dispatcher) = dispatcher {
        xu.disconnect(key.window, &dispatcher);
    }
    true
}

/// Drops every binding on `window` and releases its grabs.
pub(crate) fn detach(xu: &XUtil, device: Device, window: Window) {
    let mut registry = lock(device.registry(xu));
    let keys = registry.window_keys(window);
    for key in &keys {
        registry.take(key);
    }
    let mut released: Vec<(u16, u8)> = Vec::new();
    for key in &keys {
        if !released.contains(&(key.mods, key.code)) {
            ungrab_all(xu, device, window, key.mods, key.code);
            released.push((key.mods, key.code));
        }
    }
    let dispatchers: Vec<Arc<dyn Callback>> = registry
        .kinds()
        .into_iter()
        .filter_map(|kind| registry.take_dispatcher(kind, window))
        .collect();
    drop(registry);
    for dispatcher in &dispatchers {
        xu.disconnect(window, dispatcher);
    }
    if !keys.is_empty() {
        tracing::debug!("Detached {} {device:?} bindings from {window}", keys.len());
    }
}

/// Runs the bindings matching an input event, exact modifiers first, then `any`.
pub(crate) fn dispatch(xu: &XUtil, device: Device, event: &Event) {
    let Some(input) = event.input() else {
        return;
    };
    let kind = event.kind();
    let mods = input.state & MODIFIER_BITS & !xu.ignore_mask;
    let (exact, wildcard) = {
        let registry = lock(device.registry(xu));
        (
            registry.callbacks(&BindingKey::new(kind, input.event, mods, input.detail)),
            registry.callbacks(&BindingKey::new(kind, input.event, any(), input.detail)),
        )
    };
    tracing::trace!(
        "{kind:?} {} with mask {mods:#x} on {} matched {} bindings",
        input.detail,
        input.event,
        exact.len() + wildcard.len()
    );
    for callback in exact.iter().chain(wildcard.iter()) {
        callback.run(xu, event);
    }
}
