use std::collections::HashMap;
use std::sync::Arc;

use x11rb::protocol::xproto::Window;

use crate::callback::Callback;
use crate::x11::event::EventKind;

/// What a binding is registered under, `code` is a key code or a button number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub kind: EventKind,
    pub window: Window,
    pub mods: u16,
    pub code: u8,
}

impl BindingKey {
    #[must_use]
    pub fn new(kind: EventKind, window: Window, mods: u16, code: u8) -> Self {
        Self {
            kind,
            window,
            mods,
            code,
        }
    }

    fn with_kind(self, kind: EventKind) -> Self {
        Self { kind, ..self }
    }
}

/// Callbacks and grab counts for one device, press and release kinds share server grabs.
pub(crate) struct BindingRegistry {
    press: EventKind,
    release: EventKind,
    callbacks: HashMap<BindingKey, Vec<Arc<dyn Callback>>>,
    grabs: HashMap<BindingKey, usize>,
    dispatchers: HashMap<(EventKind, Window), Arc<dyn Callback>>,
}

impl BindingRegistry {
    pub(crate) fn new(press: EventKind, release: EventKind) -> Self {
        Self {
            press,
            release,
            callbacks: HashMap::new(),
            grabs: HashMap::new(),
            dispatchers: HashMap::new(),
        }
    }

    pub(crate) fn kinds(&self) -> [EventKind; 2] {
        [self.press, self.release]
    }

    pub(crate) fn accepts(&self, kind: EventKind) -> bool {
        kind == self.press || kind == self.release
    }

    pub(crate) fn count(&self, key: &BindingKey) -> usize {
        self.grabs.get(key).copied().unwrap_or(0)
    }

    /// Bindings of both kinds holding the server grab for this key.
    pub(crate) fn server_refs(&self, key: &BindingKey) -> usize {
        self.count(&key.with_kind(self.press)) + self.count(&key.with_kind(self.release))
    }

    /// Appends a callback, returns the new count for the key.
    pub(crate) fn attach(&mut self, key: BindingKey, callback: Arc<dyn Callback>) -> usize {
        self.callbacks.entry(key).or_default().push(callback);
        let count = self.grabs.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Removes the most recently attached callback for the key.
    pub(crate) fn pop(&mut self, key: &BindingKey) -> Option<Arc<dyn Callback>> {
        let list = self.callbacks.get_mut(key)?;
        let callback = list.pop();
        if list.is_empty() {
            self.callbacks.remove(key);
            self.grabs.remove(key);
        } else if let Some(count) = self.grabs.get_mut(key) {
            *count -= 1;
        }
        callback
    }

    /// Removes a key with all its callbacks, returning them with the count.
    pub(crate) fn take(&mut self, key: &BindingKey) -> Option<(Vec<Arc<dyn Callback>>, usize)> {
        let callbacks = self.callbacks.remove(key)?;
        let count = self.grabs.remove(key).unwrap_or(0);
        Some((callbacks, count))
    }

    /// Adds callbacks and count under a key, after any already there.
    pub(crate) fn insert(
        &mut self,
        key: BindingKey,
        callbacks: Vec<Arc<dyn Callback>>,
        count: usize,
    ) {
        self.callbacks.entry(key).or_default().extend(callbacks);
        *self.grabs.entry(key).or_insert(0) += count;
    }

    pub(crate) fn callbacks(&self, key: &BindingKey) -> Vec<Arc<dyn Callback>> {
        self.callbacks.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn keys(&self) -> Vec<BindingKey> {
        self.callbacks.keys().copied().collect()
    }

    pub(crate) fn window_keys(&self, window: Window) -> Vec<BindingKey> {
        self.callbacks
            .keys()
            .filter(|key| key.window == window)
            .copied()
            .collect()
    }

    pub(crate) fn has_bindings(&self, kind: EventKind, window: Window) -> bool {
        self.callbacks
            .keys()
            .any(|key| key.kind == kind && key.window == window)
    }

    pub(crate) fn set_dispatcher(
        &mut self,
        kind: EventKind,
        window: Window,
        dispatcher: Arc<dyn Callback>,
    ) {
        self.dispatchers.insert((kind, window), dispatcher);
    }

    pub(crate) fn has_dispatcher(&self, kind: EventKind, window: Window) -> bool {
        self.dispatchers.contains_key(&(kind, window))
    }

    pub(crate) fn take_dispatcher(
        &mut self,
        kind: EventKind,
        window: Window,
    ) -> Option<Arc<dyn Callback>> {
        self.dispatchers.remove(&(kind, window))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::bind::registry::{BindingKey, BindingRegistry};
    use crate::callback::{input_callback, same, Callback};
    use crate::x11::event::EventKind;

    fn noop(kind: EventKind) -> Arc<dyn Callback> {
        input_callback(kind, |_, _| {}).unwrap()
    }

    fn keys() -> BindingRegistry {
        BindingRegistry::new(EventKind::KeyPress, EventKind::KeyRelease)
    }

    #[test]
    fn counts_follow_callbacks() {
        let mut registry = keys();
        let key = BindingKey::new(EventKind::KeyPress, 1, 4, 9);
        assert_eq!(1, registry.attach(key, noop(EventKind::KeyPress)));
        assert_eq!(2, registry.attach(key, noop(EventKind::KeyPress)));
        assert!(registry.pop(&key).is_some());
        assert_eq!(1, registry.count(&key));
        assert!(registry.pop(&key).is_some());
        assert_eq!(0, registry.count(&key));
        assert!(registry.pop(&key).is_none());
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn pop_removes_latest() {
        let mut registry = keys();
        let key = BindingKey::new(EventKind::KeyPress, 1, 0, 9);
        let first = noop(EventKind::KeyPress);
        let second = noop(EventKind::KeyPress);
        registry.attach(key, first.clone());
        registry.attach(key, second.clone());
        assert!(same(&second, &registry.pop(&key).unwrap()));
        assert!(same(&first, &registry.callbacks(&key)[0]));
    }

    #[test]
    fn press_and_release_share_server_refs() {
        let mut registry = keys();
        let press = BindingKey::new(EventKind::KeyPress, 1, 0, 9);
        let release = BindingKey::new(EventKind::KeyRelease, 1, 0, 9);
        registry.attach(press, noop(EventKind::KeyPress));
        registry.attach(release, noop(EventKind::KeyRelease));
        assert_eq!(2, registry.server_refs(&press));
        assert_eq!(2, registry.server_refs(&release));
        assert!(registry.accepts(EventKind::KeyRelease));
        assert!(!registry.accepts(EventKind::ButtonPress));
    }

    #[test]
    fn take_and_insert_merge() {
        let mut registry = keys();
        let old = BindingKey::new(EventKind::KeyPress, 1, 0, 9);
        let new = BindingKey::new(EventKind::KeyPress, 1, 0, 10);
        registry.attach(old, noop(EventKind::KeyPress));
        registry.attach(new, noop(EventKind::KeyPress));
        let (callbacks, count) = registry.take(&old).unwrap();
        registry.insert(new, callbacks, count);
        assert_eq!(2, registry.count(&new));
        assert_eq!(2, registry.callbacks(&new).len());
        assert_eq!(vec![new], registry.window_keys(1));
        assert!(registry.has_bindings(EventKind::KeyPress, 1));
        assert!(!registry.has_bindings(EventKind::KeyRelease, 1));
    }
}
