//! Key bindings described by strings like `Mod4-Shift-q`, kept grabbed across keyboard
//! remaps.
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use x11rb::protocol::xproto::{GrabStatus, Keycode, ModMask, Window};
use xgrip_core::descriptor::parse_key;
use xgrip_core::keyboard::{keycode_changes, KeyboardMapping};

use crate::bind::registry::BindingKey;
use crate::bind::{self, normalize, Device};
use crate::callback::{input_callback, Callback};
use crate::error::{Error, Result};
use crate::x11::event::{EventKind, InputEvent, NO_WINDOW};
use crate::xutil::{lock, write};
use crate::XUtil;

impl XUtil {
    fn key_binding(
        &self,
        kind: EventKind,
        window: Window,
        descriptor: &str,
    ) -> Result<BindingKey> {
        let (mods, code) = parse_key(descriptor, self.keymap().keyboard())?;
        Ok(BindingKey::new(kind, window, normalize(self, mods), code))
    }

    /// Binds `callback` to the key `descriptor` on `window`, for presses or releases
    /// depending on the callback's kind.
    pub fn bind_key(
        &self,
        window: Window,
        descriptor: &str,
        callback: Arc<dyn Callback>,
    ) -> Result<()> {
        let key = self.key_binding(callback.kind(), window, descriptor)?;
        bind::bind(self, Device::Keyboard, descriptor, key, callback)
    }

    pub fn bind_key_press<F>(&self, window: Window, descriptor: &str, f: F) -> Result<()>
    where
        F: Fn(&XUtil, &InputEvent) + Send + Sync + 'static,
    {
        self.bind_key_kind(EventKind::KeyPress, window, descriptor, f)
    }

    pub fn bind_key_release<F>(&self, window: Window, descriptor: &str, f: F) -> Result<()>
    where
        F: Fn(&XUtil, &InputEvent) + Send + Sync + 'static,
    {
        self.bind_key_kind(EventKind::KeyRelease, window, descriptor, f)
    }

    fn bind_key_kind<F>(
        &self,
        kind: EventKind,
        window: Window,
        descriptor: &str,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&XUtil, &InputEvent) + Send + Sync + 'static,
    {
        let callback = input_callback(kind, f).ok_or(Error::BindingKind(kind))?;
        self.bind_key(window, descriptor, callback)
    }

    /// Removes the latest `kind` binding of `descriptor` on `window`, the server grab is
    /// released with the last one. Returns whether a binding was removed.
    pub fn unbind_key(&self, kind: EventKind, window: Window, descriptor: &str) -> Result<bool> {
        let key = self.key_binding(kind, window, descriptor)?;
        Ok(bind::unbind(self, Device::Keyboard, key))
    }

    /// Removes every key binding on `window`.
    pub fn detach_keys(&self, window: Window) {
        bind::detach(self, Device::Keyboard, window);
    }

    /// Delivers every key event to `window`'s bindings, whichever window it was reported on.
    pub fn redirect_keys(&self, window: Window) {
        self.redirect.store(window, Ordering::Relaxed);
    }

    pub fn clear_redirect_keys(&self) {
        self.redirect.store(NO_WINDOW, Ordering::Relaxed);
    }

    pub(crate) fn redirected(&self) -> Option<Window> {
        let window = self.redirect.load(Ordering::Relaxed);
        (window != NO_WINDOW).then_some(window)
    }

    pub fn grab_keyboard(&self, window: Window) -> Result<()> {
        let status = self.transport().grab_keyboard(window)?;
        if status == GrabStatus::SUCCESS {
            Ok(())
        } else {
            Err(Error::GrabFailed(status))
        }
    }

    /// Grabs the keyboard, retrying every millisecond while another client holds it, up to
    /// the configured number of attempts.
    pub fn smart_grab_keyboard(&self, window: Window) -> Result<()> {
        let attempts = self.grab_keyboard_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.grab_keyboard(window) {
                Err(Error::GrabFailed(status)) if attempt < attempts => {
                    tracing::trace!("Keyboard grab attempt {attempt} failed with {status:?}");
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(1));
                }
                res => return res,
            }
        }
    }

    pub fn ungrab_keyboard(&self) -> Result<()> {
        self.transport().ungrab_keyboard()
    }

    /// Text a key event with `state` on `code` types, empty if none.
    #[must_use]
    pub fn lookup_string(&self, state: u16, code: Keycode) -> Cow<'static, str> {
        self.keymap().lookup_string(state, code)
    }

    /// The mask bindings are matched with and the code of a key event.
    #[must_use]
    pub fn deduce_key_info(&self, state: u16, code: Keycode) -> (u16, Keycode) {
        (state & 0xff & !self.ignore_mask, code)
    }

    /// Whether a key event with `state` on `code` matches `descriptor`.
    pub fn key_match(&self, descriptor: &str, state: u16, code: Keycode) -> Result<bool> {
        let (mods, bound) = parse_key(descriptor, self.keymap().keyboard())?;
        let mods = normalize(self, mods);
        let (state, code) = self.deduce_key_info(state, code);
        Ok(code == bound && (mods == u16::from(ModMask::ANY) || mods == state))
    }

    /// Moves key bindings whose symbols changed code, then caches the new mapping.
    pub(crate) fn remap_keys(&self, keyboard: KeyboardMapping) {
        let changes = keycode_changes(self.keymap().keyboard(), &keyboard);
        tracing::debug!("Keyboard mapping changed, {} codes moved", changes.len());
        let mut registry = lock(&self.keybinds);
        let affected: Vec<BindingKey> = registry
            .keys()
            .into_iter()
            .filter(|key| changes.contains_key(&key.code))
            .collect();
        let mut released = HashSet::new();
        for key in &affected {
            if released.insert((key.window, key.mods, key.code)) {
                bind::ungrab_all(self, Device::Keyboard, key.window, key.mods, key.code);
            }
        }
        let moved: Vec<_> = affected
            .iter()
            .filter_map(|key| registry.take(key).map(|entry| (*key, entry)))
            .collect();
        let mut regrab = HashSet::new();
        for (key, (callbacks, count)) in moved {
            let Some(code) = changes.get(&key.code).copied() else {
                continue;
            };
            tracing::debug!(
                "Moving {:?} binding on {} from {} to {code}",
                key.kind,
                key.window,
                key.code
            );
            registry.insert(BindingKey { code, ..key }, callbacks, count);
            regrab.insert((key.window, key.mods, code));
        }
        for (window, mods, code) in regrab {
            if let Err(e) = bind::grab_all(self, Device::Keyboard, window, mods, code) {
                tracing::warn!(
                    "Failed to grab {code} with mask {mods:#x} on {window} after remap: {e}"
                );
            }
        }
        drop(registry);
        write(&self.keymap).set_keyboard(keyboard);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use x11rb::protocol::xproto::{GrabStatus, Mapping};

    use crate::callback::input_callback;
    use crate::error::Error;
    use crate::x11::event::{EventKind, InputEvent};
    use crate::x11::testing::{
        key_press, key_release, keyboard, mapping_notify, xutil, MockTransport, Request, ROOT,
        US_ROWS,
    };
    use crate::XUtil;

    const CONTROL: u16 = 4;
    const LOCK: u16 = 2;
    const NUM_LOCK: u16 = 0x10;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&XUtil, &InputEvent)) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move |_: &XUtil, _: &InputEvent| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn grab_key(mods: u16, code: u8) -> Request {
        Request::GrabKey {
            window: ROOT,
            mods,
            code,
        }
    }

    fn ungrab_key(mods: u16, code: u8) -> Request {
        Request::UngrabKey {
            window: ROOT,
            mods,
            code,
        }
    }

    fn variants(f: fn(u16, u8) -> Request, mods: u16, code: u8) -> Vec<Request> {
        [0, LOCK, NUM_LOCK, LOCK | NUM_LOCK]
            .into_iter()
            .map(|ignored| f(mods | ignored, code))
            .collect()
    }

    #[test]
    fn grabs_once_per_first_binding() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        for _ in 0..3 {
            xu.bind_key_press(ROOT, "Control-q", |_, _| {}).unwrap();
        }
        assert_eq!(variants(grab_key, CONTROL, 24), mock.take_requests());
        assert!(xu.unbind_key(EventKind::KeyPress, ROOT, "Control-q").unwrap());
        assert!(xu.unbind_key(EventKind::KeyPress, ROOT, "Control-q").unwrap());
        assert!(mock.take_requests().is_empty());
        assert!(xu.unbind_key(EventKind::KeyPress, ROOT, "Control-q").unwrap());
        assert_eq!(variants(ungrab_key, CONTROL, 24), mock.take_requests());
        assert!(!xu.unbind_key(EventKind::KeyPress, ROOT, "Control-q").unwrap());
        assert!(mock.take_requests().is_empty());
        assert!(!xu.connected(EventKind::KeyPress, ROOT));
    }

    #[test]
    fn press_and_release_share_a_grab() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        xu.bind_key_press(ROOT, "Return", |_, _| {}).unwrap();
        xu.bind_key_release(ROOT, "Return", |_, _| {}).unwrap();
        assert_eq!(variants(grab_key, 0, 36), mock.take_requests());
        xu.unbind_key(EventKind::KeyPress, ROOT, "Return").unwrap();
        assert!(mock.take_requests().is_empty());
        xu.unbind_key(EventKind::KeyRelease, ROOT, "Return").unwrap();
        assert_eq!(variants(ungrab_key, 0, 36), mock.take_requests());
    }

    #[test]
    fn conflict_rolls_back_taken_grabs() {
        let mock = MockTransport::new();
        mock.state().held_elsewhere.insert((ROOT, CONTROL | NUM_LOCK, 24));
        let xu = xutil(&mock);
        match xu.bind_key_press(ROOT, "Control-q", |_, _| {}) {
            Err(Error::GrabConflict { descriptor, window }) => {
                assert_eq!("Control-q", descriptor);
                assert_eq!(ROOT, window);
            }
            other => panic!("Expected a grab conflict, got {other:?}"),
        }
        assert_eq!(
            vec![
                grab_key(CONTROL, 24),
                grab_key(CONTROL | LOCK, 24),
                ungrab_key(CONTROL, 24),
                ungrab_key(CONTROL | LOCK, 24),
            ],
            mock.take_requests()
        );
        assert!(!xu.connected(EventKind::KeyPress, ROOT));
    }

    #[test]
    fn any_grabs_a_single_mask() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        xu.bind_key_press(ROOT, "any-q", |_, _| {}).unwrap();
        assert_eq!(vec![grab_key(0x8000, 24)], mock.take_requests());
    }

    #[test]
    fn rejects_non_key_kinds() {
        let xu = xutil(&MockTransport::new());
        let callback = input_callback(EventKind::ButtonPress, |_, _| {}).unwrap();
        assert!(matches!(
            xu.bind_key(ROOT, "q", callback),
            Err(Error::BindingKind(EventKind::ButtonPress))
        ));
        assert!(matches!(
            xu.bind_key_press(ROOT, "Control-nokey", |_, _| {}),
            Err(Error::Core(_))
        ));
    }

    #[test]
    fn control_escape_needs_control() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let (count, callback) = counter();
        xu.bind_key_press(ROOT, "Control-Escape", callback).unwrap();
        mock.push(key_press(ROOT, 9, CONTROL));
        mock.push(key_press(ROOT, 9, 0));
        mock.push(key_release(ROOT, 9, CONTROL));
        mock.push(key_press(ROOT, 9, CONTROL | NUM_LOCK | LOCK));
        mock.push(key_press(ROOT, 9, CONTROL | 1));
        assert!(matches!(xu.run(), Err(Error::ConnectionClosed)));
        assert_eq!(2, count.load(Ordering::SeqCst));
    }

    #[test]
    fn duplicates_both_run() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let (count, callback) = counter();
        let callback = Arc::new(callback);
        for _ in 0..2 {
            let callback = callback.clone();
            xu.bind_key_press(ROOT, "b", move |xu, e| callback(xu, e)).unwrap();
        }
        assert_eq!(4, mock.take_requests().len());
        mock.push(key_press(ROOT, 56, 0));
        assert!(xu.run().is_err());
        assert_eq!(2, count.load(Ordering::SeqCst));
    }

    #[test]
    fn exact_bindings_run_before_any() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        xu.bind_key_press(ROOT, "any-q", move |_, _| first.lock().unwrap().push("any"))
            .unwrap();
        let second = order.clone();
        xu.bind_key_press(ROOT, "Control-q", move |_, _| {
            second.lock().unwrap().push("control");
        })
        .unwrap();
        mock.push(key_press(ROOT, 24, CONTROL));
        mock.push(key_press(ROOT, 24, 0x40));
        assert!(xu.run().is_err());
        assert_eq!(vec!["control", "any", "any"], *order.lock().unwrap());
    }

    #[test]
    fn remap_moves_bindings_in_order() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..2 {
            let order = order.clone();
            xu.bind_key_press(ROOT, "a", move |_, e| order.lock().unwrap().push((i, e.detail)))
                .unwrap();
        }
        mock.take_requests();
        let moved: Vec<_> = US_ROWS
            .iter()
            .map(|(code, row)| if *code == 38 { (40, *row) } else { (*code, *row) })
            .collect();
        mock.state().keyboard = keyboard(&moved);
        mock.push(mapping_notify(Mapping::KEYBOARD, 8, 248));
        mock.push(key_press(ROOT, 38, 0));
        mock.push(key_press(ROOT, 40, 0));
        assert!(xu.run().is_err());
        assert_eq!(vec![(0, 40), (1, 40)], *order.lock().unwrap());
        let mut expected = variants(ungrab_key, 0, 38);
        expected.extend(variants(grab_key, 0, 40));
        assert_eq!(expected, mock.take_requests());
        assert_eq!(40, xu.keymap().keyboard().keycode_for(0x61).unwrap());
    }

    #[test]
    fn swapped_codes_swap_bindings() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let seen = seen.clone();
            xu.bind_key_press(ROOT, name, move |_, e| seen.lock().unwrap().push((name, e.detail)))
                .unwrap();
        }
        let swapped: Vec<_> = US_ROWS
            .iter()
            .map(|(code, row)| match code {
                38 => (56, *row),
                56 => (38, *row),
                _ => (*code, *row),
            })
            .collect();
        mock.take_requests();
        mock.state().keyboard = keyboard(&swapped);
        mock.push(mapping_notify(Mapping::KEYBOARD, 8, 248));
        mock.push(key_press(ROOT, 38, 0));
        mock.push(key_press(ROOT, 56, 0));
        assert!(xu.run().is_err());
        assert_eq!(vec![("b", 38), ("a", 56)], *seen.lock().unwrap());

        // Every old grab is released before either code is grabbed again
        let requests = mock.take_requests();
        assert_eq!(16, requests.len());
        let (ungrabs, grabs) = requests.split_at(8);
        for code in [38, 56] {
            for request in variants(ungrab_key, 0, code) {
                assert!(ungrabs.contains(&request), "missing {request:?}");
            }
            for request in variants(grab_key, 0, code) {
                assert!(grabs.contains(&request), "missing {request:?}");
            }
        }
    }

    #[test]
    fn redirect_rewrites_the_event_window() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let (count, callback) = counter();
        xu.bind_key_press(7, "q", callback).unwrap();
        xu.redirect_keys(7);
        mock.push(key_press(ROOT, 24, 0));
        assert!(xu.run().is_err());
        xu.clear_redirect_keys();
        mock.push(key_press(ROOT, 24, 0));
        assert!(xu.run().is_err());
        assert_eq!(1, count.load(Ordering::SeqCst));
    }

    #[test]
    fn detach_releases_grabs() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        xu.bind_key_press(7, "q", |_, _| {}).unwrap();
        xu.bind_key_release(7, "q", |_, _| {}).unwrap();
        mock.take_requests();
        xu.detach_keys(7);
        let expected: Vec<Request> = [0, LOCK, NUM_LOCK, LOCK | NUM_LOCK]
            .into_iter()
            .map(|mods| Request::UngrabKey {
                window: 7,
                mods,
                code: 24,
            })
            .collect();
        assert_eq!(expected, mock.take_requests());
        assert!(!xu.connected(EventKind::KeyPress, 7));
        assert!(!xu.connected(EventKind::KeyRelease, 7));
    }

    #[test]
    fn keyboard_grab_retries() {
        let mock = MockTransport::new();
        mock.state()
            .keyboard_grabs
            .extend([GrabStatus::ALREADY_GRABBED, GrabStatus::FROZEN]);
        let xu = xutil(&mock);
        xu.smart_grab_keyboard(ROOT).unwrap();
        assert_eq!(vec![Request::GrabKeyboard(ROOT); 3], mock.take_requests());
        mock.state().keyboard_grabs.push_back(GrabStatus::NOT_VIEWABLE);
        assert!(matches!(
            xu.grab_keyboard(ROOT),
            Err(Error::GrabFailed(GrabStatus::NOT_VIEWABLE))
        ));
    }

    #[test]
    fn lookup_and_match() {
        let xu = xutil(&MockTransport::new());
        assert_eq!("a", xu.lookup_string(0, 38));
        assert_eq!("A", xu.lookup_string(1, 38));
        assert_eq!("A", xu.lookup_string(LOCK, 38));
        assert_eq!((CONTROL, 24), xu.deduce_key_info(CONTROL | NUM_LOCK | 0x100, 24));
        assert!(xu.key_match("Control-q", CONTROL | LOCK, 24).unwrap());
        assert!(!xu.key_match("Control-q", 0, 24).unwrap());
        assert!(xu.key_match("any-q", 0x41, 24).unwrap());
        assert!(!xu.key_match("q", 0, 38).unwrap());
    }
}
