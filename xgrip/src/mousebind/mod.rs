//! Button bindings described by strings like `Mod4-1`, and pointer grabs.
use std::sync::Arc;

use x11rb::protocol::xproto::{Cursor, GrabStatus, Window};
use xgrip_core::descriptor::parse_button;

use crate::bind::registry::BindingKey;
use crate::bind::{self, normalize, Device};
use crate::callback::{input_callback, Callback};
use crate::error::{Error, Result};
use crate::x11::event::{EventKind, InputEvent};
use crate::XUtil;

pub mod drag;

impl XUtil {
    fn button_binding(
        &self,
        kind: EventKind,
        window: Window,
        descriptor: &str,
    ) -> Result<BindingKey> {
        let (mods, button) = parse_button(descriptor)?;
        Ok(BindingKey::new(kind, window, normalize(self, mods), button))
    }

    /// Binds `callback` to the button `descriptor` on `window`, for presses or releases
    /// depending on the callback's kind.
    pub fn bind_button(
        &self,
        window: Window,
        descriptor: &str,
        callback: Arc<dyn Callback>,
    ) -> Result<()> {
        let key = self.button_binding(callback.kind(), window, descriptor)?;
        bind::bind(self, Device::Pointer, descriptor, key, callback)
    }

    pub fn bind_button_press<F>(&self, window: Window, descriptor: &str, f: F) -> Result<()>
    where
        F: Fn(&XUtil, &InputEvent) + Send + Sync + 'static,
    {
        let callback = input_callback(EventKind::ButtonPress, f)
            .ok_or(Error::BindingKind(EventKind::ButtonPress))?;
        self.bind_button(window, descriptor, callback)
    }

    pub fn bind_button_release<F>(&self, window: Window, descriptor: &str, f: F) -> Result<()>
    where
        F: Fn(&XUtil, &InputEvent) + Send + Sync + 'static,
    {
        let callback = input_callback(EventKind::ButtonRelease, f)
            .ok_or(Error::BindingKind(EventKind::ButtonRelease))?;
        self.bind_button(window, descriptor, callback)
    }

    /// Removes the latest `kind` binding of `descriptor` on `window`, returns whether there
    /// was one.
    pub fn unbind_button(
        &self,
        kind: EventKind,
        window: Window,
        descriptor: &str,
    ) -> Result<bool> {
        let key = self.button_binding(kind, window, descriptor)?;
        Ok(bind::unbind(self, Device::Pointer, key))
    }

    pub fn detach_buttons(&self, window: Window) {
        bind::detach(self, Device::Pointer, window);
    }

    /// Actively grabs the pointer, reporting presses, releases and motion to `window`.
    pub fn grab_pointer(&self, window: Window, confine_to: Window, cursor: Cursor) -> Result<()> {
        let status = self.transport().grab_pointer(window, confine_to, cursor)?;
        if status == GrabStatus::SUCCESS {
            Ok(())
        } else {
            Err(Error::GrabFailed(status))
        }
    }

    pub fn ungrab_pointer(&self) -> Result<()> {
        self.transport().ungrab_pointer()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use x11rb::protocol::xproto::GrabStatus;

    use crate::error::Error;
    use crate::x11::event::EventKind;
    use crate::x11::testing::{button_press, button_release, xutil, MockTransport, Request, ROOT};

    const MOD4: u16 = 0x40;

    #[test]
    fn grabs_each_ignored_variant() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        xu.bind_button_press(ROOT, "Mod4-1", |_, _| {}).unwrap();
        xu.bind_button_release(ROOT, "Mod4-1", |_, _| {}).unwrap();
        let expected: Vec<Request> = [0, 2, 0x10, 0x12]
            .into_iter()
            .map(|ignored| Request::GrabButton {
                window: ROOT,
                mods: MOD4 | ignored,
                button: 1,
            })
            .collect();
        assert_eq!(expected, mock.take_requests());
        assert!(xu.unbind_button(EventKind::ButtonPress, ROOT, "Mod4-1").unwrap());
        assert!(mock.take_requests().is_empty());
        xu.detach_buttons(ROOT);
        assert_eq!(4, mock.take_requests().len());
        assert!(!xu.connected(EventKind::ButtonRelease, ROOT));
    }

    #[test]
    fn dispatch_ignores_pointer_button_state() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        xu.bind_button_release(ROOT, "Mod4-3", move |_, e| {
            assert_eq!(3, e.detail);
            inner.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        // Button three held during its own release
        mock.push(button_release(ROOT, 3, MOD4 | 0x400));
        mock.push(button_press(ROOT, 3, MOD4));
        mock.push(button_release(ROOT, 3, 0));
        assert!(xu.run().is_err());
        assert_eq!(1, count.load(Ordering::SeqCst));
    }

    #[test]
    fn conflict_names_the_descriptor() {
        let mock = MockTransport::new();
        mock.state().held_elsewhere.insert((7, 0, 2));
        let xu = xutil(&mock);
        let err = xu.bind_button_press(7, "2", |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::GrabConflict { window: 7, .. }));
        assert!(err.to_string().contains("\"2\""));
        assert!(mock.take_requests().is_empty());
        assert!(matches!(
            xu.bind_button_press(7, "Mod4-0", |_, _| {}),
            Err(Error::Core(_))
        ));
    }

    #[test]
    fn pointer_grab_status() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        xu.grab_pointer(ROOT, 0, 0).unwrap();
        mock.state().pointer_grab = GrabStatus::INVALID_TIME;
        assert!(matches!(
            xu.grab_pointer(ROOT, 0, 0),
            Err(Error::GrabFailed(GrabStatus::INVALID_TIME))
        ));
        xu.ungrab_pointer().unwrap();
        assert_eq!(
            vec![
                Request::GrabPointer {
                    window: ROOT,
                    cursor: 0
                },
                Request::GrabPointer {
                    window: ROOT,
                    cursor: 0
                },
                Request::UngrabPointer,
            ],
            mock.take_requests()
        );
    }
}
