use x11rb::protocol::xproto::{Button, ClientMessageEvent, Cursor, GrabStatus, Keycode, Window};
use xgrip_core::keyboard::{KeyboardMapping, ModifierMapping};

use crate::error::Result;
use crate::x11::event::Incoming;

pub mod call_wrapper;
pub mod event;
#[cfg(test)]
pub(crate) mod testing;

/// The requests the helper layer needs from a server connection.
///
/// Grabs are checked round trips, a grab another client already holds fails with
/// [`crate::error::Error::GrabDenied`].
pub trait Transport: Send + Sync {
    /// Blocks until the next event or error arrives.
    fn wait_for_event(&self) -> Result<Incoming>;

    /// The next buffered event or error, if any, without blocking.
    fn poll_for_event(&self) -> Result<Option<Incoming>>;

    fn flush(&self) -> Result<()>;

    fn root(&self) -> Window;

    fn keyboard_mapping(&self) -> Result<KeyboardMapping>;

    fn modifier_mapping(&self) -> Result<ModifierMapping>;

    fn grab_key(&self, window: Window, mods: u16, code: Keycode) -> Result<()>;

    fn ungrab_key(&self, window: Window, mods: u16, code: Keycode) -> Result<()>;

    fn grab_button(&self, window: Window, mods: u16, button: Button) -> Result<()>;

    fn ungrab_button(&self, window: Window, mods: u16, button: Button) -> Result<()>;

    fn grab_keyboard(&self, window: Window) -> Result<GrabStatus>;

    fn ungrab_keyboard(&self) -> Result<()>;

    fn grab_pointer(&self, window: Window, confine_to: Window, cursor: Cursor)
        -> Result<GrabStatus>;

    fn ungrab_pointer(&self) -> Result<()>;

    fn send_client_message(&self, window: Window, event: ClientMessageEvent) -> Result<()>;
}
