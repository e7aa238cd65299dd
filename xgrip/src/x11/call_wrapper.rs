use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Button, ButtonIndex, ClientMessageEvent, ConnectionExt, Cursor, EventMask, GrabMode,
    GrabStatus, Keycode, Window,
};
use x11rb::protocol::ErrorKind;
use x11rb::rust_connection::{ReplyError, RustConnection};
use x11rb::CURRENT_TIME;
use xgrip_core::keyboard::{KeyboardMapping, ModifierMapping};

use crate::error::{Error, Result};
use crate::x11::event::Incoming;
use crate::x11::Transport;

/// [`Transport`] over an x11rb socket connection.
pub struct CallWrapper {
    connection: RustConnection,
    root: Window,
}

impl CallWrapper {
    /// Connects to `display`, or `$DISPLAY` when `None`.
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (connection, screen_num) = x11rb::connect(display)?;
        let root = connection.setup().roots[screen_num].root;
        tracing::debug!("Connected to screen {screen_num} with root {root}");
        Ok(Self { connection, root })
    }
}

fn checked_grab(res: std::result::Result<(), ReplyError>) -> Result<()> {
    match res {
        Err(ReplyError::X11Error(ref error)) if error.error_kind == ErrorKind::Access => {
            Err(Error::GrabDenied)
        }
        other => Ok(other?),
    }
}

impl Transport for CallWrapper {
    fn wait_for_event(&self) -> Result<Incoming> {
        Ok(self.connection.wait_for_event()?.into())
    }

    fn poll_for_event(&self) -> Result<Option<Incoming>> {
        Ok(self.connection.poll_for_event()?.map(Incoming::from))
    }

    fn flush(&self) -> Result<()> {
        Ok(self.connection.flush()?)
    }

    fn root(&self) -> Window {
        self.root
    }

    fn keyboard_mapping(&self) -> Result<KeyboardMapping> {
        let setup = self.connection.setup();
        let (lo, hi) = (setup.min_keycode, setup.max_keycode);
        let mapping = self
            .connection
            .get_keyboard_mapping(lo, hi - lo + 1)?
            .reply()?;
        Ok(KeyboardMapping::new(
            lo,
            mapping.keysyms_per_keycode,
            mapping.keysyms,
        ))
    }

    fn modifier_mapping(&self) -> Result<ModifierMapping> {
        let mapping = self.connection.get_modifier_mapping()?.reply()?;
        Ok(ModifierMapping::new(mapping.keycodes))
    }

    fn grab_key(&self, window: Window, mods: u16, code: Keycode) -> Result<()> {
        let res = self
            .connection
            .grab_key(true, window, mods, code, GrabMode::ASYNC, GrabMode::ASYNC)?
            .check();
        checked_grab(res)
    }

    fn ungrab_key(&self, window: Window, mods: u16, code: Keycode) -> Result<()> {
        self.connection.ungrab_key(code, window, mods)?;
        Ok(())
    }

    fn grab_button(&self, window: Window, mods: u16, button: Button) -> Result<()> {
        let res = self
            .connection
            .grab_button(
                true,
                window,
                u32::from(EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE) as u16,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                0u16,
                0u16,
                ButtonIndex::from(button),
                mods,
            )?
            .check();
        checked_grab(res)
    }

    fn ungrab_button(&self, window: Window, mods: u16, button: Button) -> Result<()> {
        self.connection
            .ungrab_button(ButtonIndex::from(button), window, mods)?;
        Ok(())
    }

    fn grab_keyboard(&self, window: Window) -> Result<GrabStatus> {
        Ok(self
            .connection
            .grab_keyboard(false, window, CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)?
            .reply()?
            .status)
    }

    fn ungrab_keyboard(&self) -> Result<()> {
        self.connection.ungrab_keyboard(CURRENT_TIME)?;
        Ok(())
    }

    fn grab_pointer(
        &self,
        window: Window,
        confine_to: Window,
        cursor: Cursor,
    ) -> Result<GrabStatus> {
        Ok(self
            .connection
            .grab_pointer(
                false,
                window,
                u32::from(
                    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                ) as u16,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                confine_to,
                cursor,
                CURRENT_TIME,
            )?
            .reply()?
            .status)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.connection.ungrab_pointer(CURRENT_TIME)?;
        Ok(())
    }

    fn send_client_message(&self, window: Window, event: ClientMessageEvent) -> Result<()> {
        // Root window messages are window manager requests
        let mask = if window == self.root {
            EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT
        } else {
            EventMask::NO_EVENT
        };
        self.connection.send_event(false, window, mask, &event)?;
        Ok(())
    }
}
