//! In-memory [`Transport`] that replays queued events and records every request.
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use x11rb::protocol::xproto::{
    Button, ClientMessageEvent, ConfigureRequestEvent, Cursor, GrabStatus, Keycode,
    MapRequestEvent, Mapping, MappingNotifyEvent, PropertyNotifyEvent, Timestamp, Window,
};
use x11rb::protocol::ErrorKind;
use x11rb::x11_utils::TryParse;
use xgrip_core::config::Options;
use xgrip_core::keyboard::{KeyboardMapping, ModifierMapping};
use xgrip_core::keysym::Keysym;

use crate::error::{Error, Result};
use crate::x11::event::{Event, Incoming, InputEvent, ProtocolError};
use crate::x11::Transport;
use crate::XUtil;

pub(crate) const ROOT: Window = 1;
pub(crate) const PER_CODE: usize = 2;

pub(crate) const US_ROWS: &[(Keycode, &[Keysym])] = &[
    (9, &[0xff1b]),
    (24, &[0x71, 0x51]),
    (36, &[0xff0d]),
    (37, &[0xffe3]),
    (38, &[0x61, 0x41]),
    (50, &[0xffe1]),
    (56, &[0x62, 0x42]),
    (66, &[0xffe5]),
    (77, &[0xff7f]),
    (133, &[0xffeb]),
];

pub(crate) fn keyboard(rows: &[(Keycode, &[Keysym])]) -> KeyboardMapping {
    let mut keysyms = vec![0; (256 - 8) * PER_CODE];
    for (code, row) in rows {
        let start = usize::from(*code - 8) * PER_CODE;
        keysyms[start..start + row.len()].copy_from_slice(row);
    }
    KeyboardMapping::new(8, PER_CODE as u8, keysyms)
}

pub(crate) fn modifiers() -> ModifierMapping {
    ModifierMapping::new(vec![
        50, 0, // shift
        66, 0, // lock
        37, 0, // control
        64, 0, // mod1
        77, 0, // mod2
        0, 0, // mod3
        133, 0, // mod4
        0, 0, // mod5
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    GrabKey { window: Window, mods: u16, code: Keycode },
    UngrabKey { window: Window, mods: u16, code: Keycode },
    GrabButton { window: Window, mods: u16, button: Button },
    UngrabButton { window: Window, mods: u16, button: Button },
    GrabKeyboard(Window),
    UngrabKeyboard,
    GrabPointer { window: Window, cursor: Cursor },
    UngrabPointer,
    SendClientMessage(Window),
}

pub(crate) struct MockState {
    pub(crate) pending: VecDeque<Incoming>,
    pub(crate) requests: Vec<Request>,
    pub(crate) flushes: usize,
    pub(crate) keyboard: KeyboardMapping,
    pub(crate) modifiers: ModifierMapping,
    /// (window, mods, code or button) grabs another client holds.
    pub(crate) held_elsewhere: HashSet<(Window, u16, u8)>,
    /// Keyboard grab replies in order, success once exhausted.
    pub(crate) keyboard_grabs: VecDeque<GrabStatus>,
    pub(crate) pointer_grab: GrabStatus,
    pub(crate) fail_mapping_queries: bool,
}

#[derive(Clone)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                pending: VecDeque::new(),
                requests: Vec::new(),
                flushes: 0,
                keyboard: keyboard(US_ROWS),
                modifiers: modifiers(),
                held_elsewhere: HashSet::new(),
                keyboard_grabs: VecDeque::new(),
                pointer_grab: GrabStatus::SUCCESS,
                fail_mapping_queries: false,
            })),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, event: Event) {
        self.state().pending.push_back(Incoming::Event(event));
    }

    pub(crate) fn push_error(&self, error: ProtocolError) {
        self.state().pending.push_back(Incoming::Error(error));
    }

    pub(crate) fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut self.state().requests)
    }

    fn record(&self, request: Request) {
        self.state().requests.push(request);
    }

    fn grab(&self, request: Request, window: Window, mods: u16, detail: u8) -> Result<()> {
        let mut state = self.state();
        if state.held_elsewhere.contains(&(window, mods, detail)) {
            return Err(Error::GrabDenied);
        }
        state.requests.push(request);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn wait_for_event(&self) -> Result<Incoming> {
        self.state()
            .pending
            .pop_front()
            .ok_or(Error::ConnectionClosed)
    }

    fn poll_for_event(&self) -> Result<Option<Incoming>> {
        Ok(self.state().pending.pop_front())
    }

    fn flush(&self) -> Result<()> {
        self.state().flushes += 1;
        Ok(())
    }

    fn root(&self) -> Window {
        ROOT
    }

    fn keyboard_mapping(&self) -> Result<KeyboardMapping> {
        let state = self.state();
        if state.fail_mapping_queries {
            return Err(Error::ConnectionClosed);
        }
        Ok(state.keyboard.clone())
    }

    fn modifier_mapping(&self) -> Result<ModifierMapping> {
        let state = self.state();
        if state.fail_mapping_queries {
            return Err(Error::ConnectionClosed);
        }
        Ok(state.modifiers.clone())
    }

    fn grab_key(&self, window: Window, mods: u16, code: Keycode) -> Result<()> {
        self.grab(Request::GrabKey { window, mods, code }, window, mods, code)
    }

    fn ungrab_key(&self, window: Window, mods: u16, code: Keycode) -> Result<()> {
        self.record(Request::UngrabKey { window, mods, code });
        Ok(())
    }

    fn grab_button(&self, window: Window, mods: u16, button: Button) -> Result<()> {
        self.grab(
            Request::GrabButton {
                window,
                mods,
                button,
            },
            window,
            mods,
            button,
        )
    }

    fn ungrab_button(&self, window: Window, mods: u16, button: Button) -> Result<()> {
        self.record(Request::UngrabButton {
            window,
            mods,
            button,
        });
        Ok(())
    }

    fn grab_keyboard(&self, window: Window) -> Result<GrabStatus> {
        let mut state = self.state();
        state.requests.push(Request::GrabKeyboard(window));
        Ok(state
            .keyboard_grabs
            .pop_front()
            .unwrap_or(GrabStatus::SUCCESS))
    }

    fn ungrab_keyboard(&self) -> Result<()> {
        self.record(Request::UngrabKeyboard);
        Ok(())
    }

    fn grab_pointer(
        &self,
        window: Window,
        _confine_to: Window,
        cursor: Cursor,
    ) -> Result<GrabStatus> {
        let mut state = self.state();
        state.requests.push(Request::GrabPointer { window, cursor });
        Ok(state.pointer_grab)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.record(Request::UngrabPointer);
        Ok(())
    }

    fn send_client_message(&self, window: Window, _event: ClientMessageEvent) -> Result<()> {
        self.record(Request::SendClientMessage(window));
        Ok(())
    }
}

pub(crate) fn xutil(mock: &MockTransport) -> XUtil {
    XUtil::new(Box::new(mock.clone()), &Options::default()).unwrap()
}

pub(crate) fn input(window: Window, detail: u8, state: u16, time: Timestamp) -> InputEvent {
    InputEvent {
        detail,
        time,
        root: ROOT,
        event: window,
        state,
        same_screen: true,
        ..InputEvent::default()
    }
}

pub(crate) fn key_press(window: Window, code: Keycode, state: u16) -> Event {
    Event::KeyPress(input(window, code, state, 0))
}

pub(crate) fn key_release(window: Window, code: Keycode, state: u16) -> Event {
    Event::KeyRelease(input(window, code, state, 0))
}

pub(crate) fn button_press(window: Window, button: Button, state: u16) -> Event {
    Event::ButtonPress(input(window, button, state, 0))
}

pub(crate) fn button_release(window: Window, button: Button, state: u16) -> Event {
    Event::ButtonRelease(input(window, button, state, 0))
}

pub(crate) fn motion(window: Window, x: i16, y: i16, time: Timestamp) -> Event {
    let mut event = input(window, 0, 0, time);
    event.root_x = x;
    event.root_y = y;
    event.event_x = x;
    event.event_y = y;
    Event::MotionNotify(event)
}

fn parse<T: TryParse>(bytes: &[u8; 32]) -> T {
    T::try_parse(bytes).unwrap().0
}

fn put_u32(bytes: &mut [u8; 32], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

pub(crate) fn map_request(parent: Window, window: Window) -> Event {
    let mut bytes = [0u8; 32];
    bytes[0] = 20;
    put_u32(&mut bytes, 4, parent);
    put_u32(&mut bytes, 8, window);
    Event::MapRequest(parse::<MapRequestEvent>(&bytes))
}

pub(crate) fn configure_request(parent: Window, window: Window) -> Event {
    let mut bytes = [0u8; 32];
    bytes[0] = 23;
    put_u32(&mut bytes, 4, parent);
    put_u32(&mut bytes, 8, window);
    Event::ConfigureRequest(parse::<ConfigureRequestEvent>(&bytes))
}

pub(crate) fn property_notify(window: Window, time: Timestamp) -> Event {
    let mut bytes = [0u8; 32];
    bytes[0] = 28;
    put_u32(&mut bytes, 4, window);
    put_u32(&mut bytes, 8, 39);
    put_u32(&mut bytes, 12, time);
    Event::PropertyNotify(parse::<PropertyNotifyEvent>(&bytes))
}

pub(crate) fn mapping_notify(request: Mapping, first_keycode: Keycode, count: u8) -> Event {
    let mut bytes = [0u8; 32];
    bytes[0] = 34;
    bytes[4] = u8::from(request);
    bytes[5] = first_keycode;
    bytes[6] = count;
    Event::MappingNotify(parse::<MappingNotifyEvent>(&bytes))
}

pub(crate) fn bad_window(window: Window) -> ProtocolError {
    ProtocolError {
        kind: ErrorKind::Window,
        error_code: 3,
        sequence: 12,
        bad_value: window,
        major_opcode: 12,
        minor_opcode: 0,
    }
}
