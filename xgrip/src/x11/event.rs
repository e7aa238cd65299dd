//! The closed set of events the dispatch loop understands.
use x11rb::protocol::xproto::{
    ButtonPressEvent, CirculateNotifyEvent, ClientMessageEvent, ColormapNotifyEvent,
    ConfigureNotifyEvent, ConfigureRequestEvent, CreateNotifyEvent, DestroyNotifyEvent,
    EnterNotifyEvent, ExposeEvent, FocusInEvent, GraphicsExposureEvent, GravityNotifyEvent,
    KeyPressEvent, KeymapNotifyEvent, MapNotifyEvent, MapRequestEvent, MappingNotifyEvent,
    MotionNotifyEvent, NoExposureEvent, PropertyNotifyEvent, ReparentNotifyEvent,
    ResizeRequestEvent, SelectionClearEvent, SelectionNotifyEvent, SelectionRequestEvent,
    Timestamp, UnmapNotifyEvent, VisibilityNotifyEvent, Window,
};
use x11rb::protocol::ErrorKind;
use x11rb::x11_utils::X11Error;

/// Target of events that are not addressed to any window.
pub const NO_WINDOW: Window = 0;

/// Key, button and motion events, which share their layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEvent {
    /// Key code, button number or motion hint.
    pub detail: u8,
    pub time: Timestamp,
    pub root: Window,
    pub event: Window,
    pub child: Window,
    pub root_x: i16,
    pub root_y: i16,
    pub event_x: i16,
    pub event_y: i16,
    pub state: u16,
    pub same_screen: bool,
}

macro_rules! impl_input_from {
    ($($event:ty),*) => {
        $(
            impl From<$event> for InputEvent {
                fn from(e: $event) -> Self {
                    Self {
                        detail: u8::from(e.detail),
                        time: e.time,
                        root: e.root,
                        event: e.event,
                        child: e.child,
                        root_x: e.root_x,
                        root_y: e.root_y,
                        event_x: e.event_x,
                        event_y: e.event_y,
                        state: u16::from(e.state),
                        same_screen: e.same_screen,
                    }
                }
            }
        )*
    };
}

impl_input_from!(KeyPressEvent, ButtonPressEvent, MotionNotifyEvent);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    KeyPress,
    KeyRelease,
    ButtonPress,
    ButtonRelease,
    MotionNotify,
    EnterNotify,
    LeaveNotify,
    FocusIn,
    FocusOut,
    KeymapNotify,
    Expose,
    GraphicsExposure,
    NoExposure,
    VisibilityNotify,
    CreateNotify,
    DestroyNotify,
    UnmapNotify,
    MapNotify,
    MapRequest,
    ReparentNotify,
    ConfigureNotify,
    ConfigureRequest,
    GravityNotify,
    ResizeRequest,
    CirculateNotify,
    CirculateRequest,
    PropertyNotify,
    SelectionClear,
    SelectionRequest,
    SelectionNotify,
    ColormapNotify,
    ClientMessage,
    MappingNotify,
    Unsupported,
}

#[derive(Debug, Clone)]
pub enum Event {
    KeyPress(InputEvent),
    KeyRelease(InputEvent),
    ButtonPress(InputEvent),
    ButtonRelease(InputEvent),
    MotionNotify(InputEvent),
    EnterNotify(EnterNotifyEvent),
    LeaveNotify(EnterNotifyEvent),
    FocusIn(FocusInEvent),
    FocusOut(FocusInEvent),
    KeymapNotify(KeymapNotifyEvent),
    Expose(ExposeEvent),
    GraphicsExposure(GraphicsExposureEvent),
    NoExposure(NoExposureEvent),
    VisibilityNotify(VisibilityNotifyEvent),
    CreateNotify(CreateNotifyEvent),
    DestroyNotify(DestroyNotifyEvent),
    UnmapNotify(UnmapNotifyEvent),
    MapNotify(MapNotifyEvent),
    MapRequest(MapRequestEvent),
    ReparentNotify(ReparentNotifyEvent),
    ConfigureNotify(ConfigureNotifyEvent),
    ConfigureRequest(ConfigureRequestEvent),
    GravityNotify(GravityNotifyEvent),
    ResizeRequest(ResizeRequestEvent),
    CirculateNotify(CirculateNotifyEvent),
    CirculateRequest(CirculateNotifyEvent),
    PropertyNotify(PropertyNotifyEvent),
    SelectionClear(SelectionClearEvent),
    SelectionRequest(SelectionRequestEvent),
    SelectionNotify(SelectionNotifyEvent),
    ColormapNotify(ColormapNotifyEvent),
    ClientMessage(ClientMessageEvent),
    MappingNotify(MappingNotifyEvent),
    /// Anything else the server sends, named for logging.
    Unsupported(String),
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::KeyPress(_) => EventKind::KeyPress,
            Event::KeyRelease(_) => EventKind::KeyRelease,
            Event::ButtonPress(_) => EventKind::ButtonPress,
            Event::ButtonRelease(_) => EventKind::ButtonRelease,
            Event::MotionNotify(_) => EventKind::MotionNotify,
            Event::EnterNotify(_) => EventKind::EnterNotify,
            Event::LeaveNotify(_) => EventKind::LeaveNotify,
            Event::FocusIn(_) => EventKind::FocusIn,
            Event::FocusOut(_) => EventKind::FocusOut,
            Event::KeymapNotify(_) => EventKind::KeymapNotify,
            Event::Expose(_) => EventKind::Expose,
            Event::GraphicsExposure(_) => EventKind::GraphicsExposure,
            Event::NoExposure(_) => EventKind::NoExposure,
            Event::VisibilityNotify(_) => EventKind::VisibilityNotify,
            Event::CreateNotify(_) => EventKind::CreateNotify,
            Event::DestroyNotify(_) => EventKind::DestroyNotify,
            Event::UnmapNotify(_) => EventKind::UnmapNotify,
            Event::MapNotify(_) => EventKind::MapNotify,
            Event::MapRequest(_) => EventKind::MapRequest,
            Event::ReparentNotify(_) => EventKind::ReparentNotify,
            Event::ConfigureNotify(_) => EventKind::ConfigureNotify,
            Event::ConfigureRequest(_) => EventKind::ConfigureRequest,
            Event::GravityNotify(_) => EventKind::GravityNotify,
            Event::ResizeRequest(_) => EventKind::ResizeRequest,
            Event::CirculateNotify(_) => EventKind::CirculateNotify,
            Event::CirculateRequest(_) => EventKind::CirculateRequest,
            Event::PropertyNotify(_) => EventKind::PropertyNotify,
            Event::SelectionClear(_) => EventKind::SelectionClear,
            Event::SelectionRequest(_) => EventKind::SelectionRequest,
            Event::SelectionNotify(_) => EventKind::SelectionNotify,
            Event::ColormapNotify(_) => EventKind::ColormapNotify,
            Event::ClientMessage(_) => EventKind::ClientMessage,
            Event::MappingNotify(_) => EventKind::MappingNotify,
            Event::Unsupported(_) => EventKind::Unsupported,
        }
    }

    /// Windows whose callbacks receive this event. Map and configure requests reach both
    /// the window and its parent.
    #[must_use]
    pub fn targets(&self) -> heapless::Vec<Window, 2> {
        let mut targets = heapless::Vec::new();
        let (first, second) = match self {
            Event::KeyPress(e)
            | Event::KeyRelease(e)
            | Event::ButtonPress(e)
            | Event::ButtonRelease(e)
            | Event::MotionNotify(e) => (e.event, None),
            Event::EnterNotify(e) | Event::LeaveNotify(e) => (e.event, None),
            Event::FocusIn(e) | Event::FocusOut(e) => (e.event, None),
            Event::Expose(e) => (e.window, None),
            Event::GraphicsExposure(e) => (e.drawable, None),
            Event::NoExposure(e) => (e.drawable, None),
            Event::VisibilityNotify(e) => (e.window, None),
            Event::CreateNotify(e) => (e.parent, None),
            Event::DestroyNotify(e) => (e.window, None),
            Event::UnmapNotify(e) => (e.window, None),
            Event::MapNotify(e) => (e.event, None),
            Event::MapRequest(e) => (e.window, Some(e.parent)),
            Event::ReparentNotify(e) => (e.window, None),
            Event::ConfigureNotify(e) => (e.window, None),
            Event::ConfigureRequest(e) => (e.window, Some(e.parent)),
            Event::GravityNotify(e) => (e.window, None),
            Event::ResizeRequest(e) => (e.window, None),
            Event::CirculateNotify(e) | Event::CirculateRequest(e) => (e.window, None),
            Event::PropertyNotify(e) => (e.window, None),
            Event::SelectionClear(e) => (e.owner, None),
            Event::SelectionRequest(e) => (e.requestor, None),
            Event::SelectionNotify(e) => (e.requestor, None),
            Event::ColormapNotify(e) => (e.window, None),
            Event::ClientMessage(e) => (e.window, None),
            Event::KeymapNotify(_) | Event::MappingNotify(_) => (NO_WINDOW, None),
            Event::Unsupported(_) => return targets,
        };
        // Capacity is two, neither push can fail
        let _ = targets.push(first);
        if let Some(second) = second.filter(|second| *second != first) {
            let _ = targets.push(second);
        }
        targets
    }

    #[must_use]
    pub fn input(&self) -> Option<&InputEvent> {
        match self {
            Event::KeyPress(e)
            | Event::KeyRelease(e)
            | Event::ButtonPress(e)
            | Event::ButtonRelease(e)
            | Event::MotionNotify(e) => Some(e),
            _ => None,
        }
    }

    /// Server time carried by the event, for the kinds that carry one.
    #[must_use]
    pub fn time(&self) -> Option<Timestamp> {
        match self {
            Event::KeyPress(e)
            | Event::KeyRelease(e)
            | Event::ButtonPress(e)
            | Event::ButtonRelease(e)
            | Event::MotionNotify(e) => Some(e.time),
            Event::EnterNotify(e) | Event::LeaveNotify(e) => Some(e.time),
            Event::PropertyNotify(e) => Some(e.time),
            Event::SelectionClear(e) => Some(e.time),
            Event::SelectionRequest(e) => Some(e.time),
            Event::SelectionNotify(e) => Some(e.time),
            _ => None,
        }
    }
}

impl From<x11rb::protocol::Event> for Event {
    fn from(event: x11rb::protocol::Event) -> Self {
        use x11rb::protocol::Event as X;
        match event {
            X::KeyPress(e) => Event::KeyPress(e.into()),
            X::KeyRelease(e) => Event::KeyRelease(e.into()),
            X::ButtonPress(e) => Event::ButtonPress(e.into()),
            X::ButtonRelease(e) => Event::ButtonRelease(e.into()),
            X::MotionNotify(e) => Event::MotionNotify(e.into()),
            X::EnterNotify(e) => Event::EnterNotify(e),
            X::LeaveNotify(e) => Event::LeaveNotify(e),
            X::FocusIn(e) => Event::FocusIn(e),
            X::FocusOut(e) => Event::FocusOut(e),
            X::KeymapNotify(e) => Event::KeymapNotify(e),
            X::Expose(e) => Event::Expose(e),
            X::GraphicsExposure(e) => Event::GraphicsExposure(e),
            X::NoExposure(e) => Event::NoExposure(e),
            X::VisibilityNotify(e) => Event::VisibilityNotify(e),
            X::CreateNotify(e) => Event::CreateNotify(e),
            X::DestroyNotify(e) => Event::DestroyNotify(e),
            X::UnmapNotify(e) => Event::UnmapNotify(e),
            X::MapNotify(e) => Event::MapNotify(e),
            X::MapRequest(e) => Event::MapRequest(e),
            X::ReparentNotify(e) => Event::ReparentNotify(e),
            X::ConfigureNotify(e) => Event::ConfigureNotify(e),
            X::ConfigureRequest(e) => Event::ConfigureRequest(e),
            X::GravityNotify(e) => Event::GravityNotify(e),
            X::ResizeRequest(e) => Event::ResizeRequest(e),
            X::CirculateNotify(e) => Event::CirculateNotify(e),
            X::CirculateRequest(e) => Event::CirculateRequest(e),
            X::PropertyNotify(e) => Event::PropertyNotify(e),
            X::SelectionClear(e) => Event::SelectionClear(e),
            X::SelectionRequest(e) => Event::SelectionRequest(e),
            X::SelectionNotify(e) => Event::SelectionNotify(e),
            X::ColormapNotify(e) => Event::ColormapNotify(e),
            X::ClientMessage(e) => Event::ClientMessage(e),
            X::MappingNotify(e) => Event::MappingNotify(e),
            other => Event::Unsupported(format!("{other:?}")),
        }
    }
}

/// A request the server refused, delivered asynchronously.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} error for request {major_opcode}.{minor_opcode}, bad value {bad_value}, sequence {sequence}")]
pub struct ProtocolError {
    pub kind: ErrorKind,
    pub error_code: u8,
    pub sequence: u16,
    pub bad_value: u32,
    pub major_opcode: u8,
    pub minor_opcode: u16,
}

impl From<X11Error> for ProtocolError {
    fn from(e: X11Error) -> Self {
        Self {
            kind: e.error_kind,
            error_code: e.error_code,
            sequence: e.sequence,
            bad_value: e.bad_value,
            major_opcode: e.major_opcode,
            minor_opcode: e.minor_opcode,
        }
    }
}

/// One entry of the event queue.
#[derive(Debug, Clone)]
pub enum Incoming {
    Event(Event),
    Error(ProtocolError),
}

impl From<x11rb::protocol::Event> for Incoming {
    fn from(event: x11rb::protocol::Event) -> Self {
        match event {
            x11rb::protocol::Event::Error(e) => Incoming::Error(e.into()),
            other => Incoming::Event(other.into()),
        }
    }
}
