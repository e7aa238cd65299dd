use std::io;

use x11rb::errors::{ConnectError, ConnectionError, ReplyError};
use x11rb::protocol::xproto::{GrabStatus, Window};

use crate::x11::event::EventKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] xgrip_core::error::Error),
    #[error(transparent)]
    X11Connect(#[from] ConnectError),
    #[error(transparent)]
    X11Connection(#[from] ConnectionError),
    #[error(transparent)]
    X11Reply(#[from] ReplyError),
    #[error("Could not grab {descriptor:?} on window {window}, access denied, another client likely holds the same grab")]
    GrabConflict { descriptor: String, window: Window },
    #[error("Server denied the grab, another client likely holds it")]
    GrabDenied,
    #[error("Grab failed with status {0:?}")]
    GrabFailed(GrabStatus),
    #[error("Can not bind {0:?} events, only key and button presses or releases can be bound")]
    BindingKind(EventKind),
    #[error("Connection to the X server closed")]
    ConnectionClosed,
    #[error("The event loop is already running")]
    LoopRunning,
    #[error(transparent)]
    Io(#[from] io::Error),
}
