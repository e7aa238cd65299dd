#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// X11 uses inconsistent integer types fairly interchangeably
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]

pub use xgrip_core::descriptor::modifier_string;

pub use crate::xutil::{ErrorHandler, XUtil};

mod bind;
pub mod callback;
pub mod error;
pub mod keybind;
pub mod mousebind;
pub mod x11;
mod xevent;
mod xutil;
