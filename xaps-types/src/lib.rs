//! # xaps-types
//!
//! Wire-level types for the xapsd push-notification relay.
//!
//! This crate covers the two protocol boundaries of the daemon:
//! - [`Notification`] - one push notification and its binary frame encoding
//!   for the push gateway ("enhanced" binary framing)
//! - [`Command`] - the line-oriented command grammar spoken by the mail
//!   server plugin (REGISTER/NOTIFY)
//!
//! Everything here is pure data and encoding; no I/O, no async.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod error;
mod notification;

pub use command::{ArgValue, Command, CommandName};
pub use error::{CommandParseError, EncodeError};
pub use notification::{Notification, DEVICE_TOKEN_LEN, FRAME_COMMAND};
