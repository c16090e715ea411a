//! The line codec (component A): framing a byte stream into lines, and
//! parsing/serializing lines into a generic [`IrcMessage`].
//!
//! This crate deliberately stops at the generic message shape rather than a
//! closed `Cmd` enum: the dispatcher in `irc-client` routes on `command`
//! (including numeric ranges) via registration tables, which needs the raw
//! command string rather than a pre-committed set of variants.

mod codec;
mod error;
mod message;
mod prefix;

pub use codec::LineDecoder;
pub use error::{MessageError, ParseError};
pub use message::{IrcMessage, MAX_LINE_LEN, MAX_PARAMS};
pub use prefix::Prefix;
