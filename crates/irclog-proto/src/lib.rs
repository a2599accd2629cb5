//! # irclog-proto
//!
//! The client side of the IRC line protocol, as much of it as a logging bot
//! needs: parsing `nick!user@host` prefixes, parsing and serializing
//! messages, and a newline-delimited codec for tokio.
//!
//! ```rust
//! use irclog_proto::{Command, Message};
//!
//! let msg: Message = ":alice!al@example.org PRIVMSG #rust :hello there".parse().unwrap();
//! assert_eq!(msg.source_nickname(), Some("alice"));
//! assert!(matches!(msg.command, Command::PRIVMSG(ref target, _) if target == "#rust"));
//!
//! let join = Message::from(Command::JOIN("#rust".to_string(), None));
//! assert_eq!(join.to_string(), "JOIN #rust");
//! ```

#![deny(clippy::all)]

pub mod chan;
pub mod command;
pub mod error;
pub mod line;
pub mod message;
pub mod prefix;

pub use chan::{CHANNEL_PREFIX, is_channel_name};
pub use command::Command;
pub use error::{MessageParseError, ProtocolError};
pub use line::LineCodec;
pub use message::{Message, is_middle_param};
pub use prefix::Prefix;
