//! Core data contract shared by every worker.
//!
//! - [`network`]: network identities and their stored configuration
//! - [`record`]: the normalized log record produced for each protocol event
//! - [`command`]: out-of-band control commands routed to sessions

pub mod command;
pub mod network;
pub mod record;

pub use command::{CommandId, CommandKind, ControlCommand, UnknownCommandKind};
pub use network::{LoggerConfig, NetworkConfig, NetworkId};
pub use record::{LogKind, LogRecord, RecordId, StoredRecord, date_bucket};
