/// Control-port protocol
///
/// The daemon's management interface is textual, line-oriented and
/// request/reply. This module owns the wire form: typed command builders,
/// the reply parser, and the single exclusively-owned connection.

pub mod command;
pub mod connection;
pub mod reply;

pub use command::Command;
pub use connection::{ConnectionState, ControlConnection};
pub use reply::{Reply, ReplyLine};
