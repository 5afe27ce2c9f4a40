pub mod control;
pub mod keys;
pub mod session;

pub use keys::{ClientAuthKeyPair, EncodedClientAuth, KeyError};
pub use session::{PortMapping, ServiceId, ServiceRequest, Session, SessionState};

// Re-export control types
pub use control::{Command, ConnectionState, ControlConnection, Reply, ReplyLine};
