pub mod config;
pub mod error;

pub use config::{default_control_addr, SessionConfig};
pub use error::{OnionError, Result};
