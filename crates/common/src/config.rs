use std::net::{IpAddr, SocketAddr};

/// Control protocol constants
pub mod control {
    use std::net::Ipv4Addr;

    /// Default control port of the local daemon
    pub const DEFAULT_CONTROL_PORT: u16 = 9051;

    /// Default control host; the control port is a local management
    /// interface, loopback only
    pub const DEFAULT_CONTROL_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

    /// Line terminator for commands and replies
    pub const CRLF: &str = "\r\n";

    /// Status code for a successful reply
    pub const STATUS_OK: u16 = 250;
}

/// Service constants
pub mod service {
    /// Default virtual port the hidden service listens on
    pub const DEFAULT_SERVICE_PORT: u16 = 80;

    /// Top-level suffix of generated service addresses
    pub const ADDRESS_SUFFIX: &str = "onion";
}

/// Configuration for one ephemeral service session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Control port endpoint of the local daemon
    pub control_addr: SocketAddr,

    /// Local port the service forwards to
    pub local_port: u16,

    /// Virtual port the service is reachable on
    pub service_port: u16,

    /// Controller credential, if the control port requires one
    pub password: Option<String>,

    /// Skip client authentication and expose the service publicly
    pub public: bool,
}

impl SessionConfig {
    /// Create a configuration with default control endpoint and service port
    pub fn new(local_port: u16) -> Self {
        Self {
            control_addr: default_control_addr(),
            local_port,
            service_port: service::DEFAULT_SERVICE_PORT,
            password: None,
            public: false,
        }
    }
}

/// The daemon's default control endpoint (127.0.0.1:9051)
pub fn default_control_addr() -> SocketAddr {
    SocketAddr::new(
        IpAddr::V4(control::DEFAULT_CONTROL_HOST),
        control::DEFAULT_CONTROL_PORT,
    )
}
