use crate::session::ServiceRequest;

/// A control-protocol command, rendered as a single CRLF-terminated line
///
/// The daemon's control protocol is textual and request/reply; each of
/// these builders produces the exact wire form of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate the connection, optionally with a controller credential
    Authenticate { password: Option<String> },
    /// Create an ephemeral hidden service
    AddOnion {
        /// Virtual port the service is reachable on
        virtual_port: u16,
        /// Local port the service forwards to
        local_port: u16,
        /// Base32 public key restricting descriptor access, if any
        client_auth: Option<String>,
    },
    /// List the identifiers of active ephemeral services
    ListOnions,
    /// Remove an ephemeral hidden service
    DelOnion { service_id: String },
    /// Close the control connection
    Quit,
}

impl Command {
    /// Build the create command from a service request
    pub fn add_onion(request: &ServiceRequest) -> Self {
        Self::AddOnion {
            virtual_port: request.ports().virtual_port,
            local_port: request.ports().local_port,
            client_auth: request.client_auth_public().map(str::to_owned),
        }
    }

    /// Render the command as its wire line, without the terminator
    pub fn render(&self) -> String {
        match self {
            Self::Authenticate { password: None } => "AUTHENTICATE".to_string(),
            Self::Authenticate {
                password: Some(password),
            } => format!("AUTHENTICATE {}", quote_string(password)),
            Self::AddOnion {
                virtual_port,
                local_port,
                client_auth,
            } => {
                // DiscardPK: the service key is never persisted, the
                // service exists for this session only.
                let mut line = format!(
                    "ADD_ONION NEW:BEST Flags=DiscardPK Port={},{}",
                    virtual_port, local_port
                );
                if let Some(key) = client_auth {
                    line.push_str(" ClientAuthV3=");
                    line.push_str(key);
                }
                line
            }
            Self::ListOnions => "GETINFO onions/current".to_string(),
            Self::DelOnion { service_id } => format!("DEL_ONION {}", service_id),
            Self::Quit => "QUIT".to_string(),
        }
    }
}

/// Quote a string for the control protocol: wrap in double quotes and
/// backslash-escape embedded quotes and backslashes
fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
