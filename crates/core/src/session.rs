use crate::control::ControlConnection;
use crate::keys::{ClientAuthKeyPair, EncodedClientAuth};
use onion_common::{config::service::ADDRESS_SUFFIX, OnionError, Result, SessionConfig};
use std::fmt;
use std::future::Future;
use tracing::{debug, info};

/// The single external-port to local-port mapping of one service
///
/// The protocol supports several mappings per service; this tool
/// constructs exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port the service is reachable on from the anonymity network
    pub virtual_port: u16,
    /// Local port the daemon forwards incoming streams to
    pub local_port: u16,
}

/// What to ask the daemon for: a publicly reachable service, or one whose
/// descriptor only holders of a client-auth key can read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRequest {
    Public {
        ports: PortMapping,
        await_publication: bool,
    },
    Authenticated {
        ports: PortMapping,
        client_auth: EncodedClientAuth,
        await_publication: bool,
    },
}

impl ServiceRequest {
    /// A service anyone on the network may connect to
    pub fn public(ports: PortMapping) -> Self {
        Self::Public {
            ports,
            await_publication: true,
        }
    }

    /// A service gated on the given client-auth key pair
    pub fn authenticated(ports: PortMapping, client_auth: EncodedClientAuth) -> Self {
        Self::Authenticated {
            ports,
            client_auth,
            await_publication: true,
        }
    }

    pub fn ports(&self) -> PortMapping {
        match self {
            Self::Public { ports, .. } | Self::Authenticated { ports, .. } => *ports,
        }
    }

    /// The encoded key pair gating this service, if any
    pub fn client_auth(&self) -> Option<&EncodedClientAuth> {
        match self {
            Self::Public { .. } => None,
            Self::Authenticated { client_auth, .. } => Some(client_auth),
        }
    }

    /// The public-key text sent to the daemon, if any
    pub fn client_auth_public(&self) -> Option<&str> {
        self.client_auth().map(|auth| auth.public.as_str())
    }

    /// Whether the create reply is withheld until the descriptor is
    /// published (always true here; the reply is the synchronization point)
    pub fn await_publication(&self) -> bool {
        match self {
            Self::Public {
                await_publication, ..
            }
            | Self::Authenticated {
                await_publication, ..
            } => *await_publication,
        }
    }
}

/// The identifier the daemon assigns the service: the address label before
/// the `.onion` suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The externally reachable hostname
    pub fn hostname(&self) -> String {
        format!("{}.{}", self.0, ADDRESS_SUFFIX)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of one ephemeral service session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Authenticating,
    Authenticated,
    ServiceRequested,
    ServiceConfirmed,
    WaitingForInterrupt,
    Removing,
    Closed,
}

/// One ephemeral hidden service, from creation to teardown
///
/// The session owns the control connection for the process lifetime and
/// walks `Init -> Authenticating -> Authenticated -> ServiceRequested ->
/// ServiceConfirmed -> WaitingForInterrupt -> Removing -> Closed`. `Closed`
/// is reached on every path: the connection is released whether the run
/// ends in clean teardown, an authentication failure or a protocol error.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Init,
        }
    }

    /// Run the session to completion
    ///
    /// `shutdown` is the external interruption signal; the binary passes
    /// `tokio::signal::ctrl_c()`, tests pass a channel. It is awaited at
    /// exactly one point, so teardown runs at most once no matter how many
    /// times the underlying signal fires.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.advance(SessionState::Authenticating);
        let mut conn = match ControlConnection::connect(self.config.control_addr).await {
            Ok(conn) => conn,
            Err(err) => {
                // Nothing was acquired; there is no connection to release
                self.advance(SessionState::Closed);
                return Err(err);
            }
        };

        let result = self.drive(&mut conn, shutdown).await;

        // Release the connection on every path, error or not
        conn.quit().await;
        self.advance(SessionState::Closed);

        if result.is_ok() {
            println!("Service terminated");
        }
        result
    }

    /// The full authenticated command sequence against one connection
    async fn drive<F>(&mut self, conn: &mut ControlConnection, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        conn.authenticate(self.config.password.as_deref()).await?;
        self.advance(SessionState::Authenticated);

        let request = self.build_request()?;
        let service_id = conn.add_onion(&request).await?;
        self.advance(SessionState::ServiceRequested);
        info!("daemon assigned service id {}", service_id);

        // The id is not usable until the daemon lists it
        let active = conn.list_onions().await?;
        if !active.iter().any(|id| id == service_id.as_str()) {
            return Err(OnionError::protocol(format!(
                "created service {} missing from the daemon's active list",
                service_id
            )));
        }
        self.advance(SessionState::ServiceConfirmed);

        println!("Ephemeral hidden service created");
        println!("{}", self.exposure_line(&service_id));
        if let Some(auth) = request.client_auth() {
            // Only exposure of the private half; it never reaches the daemon
            println!("Client authentication key: {}", auth.private);
        }

        self.advance(SessionState::WaitingForInterrupt);
        println!("Press Ctrl+C to interrupt...");
        // Single-fire handle: take() makes a second removal impossible
        let mut handle = Some(service_id);
        shutdown.await;
        println!("Ctrl+C pressed. Exiting...");

        self.advance(SessionState::Removing);
        let service_id = handle
            .take()
            .ok_or_else(|| OnionError::protocol("teardown entered without a service handle"))?;
        conn.del_onion(&service_id).await?;

        let active = conn.list_onions().await?;
        if active.iter().any(|id| id == service_id.as_str()) {
            return Err(OnionError::protocol(format!(
                "service {} still listed after removal",
                service_id
            )));
        }

        Ok(())
    }

    /// Build the create request, provisioning a client-auth key pair
    /// unless the service was asked for publicly
    fn build_request(&self) -> Result<ServiceRequest> {
        let ports = PortMapping {
            virtual_port: self.config.service_port,
            local_port: self.config.local_port,
        };

        if self.config.public {
            return Ok(ServiceRequest::public(ports));
        }

        let keypair = ClientAuthKeyPair::generate()?;
        Ok(ServiceRequest::authenticated(ports, keypair.encode()))
    }

    /// The operator-facing line announcing where the service is reachable
    fn exposure_line(&self, service_id: &ServiceId) -> String {
        format!(
            "localhost:{} is exposed at {}:{}",
            self.config.local_port,
            service_id.hostname(),
            self.config.service_port
        )
    }

    fn advance(&mut self, next: SessionState) {
        debug!("session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
