use crate::control::{Command, Reply};
use crate::session::{ServiceId, ServiceRequest};
use onion_common::{config::control::CRLF, OnionError, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Authentication state of the control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// A connection to the daemon's control port
///
/// Owns the single TCP connection for the session's lifetime. Commands are
/// sent one at a time and their replies awaited synchronously; the protocol
/// is request/reply over one connection. Authentication is required before
/// any service command. The socket closes when the connection is dropped,
/// so every exit path releases it.
#[derive(Debug)]
pub struct ControlConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    state: ConnectionState,
}

impl ControlConnection {
    /// Connect to the daemon's control port
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            OnionError::connection(format!("cannot reach control port {}: {}", addr, e))
        })?;
        debug!("connected to control port {}", addr);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            state: ConnectionState::Unauthenticated,
        })
    }

    /// Current authentication state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Authenticate the connection, optionally with a controller credential
    ///
    /// An absent credential is valid when the control port requires none.
    /// A rejected credential is fatal; no service command may follow.
    pub async fn authenticate(&mut self, password: Option<&str>) -> Result<()> {
        let reply = self
            .send(Command::Authenticate {
                password: password.map(str::to_owned),
            })
            .await?;

        if !reply.is_ok() {
            self.state = ConnectionState::Closed;
            return Err(OnionError::authentication(format!(
                "{} {}",
                reply.code,
                reply.status_text()
            )));
        }

        self.state = ConnectionState::Authenticated;
        Ok(())
    }

    /// Create an ephemeral hidden service and return its identifier
    ///
    /// The daemon withholds its reply until the service descriptor has
    /// been published, so a successful reply means the service is live.
    pub async fn add_onion(&mut self, request: &ServiceRequest) -> Result<ServiceId> {
        let reply = self.send_authenticated(Command::add_onion(request)).await?;

        if !reply.is_ok() {
            return Err(OnionError::protocol(format!(
                "ADD_ONION rejected: {} {}",
                reply.code,
                reply.status_text()
            )));
        }

        let service_id = reply
            .keyword("ServiceID")
            .ok_or_else(|| OnionError::protocol("create reply carried no ServiceID"))?;
        Ok(ServiceId::new(service_id))
    }

    /// List the identifiers of the daemon's active ephemeral services
    pub async fn list_onions(&mut self) -> Result<Vec<String>> {
        let reply = self.send_authenticated(Command::ListOnions).await?;

        if !reply.is_ok() {
            return Err(OnionError::protocol(format!(
                "GETINFO onions/current rejected: {} {}",
                reply.code,
                reply.status_text()
            )));
        }

        reply
            .list_values("onions/current")
            .ok_or_else(|| OnionError::protocol("list reply carried no onions/current value"))
    }

    /// Remove an ephemeral hidden service
    pub async fn del_onion(&mut self, service_id: &ServiceId) -> Result<()> {
        let reply = self
            .send_authenticated(Command::DelOnion {
                service_id: service_id.to_string(),
            })
            .await?;

        if !reply.is_ok() {
            return Err(OnionError::protocol(format!(
                "DEL_ONION rejected: {} {}",
                reply.code,
                reply.status_text()
            )));
        }
        Ok(())
    }

    /// Close the connection, sending QUIT best-effort
    ///
    /// Errors on the way out are ignored; the socket is released either way.
    pub async fn quit(mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.send(Command::Quit).await;
        }
        self.state = ConnectionState::Closed;
        let _ = self.writer.shutdown().await;
        debug!("control connection closed");
    }

    /// Send a service command, demanding an authenticated connection first
    async fn send_authenticated(&mut self, command: Command) -> Result<Reply> {
        if self.state != ConnectionState::Authenticated {
            return Err(OnionError::protocol(format!(
                "{:?} issued on {:?} connection",
                command,
                self.state
            )));
        }
        self.send(command).await
    }

    /// Send one command and await its complete reply
    async fn send(&mut self, command: Command) -> Result<Reply> {
        let line = command.render();
        debug!("control >> {}", redact(&line));

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(CRLF.as_bytes()).await?;
        self.writer.flush().await?;

        let reply = Reply::read_from(&mut self.reader).await?;
        debug!("control << {} {}", reply.code, reply.status_text());
        Ok(reply)
    }
}

/// Keep credentials out of the logs
fn redact(line: &str) -> &str {
    if line.starts_with("AUTHENTICATE ") {
        "AUTHENTICATE <redacted>"
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PortMapping, ServiceRequest};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A scripted control daemon: answers each received line with the next
    /// canned reply, then records what it saw.
    async fn fake_daemon(replies: Vec<&'static str>) -> (SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = tokio::io::BufReader::new(read_half);
            let mut received = Vec::new();

            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received.push(line.trim_end().to_string());
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
            received
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn connect_fails_when_nothing_listens() {
        // Bind then drop to get a port with no listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ControlConnection::connect(addr).await.unwrap_err();
        assert!(matches!(err, OnionError::Connection(_)));
    }

    #[tokio::test]
    async fn authenticate_success_changes_state() {
        let (addr, daemon) = fake_daemon(vec!["250 OK\r\n"]).await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Unauthenticated);

        conn.authenticate(None).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Authenticated);

        conn.quit().await;
        assert_eq!(daemon.await.unwrap(), vec!["AUTHENTICATE"]);
    }

    #[tokio::test]
    async fn authenticate_sends_quoted_credential() {
        let (addr, daemon) = fake_daemon(vec!["250 OK\r\n"]).await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        conn.authenticate(Some("hunter2")).await.unwrap();
        conn.quit().await;

        assert_eq!(daemon.await.unwrap(), vec![r#"AUTHENTICATE "hunter2""#]);
    }

    #[tokio::test]
    async fn rejected_credential_is_an_authentication_error() {
        let (addr, _daemon) = fake_daemon(vec!["515 Authentication failed\r\n"]).await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        let err = conn.authenticate(Some("wrong")).await.unwrap_err();
        assert!(matches!(err, OnionError::Authentication(_)));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn service_commands_demand_authentication() {
        let (addr, _daemon) = fake_daemon(vec![]).await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        let err = conn.list_onions().await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }

    #[tokio::test]
    async fn add_onion_returns_the_service_id() {
        let (addr, daemon) = fake_daemon(vec![
            "250 OK\r\n",
            "250-ServiceID=abc123\r\n250 OK\r\n",
        ])
        .await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        conn.authenticate(None).await.unwrap();

        let request = ServiceRequest::public(PortMapping {
            virtual_port: 80,
            local_port: 8080,
        });
        let id = conn.add_onion(&request).await.unwrap();
        assert_eq!(id.as_str(), "abc123");

        conn.quit().await;
        let received = daemon.await.unwrap();
        assert_eq!(received[1], "ADD_ONION NEW:BEST Flags=DiscardPK Port=80,8080");
    }

    #[tokio::test]
    async fn add_onion_without_service_id_is_a_protocol_error() {
        let (addr, _daemon) = fake_daemon(vec!["250 OK\r\n", "250 OK\r\n"]).await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        conn.authenticate(None).await.unwrap();

        let request = ServiceRequest::public(PortMapping {
            virtual_port: 80,
            local_port: 8080,
        });
        let err = conn.add_onion(&request).await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }

    #[tokio::test]
    async fn list_onions_reads_the_data_block() {
        let (addr, _daemon) = fake_daemon(vec![
            "250 OK\r\n",
            "250+onions/current=\r\nabc123\r\ndef456\r\n.\r\n250 OK\r\n",
        ])
        .await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        conn.authenticate(None).await.unwrap();

        let ids = conn.list_onions().await.unwrap();
        assert_eq!(ids, vec!["abc123", "def456"]);
    }

    #[tokio::test]
    async fn del_onion_sends_the_identifier() {
        let (addr, daemon) = fake_daemon(vec!["250 OK\r\n", "250 OK\r\n"]).await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        conn.authenticate(None).await.unwrap();
        conn.del_onion(&ServiceId::new("abc123")).await.unwrap();

        conn.quit().await;
        assert_eq!(daemon.await.unwrap()[1], "DEL_ONION abc123");
    }

    #[test]
    fn redact_hides_credentials() {
        assert_eq!(redact(r#"AUTHENTICATE "secret""#), "AUTHENTICATE <redacted>");
        assert_eq!(redact("GETINFO onions/current"), "GETINFO onions/current");
    }
}
