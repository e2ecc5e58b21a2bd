use std::{
    fmt,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, info, trace, warn};

use crate::{
    config::DEFAULT_CONNECT_TIMEOUT,
    error::{ChannelError, ProtocolError},
};

use super::{
    DEFAULT_MAX_FRAME, ProtocolTransport, Request, RequestPayload, TimedStream, TransportError,
    decoder::{ResponsePayload, Status, decode_ack},
};

/// Username and password offered during the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Host and port of the server plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn resolve(&self) -> std::io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no resolved address")
            })
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(value: SocketAddr) -> Self {
        Self::new(value.ip().to_string(), value.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle of a [`SessionChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    /// One request is in flight.
    Busy,
    Closing,
}

struct Slot {
    transport: Option<ProtocolTransport<TimedStream>>,
    endpoint: Option<Endpoint>,
}

/// One authenticated connection to one server.
///
/// The wire carries no request identifiers, so the channel never pipelines:
/// concurrent callers queue on a single in-flight slot and each request runs
/// to completion, error or timeout before the next one is written. A timed-out
/// or broken connection is torn down and stays down until [`connect`] is called
/// again.
///
/// [`connect`]: SessionChannel::connect
pub struct SessionChannel {
    slot: Mutex<Slot>,
    state: Mutex<ChannelState>,
    connect_timeout: Duration,
    max_frame: usize,
}

impl Default for SessionChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME)
    }
}

impl SessionChannel {
    pub fn new(connect_timeout: Duration, max_frame: usize) -> Self {
        Self {
            slot: Mutex::new(Slot {
                transport: None,
                endpoint: None,
            }),
            state: Mutex::new(ChannelState::Disconnected),
            connect_timeout,
            max_frame,
        }
    }

    /// Current state; does not wait for an in-flight request.
    pub fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    /// Endpoint of the live session, if any.
    pub fn endpoint(&self) -> Option<Endpoint> {
        lock(&self.slot).endpoint.clone()
    }

    /// Opens the transport and authenticates.
    ///
    /// A no-op on a channel that is already connected. Credentials are only
    /// used for the handshake and are not retained.
    pub fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
    ) -> Result<(), ChannelError> {
        let mut slot = lock(&self.slot);
        if slot.transport.is_some() {
            if slot.endpoint.as_ref() != Some(endpoint) {
                warn!(
                    "already connected to {:?}, ignoring connect to {endpoint}",
                    slot.endpoint
                );
            }
            return Ok(());
        }

        self.set_state(ChannelState::Connecting);
        let stream = endpoint
            .resolve()
            .and_then(|addr| TcpStream::connect_timeout(&addr, self.connect_timeout))
            .map_err(|source| {
                self.set_state(ChannelState::Disconnected);
                ChannelError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable nagle on {endpoint}: {e}");
        }

        self.set_state(ChannelState::Authenticating);
        let mut transport =
            ProtocolTransport::with_max_frame(TimedStream::new(stream), self.max_frame);

        match self.handshake(&mut transport, credentials) {
            Ok(()) => {
                transport.get_mut().arm(None);
                slot.transport = Some(transport);
                slot.endpoint = Some(endpoint.clone());
                self.set_state(ChannelState::Ready);
                info!("session established with {endpoint}");
                Ok(())
            }
            Err(e) => {
                transport.get_ref().shutdown();
                self.set_state(ChannelState::Disconnected);
                warn!("handshake with {endpoint} failed: {e}");
                Err(e)
            }
        }
    }

    fn handshake(
        &self,
        transport: &mut ProtocolTransport<TimedStream>,
        credentials: Option<&Credentials>,
    ) -> Result<(), ChannelError> {
        transport.get_mut().arm(Some(self.connect_timeout));

        let hello = Request::Authenticate {
            username: credentials.map(|c| c.username().to_string()),
            password: credentials.map(|c| c.password().to_string()),
        };
        let reply = transport
            .write_request(&hello)
            .and_then(|()| transport.read_frame())
            .map_err(|e| self.transport_error(e, self.connect_timeout))?;

        let payload = ResponsePayload::new(reply);
        let reply = decode_ack(&payload).map_err(ChannelError::Handshake)?;
        match reply.status {
            Status::Success => Ok(()),
            Status::PartialSuccess => Err(ChannelError::Handshake(ProtocolError::ShapeMismatch {
                expected: "status 200 for authentication".to_string(),
                found: "status 207".to_string(),
                raw: payload.as_bytes().to_vec(),
            })),
            Status::AuthenticationFailed => Err(ChannelError::Authentication {
                reason: reply
                    .message
                    .unwrap_or_else(|| "credentials rejected".to_string()),
            }),
            Status::ServerError => Err(ChannelError::Refused {
                reason: reply
                    .message
                    .unwrap_or_else(|| "server error during handshake".to_string()),
            }),
        }
    }

    /// Sends one request and waits for its response.
    ///
    /// Fails with [`ChannelError::NotConnected`] unless the channel is ready.
    /// On timeout or transport failure the connection is torn down and the
    /// channel moves to [`ChannelState::Disconnected`]; it never reconnects by
    /// itself.
    pub fn send(
        &self,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> Result<ResponsePayload, ChannelError> {
        let mut slot = lock(&self.slot);
        let Some(transport) = slot.transport.as_mut() else {
            return Err(ChannelError::NotConnected);
        };

        if payload.len() > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame,
            }
            .into());
        }

        self.set_state(ChannelState::Busy);
        trace!("sending {} request ({} bytes)", payload.kind(), payload.len());
        transport.get_mut().arm(Some(timeout));

        let result = transport
            .write_frame(payload.as_bytes())
            .and_then(|()| transport.read_frame());

        match result {
            Ok(bytes) => {
                transport.get_mut().arm(None);
                self.set_state(ChannelState::Ready);
                trace!("{} response of {} bytes", payload.kind(), bytes.len());
                Ok(ResponsePayload::new(bytes))
            }
            Err(e) => {
                let err = self.transport_error(e, timeout);
                warn!("{} request failed, dropping connection: {err}", payload.kind());
                self.teardown(&mut slot);
                Err(err)
            }
        }
    }

    /// Says goodbye to the server, best effort, and drops the connection.
    pub fn close(&self) {
        let mut slot = lock(&self.slot);
        let Some(transport) = slot.transport.as_mut() else {
            return;
        };

        self.set_state(ChannelState::Closing);
        transport.get_mut().arm(Some(self.connect_timeout));
        if let Err(e) = transport
            .write_request(&Request::CloseConnection)
            .and_then(|()| transport.read_frame())
        {
            debug!("close handshake incomplete: {e}");
        }

        self.teardown(&mut slot);
        info!("session closed");
    }

    fn teardown(&self, slot: &mut MutexGuard<'_, Slot>) {
        if let Some(transport) = slot.transport.take() {
            transport.get_ref().shutdown();
        }
        slot.endpoint = None;
        self.set_state(ChannelState::Disconnected);
    }

    fn transport_error(&self, e: TransportError, timeout: Duration) -> ChannelError {
        if e.is_timeout() {
            ChannelError::Timeout(timeout)
        } else {
            ChannelError::Transport(e)
        }
    }

    fn set_state(&self, state: ChannelState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!("channel {:?} -> {:?}", *current, state);
            *current = state;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        CommandRecord, Response, ResponseBody, STATUS_PARTIAL, StubOptions, StubServer,
    };

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("Admin", "hunter2");
        let shown = format!("{creds:?}");

        assert!(shown.contains("Admin"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn fresh_channel_refuses_to_send() {
        let channel = SessionChannel::default();
        let payload = RequestPayload::try_from(Request::Ping).unwrap();

        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(matches!(
            channel.send(&payload, Duration::from_secs(1)),
            Err(ChannelError::NotConnected)
        ));
    }

    #[test]
    fn unreachable_endpoint_is_a_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        drop(listener);

        let channel = SessionChannel::new(Duration::from_millis(500), DEFAULT_MAX_FRAME);
        let err = channel.connect(&endpoint, None).unwrap_err();

        assert!(matches!(err, ChannelError::Connect { .. }));
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[test]
    fn connect_reaches_ready_and_is_idempotent() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let endpoint = Endpoint::from(stub.addr);
        let channel = SessionChannel::default();

        channel.connect(&endpoint, None).unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
        assert_eq!(channel.endpoint(), Some(endpoint.clone()));

        channel.connect(&endpoint, None).unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);

        channel.close();
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert_eq!(channel.endpoint(), None);
    }

    #[test]
    fn rejected_credentials_leave_channel_disconnected() {
        let stub = StubServer::spawn(StubOptions {
            credentials: Some(Credentials::new("Admin", "secret")),
            ..StubOptions::default()
        })
        .unwrap();
        let channel = SessionChannel::default();

        let err = channel
            .connect(&Endpoint::from(stub.addr), Some(&Credentials::new("Admin", "nope")))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Authentication { .. }));
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[test]
    fn partial_success_is_not_an_authentication() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut transport = ProtocolTransport::new(stream);
            transport.read_request().unwrap();
            transport
                .write_response(&Response::new(STATUS_PARTIAL, ResponseBody::Empty))
                .unwrap();
        });

        let channel = SessionChannel::default();
        let err = channel.connect(&endpoint, None).unwrap_err();
        server.join().unwrap();

        assert!(matches!(
            err,
            ChannelError::Handshake(ProtocolError::ShapeMismatch { .. })
        ));
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[test]
    fn timeout_tears_the_connection_down() {
        let stub = StubServer::spawn(StubOptions {
            stall_set_blocks_after: Some(0),
            stall_for: Duration::from_secs(2),
            ..StubOptions::default()
        })
        .unwrap();
        let channel = SessionChannel::default();
        channel.connect(&Endpoint::from(stub.addr), None).unwrap();

        let payload = RequestPayload::try_from(Request::SetBlocks(Vec::new())).unwrap();
        let err = channel
            .send(&payload, Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
        assert_eq!(channel.state(), ChannelState::Disconnected);

        let ping = RequestPayload::try_from(Request::Ping).unwrap();
        assert!(matches!(
            channel.send(&ping, Duration::from_secs(1)),
            Err(ChannelError::NotConnected)
        ));
    }

    #[test]
    fn oversized_payload_is_refused_without_io() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channel = SessionChannel::new(Duration::from_secs(1), 16);
        channel.connect(&Endpoint::from(stub.addr), None).unwrap();

        let payload = RequestPayload::try_from(Request::ExecuteCommands(vec![CommandRecord {
            text: "say this text is longer than sixteen bytes".to_string(),
            player: None,
        }]))
        .unwrap();
        let err = channel.send(&payload, Duration::from_secs(1)).unwrap_err();

        assert!(matches!(
            err,
            ChannelError::Transport(TransportError::FrameTooLarge { max: 16, .. })
        ));
        assert_eq!(channel.state(), ChannelState::Ready);
    }
}
