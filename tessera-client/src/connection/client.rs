//! Connection client for the tessera server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use url::Url;

use tessera_protocol::{
    Action, Defragmenter, ErrorCode, Event, Frame, FrameCodec, ObjectType, Request, Response,
    PROTOCOL_VERSION, RESERVED_SESSION,
};
use tessera_utils::{socket_path, Result, TesseraError};

use crate::config::ClientConfig;
use crate::correlation::Correlator;
use crate::events::ListenerRegistry;

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

/// The default server address: the XDG runtime socket
pub fn default_server_addr() -> String {
    format!("unix://{}", socket_path().to_string_lossy())
}

/// Client connection to a tessera server
///
/// One reader loop and one writer per connection; many logical callers
/// share it concurrently, each with its own correlation slot.
pub struct Connection {
    client_name: String,
    server_version: String,
    config: ClientConfig,
    correlator: Arc<Correlator>,
    listeners: Arc<ListenerRegistry>,
    io_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
    keepalive_task: JoinHandle<()>,
}

impl Connection {
    /// Connect, attach under `client_name`, and start the keep-alive loop
    ///
    /// `addr` is `unix://<path>`, `tcp://<host>:<port>`, or a raw socket
    /// path.
    pub async fn connect(addr: &str, client_name: &str, config: ClientConfig) -> Result<Arc<Self>> {
        let stream = open_stream(addr).await?;
        let framed = Framed::new(stream, FrameCodec::new());

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Frame>(config.max_queued_messages);
        let (event_tx, event_rx) = mpsc::channel::<Frame>(config.max_queued_messages);

        let correlator = Arc::new(Correlator::new(outgoing_tx));
        let listeners = Arc::new(ListenerRegistry::new());

        let io_task = tokio::spawn(io_loop(
            framed,
            outgoing_rx,
            Arc::clone(&correlator),
            event_tx,
            config.max_chunk_size,
        ));
        let dispatch_task = tokio::spawn(dispatch_loop(event_rx, Arc::clone(&listeners)));
        let keepalive_task = tokio::spawn(keepalive_loop(
            Arc::clone(&correlator),
            Duration::from_millis(config.keepalive_interval_ms),
            Duration::from_millis(config.request_timeout_ms),
        ));

        let mut connection = Self {
            client_name: client_name.to_string(),
            server_version: String::new(),
            config,
            correlator,
            listeners,
            io_task,
            dispatch_task,
            keepalive_task,
        };

        let attach = Request::Attach {
            client_name: client_name.to_string(),
            protocol_version: PROTOCOL_VERSION,
        };
        match connection.round_trip(RESERVED_SESSION, &attach).await? {
            Response::Attached { server_version, .. } => {
                info!(
                    "Attached to tessera server {} as {}",
                    server_version, client_name
                );
                connection.server_version = server_version;
            }
            other => {
                return Err(TesseraError::protocol(format!(
                    "unexpected attach response: {}",
                    other.type_name()
                )))
            }
        }

        Ok(Arc::new(connection))
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The listener registry events on this connection dispatch through
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Round-trip a request on a session, with the request's natural
    /// object type
    pub async fn round_trip(&self, session: u16, request: &Request) -> Result<Response> {
        self.round_trip_for(session, request.object_type(), request)
            .await
    }

    /// Round-trip a request with an explicit header object type
    ///
    /// An Error response is surfaced as the matching named condition; any
    /// other response is returned for the proxy to unpack.
    pub async fn round_trip_for(
        &self,
        session: u16,
        object_type: ObjectType,
        request: &Request,
    ) -> Result<Response> {
        let thread = self.correlator.allocate_thread();
        let frame = request
            .to_frame_for(session, thread, object_type)
            .map_err(|e| TesseraError::protocol(e.to_string()))?;

        let deadline = Duration::from_millis(self.config.request_timeout_ms);
        let reply = self.correlator.send_and_wait(frame, deadline).await?;

        let decoded = Response::from_frame(&reply);
        self.correlator.finish_exchange(thread);

        match decoded.map_err(|e| TesseraError::protocol(e.to_string()))? {
            Response::Error { code, message } => Err(error_from_code(code, message)),
            response => Ok(response),
        }
    }

    /// Send a request expecting no reply
    pub async fn fire_and_forget(&self, session: u16, request: &Request) -> Result<()> {
        let thread = self.correlator.allocate_thread();
        let frame = request
            .to_frame(session, thread)
            .map_err(|e| TesseraError::protocol(e.to_string()))?;
        self.correlator.send_no_wait(frame).await
    }

    /// Probe the server
    pub async fn ping(&self) -> Result<()> {
        match self.round_trip(RESERVED_SESSION, &Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(TesseraError::protocol(format!(
                "unexpected ping response: {}",
                other.type_name()
            ))),
        }
    }

    /// Tear the connection down
    pub fn disconnect(&self) {
        self.io_task.abort();
        self.dispatch_task.abort();
        self.keepalive_task.abort();
        self.correlator.fail_all();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Map a wire error code onto the named error condition
fn error_from_code(code: ErrorCode, message: String) -> TesseraError {
    match code {
        ErrorCode::PermissionDenied => TesseraError::PermissionDenied(message),
        ErrorCode::ClientNotGrabbing => TesseraError::ClientNotGrabbing(message),
        ErrorCode::ClientNotReleased => TesseraError::ClientNotReleased(message),
        ErrorCode::SessionNotFound => TesseraError::SessionNotFound(message),
        ErrorCode::ObjectNotFound => TesseraError::ObjectNotFound(message),
        ErrorCode::ClientNotFound => TesseraError::ClientNotFound(message),
        ErrorCode::NameInUse => TesseraError::NameInUse(message),
        ErrorCode::NotBound => TesseraError::NotBound(message),
        ErrorCode::ProtocolMismatch => TesseraError::Protocol(message),
        ErrorCode::InvalidOperation => TesseraError::Protocol(message),
        ErrorCode::InternalError => TesseraError::Internal(message),
    }
}

/// Open the transport named by the address
///
/// The transport kind is a tagged choice resolved once here, at connect
/// time.
async fn open_stream(addr: &str) -> Result<Box<dyn StreamTrait>> {
    if addr.starts_with("tcp://") {
        let url = Url::parse(addr)
            .map_err(|e| TesseraError::connection(format!("Invalid TCP URL '{}': {}", addr, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| TesseraError::connection("Missing host in TCP URL"))?;
        let port = url
            .port()
            .ok_or_else(|| TesseraError::connection("Missing port in TCP URL"))?;

        let target = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|e| TesseraError::connection(format!("Failed to connect to {}: {}", target, e)))?;
        Ok(Box::new(stream))
    } else {
        // Unix socket, either unix:// prefix or raw path
        let path_str = if addr.starts_with("unix://") {
            let url = Url::parse(addr)
                .map_err(|e| TesseraError::connection(format!("Invalid Unix URL: {}", e)))?;
            url.path().to_string()
        } else {
            addr.to_string()
        };

        let path = PathBuf::from(path_str);
        if !path.exists() {
            return Err(TesseraError::ServerNotRunning { path });
        }

        let stream = UnixStream::connect(&path).await.map_err(|e| {
            TesseraError::connection(format!("Failed to connect to {}: {}", path.display(), e))
        })?;
        Ok(Box::new(stream))
    }
}

/// The connection's only reader and only writer
///
/// Reply frames go to the correlation slot matching their thread id;
/// event frames queue for the dispatch task (never dispatched inline, so
/// a slow listener cannot starve callers); anything else is a protocol
/// violation, logged and dropped without killing the loop.
async fn io_loop(
    framed: Framed<Box<dyn StreamTrait>, FrameCodec>,
    mut outgoing: mpsc::Receiver<Frame>,
    correlator: Arc<Correlator>,
    events: mpsc::Sender<Frame>,
    chunk_size: usize,
) {
    let (mut sink, mut stream) = framed.split();
    let mut defrag = Defragmenter::new();

    loop {
        tokio::select! {
            Some(frame) = outgoing.recv() => {
                let mut faulted = false;
                for wire in frame.into_wire_frames(chunk_size) {
                    if let Err(e) = sink.send(wire).await {
                        error!("Failed to send frame: {}", e);
                        faulted = true;
                        break;
                    }
                }
                if faulted {
                    break;
                }
            }

            result = stream.next() => {
                match result {
                    Some(Ok(frame)) => {
                        let Some(complete) = defrag.push(frame) else {
                            continue; // Intermediate fragment
                        };
                        match complete.header.action {
                            Action::Reply => correlator.deposit_reply(complete),
                            Action::Event => {
                                if events.try_send(complete).is_err() {
                                    warn!("Event queue full, dropping event frame");
                                }
                            }
                            other => {
                                warn!("Unexpected {:?} frame from server, dropping", other);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("Failed to receive frame: {}", e);
                        break;
                    }
                    None => {
                        info!("Server closed connection");
                        break;
                    }
                }
            }
        }
    }

    // Connection fault: every blocked caller fails now rather than at its
    // deadline
    correlator.fail_all();
}

/// Decode queued event frames and run listeners
async fn dispatch_loop(mut events: mpsc::Receiver<Frame>, listeners: Arc<ListenerRegistry>) {
    while let Some(frame) = events.recv().await {
        match Event::from_frame(&frame) {
            Ok(event) => listeners.dispatch(&event),
            Err(e) => warn!("Undecodable event frame: {}", e),
        }
    }
}

/// Periodic keep-alive pings through the normal correlator path
async fn keepalive_loop(correlator: Arc<Correlator>, interval: Duration, timeout: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // First tick fires immediately; skip it

    loop {
        ticker.tick().await;

        let thread = correlator.allocate_thread();
        let frame = match Request::Ping.to_frame(RESERVED_SESSION, thread) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode ping: {}", e);
                return;
            }
        };

        match correlator.send_and_wait(frame, timeout).await {
            Ok(_) => {
                correlator.finish_exchange(thread);
                debug!("Keep-alive pong received");
            }
            Err(TesseraError::ConnectionClosed) => {
                debug!("Keep-alive loop stopping, connection closed");
                return;
            }
            Err(e) => {
                warn!("Keep-alive ping failed: {}", e);
            }
        }
    }
}
