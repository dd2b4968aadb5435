//! tessera server - Background session daemon
//!
//! Accepts client connections over a Unix socket (and optionally TCP),
//! hosts the authoritative session/object state, and fans server-initiated
//! events back out over the same connections used for request/reply.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use tessera_protocol::{
    Defragmenter, Event, Frame, FrameCodec, FrameHeader, Response, SessionEvent, SessionEventKind,
};
use tessera_utils::{init_logging_with_config, runtime_dir, socket_path, LogConfig, Result};

mod config;
mod handlers;
mod registry;
mod session;
mod sweeper;

use config::ServerConfig;
use handlers::{deliver_events, EventOut, EventTarget, HandlerContext, HandlerResult};
use registry::{ClientId, ClientRegistry};
use session::SessionManager;

/// Shared server state handed to every connection task
#[derive(Clone)]
struct ServerState {
    session_manager: Arc<RwLock<SessionManager>>,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging_with_config(LogConfig::server())?;

    let config = Arc::new(config::load()?);
    info!(
        "tessera-server {} starting (worker limit {})",
        env!("CARGO_PKG_VERSION"),
        config.limits.worker_limit
    );

    let state = ServerState {
        session_manager: Arc::new(RwLock::new(SessionManager::new())),
        registry: Arc::new(ClientRegistry::new()),
        config: Arc::clone(&config),
    };

    sweeper::spawn(
        Arc::clone(&state.session_manager),
        Arc::clone(&state.registry),
    );

    // Bound on concurrently served connections
    let permits = Arc::new(Semaphore::new(config.limits.worker_limit));

    let socket = config
        .socket
        .path
        .clone()
        .unwrap_or_else(socket_path);

    std::fs::create_dir_all(runtime_dir())?;
    if socket.exists() {
        warn!("Removing stale socket at {}", socket.display());
        std::fs::remove_file(&socket)?;
    }

    let listener = UnixListener::bind(&socket)?;
    info!("Listening on {}", socket.display());

    if let Some(addr) = &config.socket.tcp_listen {
        let tcp = TcpListener::bind(addr).await?;
        info!("Listening on tcp://{}", addr);
        let tcp_state = state.clone();
        let tcp_permits = Arc::clone(&permits);
        tokio::spawn(async move {
            loop {
                match tcp.accept().await {
                    Ok((stream, peer)) => {
                        debug!("TCP connection from {:?}", peer);
                        spawn_connection(stream, tcp_state.clone(), Arc::clone(&tcp_permits));
                    }
                    Err(e) => {
                        error!("TCP accept failed: {}", e);
                        break;
                    }
                }
            }
        });
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        spawn_connection(stream, state.clone(), Arc::clone(&permits));
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    std::fs::remove_file(&socket).ok();
    info!("tessera-server stopped");
    Ok(())
}

/// Spawn a connection task once a worker permit is available
fn spawn_connection<S>(stream: S, state: ServerState, permits: Arc<Semaphore>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // Semaphore closed: server shutting down
        };
        handle_connection(stream, state).await;
    });
}

/// Serve one client connection until it closes or faults
///
/// This task is the connection's only reader and only writer: incoming
/// frames are reassembled and routed; outgoing replies go straight to the
/// sink, while events from other connections drain through this client's
/// registry queue.
async fn handle_connection<S>(stream: S, state: ServerState)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let framed = Framed::new(stream, FrameCodec::new());
    let (mut sink, mut stream) = framed.split();

    let (tx, mut rx) = mpsc::channel::<Frame>(state.config.limits.max_queued_messages);
    let client_id = state.registry.register_client(tx);
    info!("Connection opened for {}", client_id);

    let ctx = HandlerContext::new(
        Arc::clone(&state.session_manager),
        Arc::clone(&state.registry),
        Arc::clone(&state.config),
        client_id,
    );

    let chunk_size = state.config.limits.max_chunk_size;
    let mut defrag = Defragmenter::new();

    loop {
        tokio::select! {
            // Queued events and cross-client deliveries
            Some(frame) = rx.recv() => {
                if !send_frame(&mut sink, frame, chunk_size).await {
                    break;
                }
            }

            // Incoming requests
            result = stream.next() => {
                match result {
                    Some(Ok(frame)) => {
                        let complete = match defrag.push(frame) {
                            Some(complete) => complete,
                            None => continue, // Intermediate fragment
                        };
                        let header = complete.header;

                        match ctx.route_frame(complete).await {
                            HandlerResult::Response(response) => {
                                if !send_reply(&mut sink, &header, &response, chunk_size).await {
                                    break;
                                }
                            }
                            HandlerResult::ResponseWithEvents { response, events } => {
                                if !send_reply(&mut sink, &header, &response, chunk_size).await {
                                    break;
                                }
                                deliver_events(&state.registry, Some(client_id), events);
                            }
                            HandlerResult::Events(events) => {
                                deliver_events(&state.registry, Some(client_id), events);
                            }
                            HandlerResult::NoResponse => {}
                        }
                    }
                    Some(Err(e)) => {
                        // Connection fault: a short read invalidates the
                        // whole connection
                        error!("Receive failed for {}: {}", client_id, e);
                        break;
                    }
                    None => {
                        info!("Connection closed by {}", client_id);
                        break;
                    }
                }
            }
        }
    }

    cleanup_client(&state, client_id).await;
}

/// Write one frame, fragmenting oversized payloads
async fn send_frame<S>(
    sink: &mut futures::stream::SplitSink<Framed<S, FrameCodec>, Frame>,
    frame: Frame,
    chunk_size: usize,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    for wire in frame.into_wire_frames(chunk_size) {
        if let Err(e) = sink.send(wire).await {
            error!("Send failed: {}", e);
            return false;
        }
    }
    true
}

/// Encode and write the reply to a request
async fn send_reply<S>(
    sink: &mut futures::stream::SplitSink<Framed<S, FrameCodec>, Frame>,
    request_header: &FrameHeader,
    response: &Response,
    chunk_size: usize,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let frame = match response.reply_frame(request_header) {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to encode {} reply: {}", response.type_name(), e);
            return true; // Caller times out; connection stays usable
        }
    };
    send_frame(sink, frame, chunk_size).await
}

/// Remove every trace of a disconnected client
///
/// Token holdings release, handoffs it was party to revert, consumer
/// registrations disappear, and each joined session observes a Left event.
/// This keeps holder sets consistent under mid-operation connection faults.
async fn cleanup_client(state: &ServerState, client_id: ClientId) {
    let Some((name, sessions)) = state.registry.unregister_client(client_id) else {
        return;
    };
    let Some(name) = name else {
        return; // Never attached; nothing to scrub
    };

    info!("Cleaning up {} ({})", name, client_id);

    let mut events = Vec::new();
    {
        let mut manager = state.session_manager.write().await;
        for number in sessions {
            let Some(session) = manager.get_mut(number) else {
                continue;
            };
            let _ = session.leave(&name);
            let session_name = session.name().to_string();

            for event in session.scrub_client(&name) {
                events.push(EventOut {
                    session: number,
                    target: EventTarget::Session,
                    event,
                });
            }
            events.push(EventOut {
                session: number,
                target: EventTarget::Session,
                event: Event::Session(SessionEvent {
                    session: session_name,
                    kind: SessionEventKind::Left,
                    client: name.clone(),
                }),
            });
        }
    }

    deliver_events(&state.registry, None, events);
}
