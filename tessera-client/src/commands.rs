//! CLI command execution

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use tessera_client::{
    ClientConfig, Connection, RegistryProxy, SessionHandle, SessionListener, TokenListener,
};
use tessera_protocol::{SessionEvent, TokenEvent, TokenEventKind};
use tessera_utils::Result;

use crate::cli::{Args, Command};

/// Connect, attach, and run one command
pub async fn run(args: Args) -> Result<()> {
    let addr = args
        .addr
        .clone()
        .unwrap_or_else(tessera_client::connection::default_server_addr);
    let name = args
        .name
        .clone()
        .unwrap_or_else(|| format!("cli-{}", Uuid::new_v4().simple()));
    let config = ClientConfig::load()?;

    debug!("Connecting to {} as {}", addr, name);
    let conn = Connection::connect(&addr, &name, config).await?;

    match args.command {
        Command::List => {
            let names = RegistryProxy::new(conn).list().await?;
            if names.is_empty() {
                println!("no sessions bound");
            }
            for name in names {
                println!("{}", name);
            }
        }

        Command::Bind { session } => {
            let info = RegistryProxy::new(conn).bind(&session).await?;
            println!("bound {} (session number {})", info.name, info.number);
        }

        Command::Unbind { session } => {
            RegistryProxy::new(conn).unbind(&session).await?;
            println!("unbound {}", session);
        }

        Command::Info { session } => {
            let info = RegistryProxy::new(Arc::clone(&conn)).lookup(&session).await?;
            println!(
                "{}: session number {}, {} clients",
                info.name, info.number, info.client_count
            );
            let handle = SessionHandle::join(conn, &session).await?;
            for client in handle.client_names().await? {
                println!("  {}", client);
            }
            handle.leave().await?;
        }

        Command::Grab {
            session,
            token,
            shared,
        } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let proxy = handle.token(&token);
            let status = proxy.grab(!shared).await?;
            println!("{}: {}", token, status);

            // The holding vanishes with this connection, so hold on until
            // interrupted, reporting competing requests as they arrive
            proxy.add_listener_all(Arc::new(PrintTokenEvents));
            println!("holding {} until interrupted...", token);
            tokio::signal::ctrl_c().await?;

            proxy.release().await?;
            handle.leave().await?;
        }

        Command::Release { session, token } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let status = handle.token(&token).release().await?;
            println!("{}: {}", token, status);
        }

        Command::Test { session, token } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let proxy = handle.token(&token);
            let status = proxy.test().await?;
            let holders = proxy.list_holder_names().await?;
            println!("{}: {} (holders: {})", token, status, holders.join(", "));
            handle.leave().await?;
        }

        Command::Request { session, token } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let status = handle.token(&token).request().await?;
            println!("requested {}: currently {}", token, status);
            handle.leave().await?;
        }

        Command::Give {
            session,
            token,
            recipient,
        } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let proxy = handle.token(&token);

            // Watch for the handoff's resolution before letting the
            // connection drop, which would revert it
            let (tx, mut rx) = mpsc::unbounded_channel();
            let watcher: Arc<dyn TokenListener> = Arc::new(ForwardTokenEvents(tx));
            proxy.add_listener_all(Arc::clone(&watcher));

            let status = proxy.give(&recipient).await?;
            println!("{}: {} (waiting for {} to answer)", token, status, recipient);

            loop {
                tokio::select! {
                    Some(event) = rx.recv() => {
                        match event.kind {
                            TokenEventKind::Grabbed => {
                                println!("{} accepted {}", event.actor, token);
                                break;
                            }
                            TokenEventKind::Released => {
                                println!("give of {} failed, token is {}", token, event.status);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!("interrupted; handoff will revert");
                        break;
                    }
                }
            }
            proxy.remove_listener(&watcher);
        }

        Command::Send {
            session,
            channel,
            data,
        } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let delivered = handle.channel(&channel).send(data.into_bytes()).await?;
            println!("delivered to {} consumers", delivered);
            handle.leave().await?;
        }

        Command::Set {
            session,
            array,
            value,
        } => {
            let handle = SessionHandle::join(conn, &session).await?;
            let len = value.len();
            handle.byte_array(&array).set_value(value.into_bytes()).await?;
            println!("{} set ({} bytes)", array, len);
            handle.leave().await?;
        }

        Command::Monitor { session } => {
            let handle = SessionHandle::join(conn, &session).await?;
            handle.add_session_listener(Arc::new(PrintSessionEvents));
            println!("monitoring {} until interrupted...", session);
            tokio::signal::ctrl_c().await?;
            handle.leave().await?;
        }
    }

    Ok(())
}

struct PrintTokenEvents;

impl TokenListener for PrintTokenEvents {
    fn on_token_event(&self, event: &TokenEvent) {
        match event.kind {
            TokenEventKind::Requested => {
                println!("{} asks for {}", event.actor, event.token);
            }
            TokenEventKind::Given => {
                println!(
                    "{} offers {} to {}",
                    event.actor,
                    event.token,
                    event.recipient.as_deref().unwrap_or("?")
                );
            }
            _ => {
                println!("{}: {:?} by {} ({})", event.token, event.kind, event.actor, event.status);
            }
        }
    }
}

struct ForwardTokenEvents(mpsc::UnboundedSender<TokenEvent>);

impl TokenListener for ForwardTokenEvents {
    fn on_token_event(&self, event: &TokenEvent) {
        self.0.send(event.clone()).ok();
    }
}

struct PrintSessionEvents;

impl SessionListener for PrintSessionEvents {
    fn on_session_event(&self, event: &SessionEvent) {
        println!("{}: {:?} {}", event.session, event.kind, event.client);
    }
}
