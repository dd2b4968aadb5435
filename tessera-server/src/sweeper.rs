//! Give-timeout sweep
//!
//! A pending give is a window of indeterminate possession. If the recipient
//! never answers, the token must not stay in Giving forever: the sweep
//! reverts it to not-in-use and the session observes a Released event for
//! the failed handoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tessera_protocol::{Event, TokenEvent, TokenEventKind, TokenStatus};

use crate::handlers::{deliver_events, EventOut, EventTarget};
use crate::registry::ClientRegistry;
use crate::session::SessionManager;

/// Sweep cadence
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the background sweep task
pub fn spawn(
    session_manager: Arc<RwLock<SessionManager>>,
    registry: Arc<ClientRegistry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep_once(&session_manager, &registry).await;
        }
    })
}

/// Expire every pending give past its deadline and fan out the reversions
pub async fn sweep_once(
    session_manager: &RwLock<SessionManager>,
    registry: &ClientRegistry,
) {
    let now = Instant::now();
    let mut events = Vec::new();

    {
        let mut manager = session_manager.write().await;
        for session in manager.sessions_mut() {
            let number = session.number();
            for expired in session.expire_gives(now) {
                info!(
                    "Give of {} from {} to {} timed out, reverting",
                    expired.token, expired.giver, expired.recipient
                );
                events.push(EventOut {
                    session: number,
                    target: EventTarget::Session,
                    event: Event::Token(TokenEvent {
                        token: expired.token,
                        kind: TokenEventKind::Released,
                        actor: expired.giver,
                        recipient: None,
                        status: TokenStatus::NotInUse,
                    }),
                });
            }
        }
    }

    if !events.is_empty() {
        debug!("Sweep reverted {} timed out gives", events.len());
        deliver_events(registry, None, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::TokenStatus;

    #[tokio::test]
    async fn test_sweep_reverts_expired_give() {
        let manager = RwLock::new(SessionManager::new());
        let registry = ClientRegistry::new();

        {
            let mut guard = manager.write().await;
            let session = guard.bind("whiteboard").unwrap().number();
            let session = guard.get_mut(session).unwrap();
            session.create_token("baton").unwrap();
            let token = session.token_mut("baton").unwrap();
            token.grab("alice", true).unwrap();
            token.give("alice", "bob", Instant::now()).unwrap();
        }

        sweep_once(&manager, &registry).await;

        let guard = manager.read().await;
        let session = guard.get_by_name("whiteboard").unwrap();
        assert_eq!(
            session.token("baton").unwrap().status(),
            TokenStatus::NotInUse
        );
    }

    #[tokio::test]
    async fn test_sweep_leaves_live_gives_alone() {
        let manager = RwLock::new(SessionManager::new());
        let registry = ClientRegistry::new();

        {
            let mut guard = manager.write().await;
            let session = guard.bind("whiteboard").unwrap().number();
            let session = guard.get_mut(session).unwrap();
            session.create_token("baton").unwrap();
            let token = session.token_mut("baton").unwrap();
            token.grab("alice", true).unwrap();
            token
                .give("alice", "bob", Instant::now() + Duration::from_secs(60))
                .unwrap();
        }

        sweep_once(&manager, &registry).await;

        let guard = manager.read().await;
        let session = guard.get_by_name("whiteboard").unwrap();
        assert_eq!(
            session.token("baton").unwrap().status(),
            TokenStatus::Giving
        );
    }
}
