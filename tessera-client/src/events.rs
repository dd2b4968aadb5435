//! Typed listeners and event dispatch
//!
//! Listeners subscribe to an explicit set of event kinds per object; the
//! dispatch task invokes them off a bounded queue so the connection's
//! reader loop never runs application code inline.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use tessera_protocol::{
    ByteArrayEvent, ChannelEvent, Event, SessionEvent, TokenEvent, TokenEventKind,
};

/// Listener for token events
pub trait TokenListener: Send + Sync {
    fn on_token_event(&self, event: &TokenEvent);
}

/// Listener for session membership events
pub trait SessionListener: Send + Sync {
    fn on_session_event(&self, event: &SessionEvent);
}

/// Consumer of channel data
pub trait ChannelConsumer: Send + Sync {
    fn on_data(&self, event: &ChannelEvent);
}

/// Listener for byte array value changes
pub trait ByteArrayListener: Send + Sync {
    fn on_value_changed(&self, event: &ByteArrayEvent);
}

struct TokenEntry {
    kinds: HashSet<TokenEventKind>,
    listener: Arc<dyn TokenListener>,
}

/// Per-connection listener registry
///
/// Keys are object names; sessions on a connection have disjoint object
/// name spaces per kind, so session scoping happens at subscription time.
#[derive(Default)]
pub struct ListenerRegistry {
    tokens: Mutex<HashMap<String, Vec<TokenEntry>>>,
    sessions: Mutex<Vec<Arc<dyn SessionListener>>>,
    channels: Mutex<HashMap<String, Vec<Arc<dyn ChannelConsumer>>>>,
    byte_arrays: Mutex<HashMap<String, Vec<Arc<dyn ByteArrayListener>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a token listener to a set of event kinds
    pub fn add_token_listener(
        &self,
        token: &str,
        kinds: HashSet<TokenEventKind>,
        listener: Arc<dyn TokenListener>,
    ) {
        self.tokens
            .lock()
            .expect("listener table poisoned")
            .entry(token.to_string())
            .or_default()
            .push(TokenEntry { kinds, listener });
    }

    /// Remove a previously added token listener
    pub fn remove_token_listener(&self, token: &str, listener: &Arc<dyn TokenListener>) -> bool {
        let mut tokens = self.tokens.lock().expect("listener table poisoned");
        let Some(entries) = tokens.get_mut(token) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| !Arc::ptr_eq(&entry.listener, listener));
        let removed = entries.len() < before;
        if entries.is_empty() {
            tokens.remove(token);
        }
        removed
    }

    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.sessions
            .lock()
            .expect("listener table poisoned")
            .push(listener);
    }

    pub fn remove_session_listener(&self, listener: &Arc<dyn SessionListener>) -> bool {
        let mut sessions = self.sessions.lock().expect("listener table poisoned");
        let before = sessions.len();
        sessions.retain(|entry| !Arc::ptr_eq(entry, listener));
        sessions.len() < before
    }

    pub fn add_channel_consumer(&self, channel: &str, consumer: Arc<dyn ChannelConsumer>) {
        self.channels
            .lock()
            .expect("listener table poisoned")
            .entry(channel.to_string())
            .or_default()
            .push(consumer);
    }

    pub fn remove_channel_consumer(
        &self,
        channel: &str,
        consumer: &Arc<dyn ChannelConsumer>,
    ) -> bool {
        let mut channels = self.channels.lock().expect("listener table poisoned");
        let Some(entries) = channels.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| !Arc::ptr_eq(entry, consumer));
        let removed = entries.len() < before;
        if entries.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    pub fn add_byte_array_listener(&self, array: &str, listener: Arc<dyn ByteArrayListener>) {
        self.byte_arrays
            .lock()
            .expect("listener table poisoned")
            .entry(array.to_string())
            .or_default()
            .push(listener);
    }

    pub fn remove_byte_array_listener(
        &self,
        array: &str,
        listener: &Arc<dyn ByteArrayListener>,
    ) -> bool {
        let mut arrays = self.byte_arrays.lock().expect("listener table poisoned");
        let Some(entries) = arrays.get_mut(array) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| !Arc::ptr_eq(entry, listener));
        let removed = entries.len() < before;
        if entries.is_empty() {
            arrays.remove(array);
        }
        removed
    }

    /// Invoke every matching listener for one event
    ///
    /// Runs on the dispatch task. Listener snapshots are taken under the
    /// lock and invoked outside it, so a listener may re-register without
    /// deadlocking.
    pub fn dispatch(&self, event: &Event) {
        match event {
            Event::Token(ev) => {
                let matching: Vec<Arc<dyn TokenListener>> = {
                    let tokens = self.tokens.lock().expect("listener table poisoned");
                    tokens
                        .get(&ev.token)
                        .map(|entries| {
                            entries
                                .iter()
                                .filter(|entry| entry.kinds.contains(&ev.kind))
                                .map(|entry| Arc::clone(&entry.listener))
                                .collect()
                        })
                        .unwrap_or_default()
                };
                if matching.is_empty() {
                    debug!("No listener for token event on {}", ev.token);
                }
                for listener in matching {
                    listener.on_token_event(ev);
                }
            }
            Event::Session(ev) => {
                let matching: Vec<Arc<dyn SessionListener>> = self
                    .sessions
                    .lock()
                    .expect("listener table poisoned")
                    .clone();
                for listener in matching {
                    listener.on_session_event(ev);
                }
            }
            Event::Channel(ev) => {
                let matching: Vec<Arc<dyn ChannelConsumer>> = {
                    let channels = self.channels.lock().expect("listener table poisoned");
                    channels.get(&ev.channel).cloned().unwrap_or_default()
                };
                for consumer in matching {
                    consumer.on_data(ev);
                }
            }
            Event::ByteArray(ev) => {
                let matching: Vec<Arc<dyn ByteArrayListener>> = {
                    let arrays = self.byte_arrays.lock().expect("listener table poisoned");
                    arrays.get(&ev.array).cloned().unwrap_or_default()
                };
                for listener in matching {
                    listener.on_value_changed(ev);
                }
            }
        }
    }
}
