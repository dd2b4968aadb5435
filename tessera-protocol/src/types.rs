//! Shared object state and event types

use serde::{Deserialize, Serialize};

/// How a client holds a token
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HoldMode {
    Exclusive,
    Shared,
}

/// Derived token status
///
/// Never stored directly: computed from the holder set and any pending
/// handoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenStatus {
    /// No holders
    NotInUse,
    /// Exactly one exclusive holder
    Grabbed,
    /// One or more shared holders
    Inhibited,
    /// A handoff to a named recipient is in flight and not yet resolved
    Giving,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenStatus::NotInUse => "not-in-use",
            TokenStatus::Grabbed => "grabbed",
            TokenStatus::Inhibited => "inhibited",
            TokenStatus::Giving => "giving",
        };
        write!(f, "{}", s)
    }
}

/// Kinds of token events a listener may subscribe to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TokenEventKind {
    Joined,
    Left,
    Given,
    Requested,
    Grabbed,
    Released,
    Invited,
    Expelled,
}

impl TokenEventKind {
    /// All kinds, for listeners that subscribe to everything
    pub const ALL: [TokenEventKind; 8] = [
        TokenEventKind::Joined,
        TokenEventKind::Left,
        TokenEventKind::Given,
        TokenEventKind::Requested,
        TokenEventKind::Grabbed,
        TokenEventKind::Released,
        TokenEventKind::Invited,
        TokenEventKind::Expelled,
    ];
}

/// A token event as delivered to listeners
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenEvent {
    /// Token name
    pub token: String,
    pub kind: TokenEventKind,
    /// Client whose action produced the event
    pub actor: String,
    /// Designated recipient, for Given events
    pub recipient: Option<String>,
    /// Token status after the action
    pub status: TokenStatus,
}

/// Kinds of session membership events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Joined,
    Left,
    Invited,
    Expelled,
    Destroyed,
}

/// A session membership event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: String,
    pub kind: SessionEventKind,
    /// Client the event concerns
    pub client: String,
}

/// Data delivered to a channel consumer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: String,
    pub sender: String,
    pub data: Vec<u8>,
}

/// A byte array value change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ByteArrayEvent {
    pub array: String,
    /// Client that set the value
    pub client: String,
    pub value: Vec<u8>,
}

/// Session summary as reported by the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    /// Wire-level session number scoping frames on a shared connection
    pub number: u16,
    pub client_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(TokenStatus::NotInUse.to_string(), "not-in-use");
        assert_eq!(TokenStatus::Giving.to_string(), "giving");
    }

    #[test]
    fn test_event_kind_all_is_complete() {
        use std::collections::HashSet;
        let kinds: HashSet<_> = TokenEventKind::ALL.iter().collect();
        assert_eq!(kinds.len(), 8);
    }

    #[test]
    fn test_token_event_equality() {
        let ev = TokenEvent {
            token: "t".into(),
            kind: TokenEventKind::Grabbed,
            actor: "alice".into(),
            recipient: None,
            status: TokenStatus::Grabbed,
        };
        assert_eq!(ev.clone(), ev);
    }
}
