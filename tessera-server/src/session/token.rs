//! Token ownership state machine
//!
//! Authoritative only on the server side. All mutations run under the
//! owning session's lock, so concurrent grab/give/release calls for one
//! token are linearized.

use std::collections::BTreeMap;
use std::time::Instant;

use tessera_protocol::{HoldMode, TokenStatus};

/// A handoff in flight: the giver has let go, the recipient has not yet
/// answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGive {
    pub giver: String,
    pub recipient: String,
    pub deadline: Instant,
}

/// Why a token mutation was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("client is not holding the token: {0}")]
    ClientNotGrabbing(String),

    #[error("client could not be released: {0}")]
    ClientNotReleased(String),
}

/// How a pending give resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiveOutcome {
    /// Recipient accepted and is now the exclusive holder
    Accepted { giver: String },
    /// Recipient declined; the token reverted to not-in-use
    Declined { giver: String },
}

/// A distributed ownership marker
///
/// Invariants: at most one Exclusive holder; Exclusive never coexists with
/// Shared; a pending give implies an empty holder set.
#[derive(Debug)]
pub struct Token {
    name: String,
    holders: BTreeMap<String, HoldMode>,
    pending_give: Option<PendingGive>,
}

impl Token {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holders: BTreeMap::new(),
            pending_give: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derived status; never stored
    pub fn status(&self) -> TokenStatus {
        if self.pending_give.is_some() {
            TokenStatus::Giving
        } else if self.holders.is_empty() {
            TokenStatus::NotInUse
        } else if self.holders.values().any(|m| *m == HoldMode::Exclusive) {
            TokenStatus::Grabbed
        } else {
            TokenStatus::Inhibited
        }
    }

    /// Whether the client currently holds the token in any mode
    pub fn is_holder(&self, client: &str) -> bool {
        self.holders.contains_key(client)
    }

    /// Snapshot of holder names, sorted
    pub fn holder_names(&self) -> Vec<String> {
        // BTreeMap keys iterate in sorted order
        self.holders.keys().cloned().collect()
    }

    /// The pending handoff, if one is in flight
    pub fn pending_give(&self) -> Option<&PendingGive> {
        self.pending_give.as_ref()
    }

    /// Take or share ownership
    ///
    /// Succeeds if the holder set is empty, or (for a shared grab) if every
    /// existing holder is shared. Every grab fails while a give is in
    /// flight, including grabs by the two parties to the handoff.
    pub fn grab(&mut self, client: &str, exclusive: bool) -> Result<TokenStatus, TokenError> {
        if self.pending_give.is_some() {
            return Err(TokenError::PermissionDenied(format!(
                "{} is being given away",
                self.name
            )));
        }

        if exclusive {
            if !self.holders.is_empty() {
                return Err(TokenError::PermissionDenied(format!(
                    "{} already has holders",
                    self.name
                )));
            }
            self.holders.insert(client.to_string(), HoldMode::Exclusive);
        } else {
            if self.holders.values().any(|m| *m == HoldMode::Exclusive) {
                return Err(TokenError::PermissionDenied(format!(
                    "{} is exclusively held",
                    self.name
                )));
            }
            self.holders.insert(client.to_string(), HoldMode::Shared);
        }

        Ok(self.status())
    }

    /// Drop ownership
    ///
    /// Fails with ClientNotGrabbing when the client is not a holder. A
    /// giver cannot release its way out of an in-flight handoff: that
    /// resolves only through the recipient's answer or the timeout sweep.
    pub fn release(&mut self, client: &str) -> Result<TokenStatus, TokenError> {
        if let Some(pending) = &self.pending_give {
            if pending.giver == client {
                return Err(TokenError::ClientNotReleased(format!(
                    "{}: give to {} still pending",
                    self.name, pending.recipient
                )));
            }
        }

        if self.holders.remove(client).is_none() {
            return Err(TokenError::ClientNotGrabbing(format!(
                "{} does not hold {}",
                client, self.name
            )));
        }

        Ok(self.status())
    }

    /// Start a handoff to a named recipient
    ///
    /// Requires the client to be the sole current holder. The client stops
    /// holding immediately; possession stays indeterminate until the
    /// recipient answers or the deadline passes.
    pub fn give(
        &mut self,
        client: &str,
        recipient: &str,
        deadline: Instant,
    ) -> Result<TokenStatus, TokenError> {
        if self.pending_give.is_some() {
            return Err(TokenError::PermissionDenied(format!(
                "{} is already being given away",
                self.name
            )));
        }
        if client == recipient {
            return Err(TokenError::PermissionDenied(format!(
                "{} cannot be given to its holder",
                self.name
            )));
        }
        if !self.is_holder(client) {
            return Err(TokenError::ClientNotGrabbing(format!(
                "{} does not hold {}",
                client, self.name
            )));
        }
        if self.holders.len() != 1 {
            return Err(TokenError::PermissionDenied(format!(
                "{} has other holders",
                self.name
            )));
        }

        self.holders.clear();
        self.pending_give = Some(PendingGive {
            giver: client.to_string(),
            recipient: recipient.to_string(),
            deadline,
        });

        Ok(TokenStatus::Giving)
    }

    /// Resolve the pending handoff with the recipient's answer
    ///
    /// Returns None for a stale or misdirected answer, which the caller
    /// logs and drops.
    pub fn resolve_give(&mut self, recipient: &str, accept: bool) -> Option<GiveOutcome> {
        match &self.pending_give {
            Some(pending) if pending.recipient == recipient => {
                let pending = self.pending_give.take().expect("checked above");
                if accept {
                    self.holders
                        .insert(pending.recipient.clone(), HoldMode::Exclusive);
                    Some(GiveOutcome::Accepted {
                        giver: pending.giver,
                    })
                } else {
                    Some(GiveOutcome::Declined {
                        giver: pending.giver,
                    })
                }
            }
            _ => None,
        }
    }

    /// Expire the pending handoff if its deadline has passed
    ///
    /// The token reverts to not-in-use; the returned record lets the
    /// caller notify the original holder that the give failed.
    pub fn expire_give(&mut self, now: Instant) -> Option<PendingGive> {
        match &self.pending_give {
            Some(pending) if pending.deadline <= now => self.pending_give.take(),
            _ => None,
        }
    }

    /// Force-remove a holder without precondition checks (disconnect and
    /// destroy cleanup). Returns true if the client was holding.
    pub fn force_remove(&mut self, client: &str) -> bool {
        self.holders.remove(client).is_some()
    }

    /// Clear a pending give where the client is either party (disconnect
    /// cleanup). Returns the cleared record.
    pub fn clear_give_involving(&mut self, client: &str) -> Option<PendingGive> {
        match &self.pending_give {
            Some(p) if p.giver == client || p.recipient == client => self.pending_give.take(),
            _ => None,
        }
    }
}
