//! A server-hosted session: membership plus the authoritative object tables

use std::collections::{BTreeSet, HashMap};

use tessera_protocol::{
    Event, SessionInfo, TokenEvent, TokenEventKind, TokenStatus,
};
use tessera_utils::{Result, TesseraError};

use super::{ByteArray, Channel, Token};

/// A give that hit its deadline, recorded for notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredGive {
    pub token: String,
    pub giver: String,
    pub recipient: String,
}

/// A named scope containing clients and their shared objects
#[derive(Debug)]
pub struct Session {
    name: String,
    number: u16,
    clients: BTreeSet<String>,
    tokens: HashMap<String, Token>,
    channels: HashMap<String, Channel>,
    byte_arrays: HashMap<String, ByteArray>,
}

impl Session {
    pub fn new(name: impl Into<String>, number: u16) -> Self {
        Self {
            name: name.into(),
            number,
            clients: BTreeSet::new(),
            tokens: HashMap::new(),
            channels: HashMap::new(),
            byte_arrays: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn to_info(&self) -> SessionInfo {
        SessionInfo {
            name: self.name.clone(),
            number: self.number,
            client_count: self.clients.len(),
        }
    }

    // ==================== Membership ====================

    pub fn join(&mut self, client: &str) -> Result<()> {
        if !self.clients.insert(client.to_string()) {
            return Err(TesseraError::NameInUse(format!(
                "{} already joined {}",
                client, self.name
            )));
        }
        Ok(())
    }

    pub fn leave(&mut self, client: &str) -> Result<()> {
        if !self.clients.remove(client) {
            return Err(TesseraError::ClientNotFound(format!(
                "{} is not in {}",
                client, self.name
            )));
        }
        Ok(())
    }

    pub fn has_client(&self, client: &str) -> bool {
        self.clients.contains(client)
    }

    /// Joined client names, sorted
    pub fn client_names(&self) -> Vec<String> {
        self.clients.iter().cloned().collect()
    }

    // ==================== Object tables ====================

    pub fn create_token(&mut self, name: &str) -> Result<()> {
        if self.tokens.contains_key(name) {
            return Err(TesseraError::NameInUse(name.to_string()));
        }
        self.tokens.insert(name.to_string(), Token::new(name));
        Ok(())
    }

    pub fn create_channel(&mut self, name: &str) -> Result<()> {
        if self.channels.contains_key(name) {
            return Err(TesseraError::NameInUse(name.to_string()));
        }
        self.channels.insert(name.to_string(), Channel::new(name));
        Ok(())
    }

    pub fn create_byte_array(&mut self, name: &str) -> Result<()> {
        if self.byte_arrays.contains_key(name) {
            return Err(TesseraError::NameInUse(name.to_string()));
        }
        self.byte_arrays
            .insert(name.to_string(), ByteArray::new(name));
        Ok(())
    }

    /// Get a token, creating it on first reference
    ///
    /// Mutating token operations bring the token into being implicitly;
    /// read-only operations go through [`Session::token`] and fail on a
    /// name that was never referenced.
    pub fn ensure_token(&mut self, name: &str) -> &mut Token {
        self.tokens
            .entry(name.to_string())
            .or_insert_with(|| Token::new(name))
    }

    pub fn token(&self, name: &str) -> Result<&Token> {
        self.tokens
            .get(name)
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    pub fn token_mut(&mut self, name: &str) -> Result<&mut Token> {
        self.tokens
            .get_mut(name)
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    pub fn channel_mut(&mut self, name: &str) -> Result<&mut Channel> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    pub fn channel(&self, name: &str) -> Result<&Channel> {
        self.channels
            .get(name)
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    pub fn byte_array_mut(&mut self, name: &str) -> Result<&mut ByteArray> {
        self.byte_arrays
            .get_mut(name)
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    pub fn has_token(&self, name: &str) -> bool {
        self.tokens.contains_key(name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn has_byte_array(&self, name: &str) -> bool {
        self.byte_arrays.contains_key(name)
    }

    /// Destroy a token, force-removing every holder
    ///
    /// Returns the expulsion events for the removed holders.
    pub fn destroy_token(&mut self, name: &str) -> Result<Vec<Event>> {
        let token = self
            .tokens
            .remove(name)
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))?;

        let events = token
            .holder_names()
            .into_iter()
            .map(|holder| {
                Event::Token(TokenEvent {
                    token: name.to_string(),
                    kind: TokenEventKind::Expelled,
                    actor: holder,
                    recipient: None,
                    status: TokenStatus::NotInUse,
                })
            })
            .collect();
        Ok(events)
    }

    pub fn destroy_channel(&mut self, name: &str) -> Result<()> {
        self.channels
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    pub fn destroy_byte_array(&mut self, name: &str) -> Result<()> {
        self.byte_arrays
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| TesseraError::ObjectNotFound(name.to_string()))
    }

    // ==================== Cleanup ====================

    /// Expire every pending give whose deadline has passed
    ///
    /// Affected tokens revert to not-in-use.
    pub fn expire_gives(&mut self, now: std::time::Instant) -> Vec<ExpiredGive> {
        let mut expired = Vec::new();
        for token in self.tokens.values_mut() {
            if let Some(pending) = token.expire_give(now) {
                expired.push(ExpiredGive {
                    token: token.name().to_string(),
                    giver: pending.giver,
                    recipient: pending.recipient,
                });
            }
        }
        expired
    }

    /// Remove every trace of a client from the session's objects: token
    /// holdings are released, handoffs it was party to revert, and its
    /// consumer registrations disappear.
    ///
    /// Membership itself is untouched; callers remove it and emit the Left
    /// event. Returns the token events produced by the removals, keeping
    /// holder sets consistent under mid-operation connection faults.
    pub fn scrub_client(&mut self, client: &str) -> Vec<Event> {
        let mut events = Vec::new();

        for token in self.tokens.values_mut() {
            if token.clear_give_involving(client).is_some() {
                events.push(Event::Token(TokenEvent {
                    token: token.name().to_string(),
                    kind: TokenEventKind::Released,
                    actor: client.to_string(),
                    recipient: None,
                    status: token.status(),
                }));
            }
            if token.force_remove(client) {
                events.push(Event::Token(TokenEvent {
                    token: token.name().to_string(),
                    kind: TokenEventKind::Released,
                    actor: client.to_string(),
                    recipient: None,
                    status: token.status(),
                }));
            }
        }

        for channel in self.channels.values_mut() {
            channel.remove_consumer(client);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut session = Session::new("whiteboard", 2);

        session.join("alice").unwrap();
        assert!(matches!(
            session.join("alice"),
            Err(TesseraError::NameInUse(_))
        ));
        session.join("bob").unwrap();

        assert_eq!(session.client_names(), vec!["alice", "bob"]);
        assert_eq!(session.to_info().client_count, 2);

        session.leave("alice").unwrap();
        assert!(matches!(
            session.leave("alice"),
            Err(TesseraError::ClientNotFound(_))
        ));
    }

    #[test]
    fn test_object_lifecycle() {
        let mut session = Session::new("whiteboard", 2);

        session.create_token("baton").unwrap();
        assert!(matches!(
            session.create_token("baton"),
            Err(TesseraError::NameInUse(_))
        ));
        assert!(session.has_token("baton"));

        session.create_channel("ticker").unwrap();
        session.create_byte_array("shared").unwrap();
        assert!(session.has_channel("ticker"));
        assert!(session.has_byte_array("shared"));

        assert!(matches!(
            session.token("missing"),
            Err(TesseraError::ObjectNotFound(_))
        ));

        session.destroy_channel("ticker").unwrap();
        assert!(!session.has_channel("ticker"));
    }

    #[test]
    fn test_destroy_token_expels_holders() {
        let mut session = Session::new("whiteboard", 2);
        session.create_token("baton").unwrap();
        session.token_mut("baton").unwrap().grab("alice", false).unwrap();
        session.token_mut("baton").unwrap().grab("bob", false).unwrap();

        let events = session.destroy_token("baton").unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(
            e,
            Event::Token(TokenEvent {
                kind: TokenEventKind::Expelled,
                ..
            })
        )));
        assert!(!session.has_token("baton"));
    }

    #[test]
    fn test_scrub_client_releases_holdings() {
        let mut session = Session::new("whiteboard", 2);
        session.join("alice").unwrap();
        session.create_token("baton").unwrap();
        session.create_channel("ticker").unwrap();

        session.token_mut("baton").unwrap().grab("alice", true).unwrap();
        session.channel_mut("ticker").unwrap().add_consumer("alice");

        let events = session.scrub_client("alice");
        assert_eq!(events.len(), 1);
        assert_eq!(
            session.token("baton").unwrap().status(),
            TokenStatus::NotInUse
        );
        assert!(!session.channel("ticker").unwrap().has_consumer("alice"));
    }

    #[test]
    fn test_scrub_client_reverts_pending_give() {
        use std::time::{Duration, Instant};

        let mut session = Session::new("whiteboard", 2);
        session.create_token("baton").unwrap();

        let token = session.token_mut("baton").unwrap();
        token.grab("alice", true).unwrap();
        token
            .give("alice", "bob", Instant::now() + Duration::from_secs(60))
            .unwrap();

        // Recipient vanishes: the handoff reverts
        let events = session.scrub_client("bob");
        assert_eq!(events.len(), 1);
        assert_eq!(
            session.token("baton").unwrap().status(),
            TokenStatus::NotInUse
        );
    }
}
