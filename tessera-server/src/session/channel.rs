//! Server-side channel state
//!
//! A channel is an ordered, reliable multicast pipe: data sent to it is
//! delivered to every registered consumer in send order. Ordering falls out
//! of the per-session serialization of sends plus per-connection stream
//! semantics; the channel itself only tracks the consumer set.

use std::collections::BTreeSet;

/// An ordered multicast data pipe
#[derive(Debug)]
pub struct Channel {
    name: String,
    consumers: BTreeSet<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consumers: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a consumer; returns false if already registered
    pub fn add_consumer(&mut self, client: &str) -> bool {
        self.consumers.insert(client.to_string())
    }

    /// Unregister a consumer; returns false if it was not registered
    pub fn remove_consumer(&mut self, client: &str) -> bool {
        self.consumers.remove(client)
    }

    pub fn has_consumer(&self, client: &str) -> bool {
        self.consumers.contains(client)
    }

    /// Snapshot of consumer names, sorted
    pub fn consumer_names(&self) -> Vec<String> {
        self.consumers.iter().cloned().collect()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_registration() {
        let mut channel = Channel::new("ticker");

        assert!(channel.add_consumer("alice"));
        assert!(!channel.add_consumer("alice"));
        assert!(channel.add_consumer("bob"));

        assert_eq!(channel.consumer_names(), vec!["alice", "bob"]);
        assert!(channel.has_consumer("alice"));

        assert!(channel.remove_consumer("alice"));
        assert!(!channel.remove_consumer("alice"));
        assert_eq!(channel.consumer_count(), 1);
    }
}
