//! Message correlation engine
//!
//! Turns "send a request, then block until its matching reply or a
//! timeout" into one call. Each logical caller gets a correlation slot
//! keyed by a per-process-unique thread id; the connection's reader loop
//! deposits reply frames into the matching slot through a oneshot channel
//! and is the only writer of the FoundReply state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use tessera_protocol::Frame;
use tessera_utils::{Result, TesseraError};

/// Exchange lifecycle of a correlation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Idle, ready for a new exchange
    GetMessage,
    /// Frame being written
    SendingMessage,
    /// Blocked on the correlation key
    WaitingForReply,
    /// Reader loop has deposited the matching frame
    FoundReply,
    /// Caller owns the frame and is decoding it
    ProcessingReply,
}

struct Slot {
    state: SlotState,
    waker: Option<oneshot::Sender<Frame>>,
}

/// Per-connection correlation engine
///
/// Slots live for the duration of one exchange; thread ids are never
/// reused within a process, so a late reply can only miss, never
/// mis-deliver.
pub struct Correlator {
    slots: Mutex<HashMap<u32, Slot>>,
    next_thread: AtomicU32,
    outgoing: mpsc::Sender<Frame>,
}

impl Correlator {
    pub fn new(outgoing: mpsc::Sender<Frame>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            // Thread id 0 is reserved for event frames
            next_thread: AtomicU32::new(1),
            outgoing,
        }
    }

    /// Allocate a fresh thread id for one exchange
    pub fn allocate_thread(&self) -> u32 {
        self.next_thread.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a frame and block until its reply or the deadline
    ///
    /// The frame's thread id must come from [`Correlator::allocate_thread`].
    /// On deadline expiry the slot is reset and the call fails with
    /// TimedOut; the request is not retried (at-most-once).
    pub async fn send_and_wait(&self, frame: Frame, deadline: Duration) -> Result<Frame> {
        let thread_id = frame.header.thread_id;
        let (tx, rx) = oneshot::channel();

        {
            let mut slots = self.slots.lock().expect("slot table poisoned");
            slots.insert(
                thread_id,
                Slot {
                    state: SlotState::SendingMessage,
                    waker: Some(tx),
                },
            );
        }

        if self.outgoing.send(frame).await.is_err() {
            self.remove_slot(thread_id);
            return Err(TesseraError::ConnectionClosed);
        }

        self.set_state(thread_id, SlotState::WaitingForReply);

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(reply)) => {
                self.set_state(thread_id, SlotState::ProcessingReply);
                Ok(reply)
            }
            Ok(Err(_)) => {
                // Waker dropped: the connection faulted under us
                self.remove_slot(thread_id);
                Err(TesseraError::ConnectionClosed)
            }
            Err(_) => {
                self.remove_slot(thread_id);
                Err(TesseraError::TimedOut {
                    millis: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Send a frame expecting no reply (events, fire-and-forget actions)
    pub async fn send_no_wait(&self, frame: Frame) -> Result<()> {
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| TesseraError::ConnectionClosed)
    }

    /// Return the slot to idle after the caller consumed the reply
    pub fn finish_exchange(&self, thread_id: u32) {
        self.remove_slot(thread_id);
    }

    /// Deposit a reply frame into its slot (reader loop only)
    ///
    /// A reply with no waiting slot is expected under the timeout policy
    /// and is dropped; a second reply before the first is claimed is a
    /// protocol error, also dropped.
    pub fn deposit_reply(&self, frame: Frame) {
        let thread_id = frame.header.thread_id;
        let mut slots = self.slots.lock().expect("slot table poisoned");

        match slots.get_mut(&thread_id) {
            Some(slot) if slot.state == SlotState::WaitingForReply => {
                slot.state = SlotState::FoundReply;
                let waker = slot.waker.take().expect("waiting slot has a waker");
                if waker.send(frame).is_err() {
                    // Caller raced the timeout; slot is already being torn
                    // down by its owner
                    debug!("Reply for thread {} arrived as caller gave up", thread_id);
                    slots.remove(&thread_id);
                }
            }
            Some(slot) => {
                warn!(
                    "Second reply for thread {} in state {:?}, dropping",
                    thread_id, slot.state
                );
            }
            None => {
                debug!("No caller waiting for thread {}, dropping reply", thread_id);
            }
        }
    }

    /// Fail every blocked caller (connection fault)
    ///
    /// Dropping the wakers resolves each pending receive with an error,
    /// which callers surface as ConnectionClosed.
    pub fn fail_all(&self) {
        let mut slots = self.slots.lock().expect("slot table poisoned");
        let count = slots.len();
        slots.clear();
        if count > 0 {
            warn!("Connection fault failed {} in-flight exchanges", count);
        }
    }

    /// Current state of a slot, if it exists
    pub fn slot_state(&self, thread_id: u32) -> Option<SlotState> {
        self.slots
            .lock()
            .expect("slot table poisoned")
            .get(&thread_id)
            .map(|s| s.state)
    }

    /// Number of in-flight exchanges
    pub fn in_flight(&self) -> usize {
        self.slots.lock().expect("slot table poisoned").len()
    }

    fn set_state(&self, thread_id: u32, state: SlotState) {
        if let Some(slot) = self
            .slots
            .lock()
            .expect("slot table poisoned")
            .get_mut(&thread_id)
        {
            slot.state = state;
        }
    }

    fn remove_slot(&self, thread_id: u32) {
        self.slots
            .lock()
            .expect("slot table poisoned")
            .remove(&thread_id);
    }
}
