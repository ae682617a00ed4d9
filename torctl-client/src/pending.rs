//! In-flight request table and per-call deadlines.
//!
//! Every request gets an entry keyed by its id. An entry is removed from the
//! table in the same critical section that decides its outcome, so whichever
//! of response, deadline, or connection loss gets there first wins and the
//! others find nothing to do.

use crate::error::ClientError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use torctl_protocol::Response;

type Outcome = Result<Response, ClientError>;

/// Lifecycle of a control connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

struct PendingEntry {
    method: String,
    tx: oneshot::Sender<Outcome>,
}

struct Inner {
    state: ConnectionState,
    entries: HashMap<u64, PendingEntry>,
}

/// Table of requests awaiting a response.
pub struct PendingTable {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                entries: HashMap::new(),
            }),
            next_id: AtomicU64::new(0),
        }
    }

    /// Moves `Connecting` to `Open`. Has no effect once closed.
    pub fn mark_open(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Open;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Registers a new request and returns the handle its caller awaits.
    ///
    /// Fails with [`ClientError::Closed`] unless the connection is open.
    pub fn register(&self, method: &str) -> Result<PendingCall<'_>, ClientError> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Open {
            return Err(ClientError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let previous = inner.entries.insert(
            id,
            PendingEntry {
                method: method.to_string(),
                tx,
            },
        );
        debug_assert!(previous.is_none(), "request id {id} reused");

        Ok(PendingCall {
            table: self,
            id,
            method: method.to_string(),
            registered_at: Instant::now(),
            rx,
            settled: false,
        })
    }

    /// Delivers a response to the call it answers.
    ///
    /// Returns `false` when no call is waiting for this id: it already
    /// resolved, timed out, was abandoned, or never existed.
    pub fn resolve(&self, response: Response) -> bool {
        let Some(id) = response.id else {
            return false;
        };
        let Some(entry) = self.inner.lock().entries.remove(&id) else {
            return false;
        };

        tracing::debug!("Resolved request id={} method={}", id, entry.method);
        // The receiver may already be gone if the caller is mid-drop.
        let _ = entry.tx.send(Ok(response));
        true
    }

    /// Removes an entry without resolving it. Returns whether it was present.
    pub fn remove(&self, id: u64) -> bool {
        self.inner.lock().entries.remove(&id).is_some()
    }

    /// Closes the table and fails every pending call with `ConnectionLost`.
    ///
    /// Returns the number of calls failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<(u64, PendingEntry)> = {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Closed;
            inner.entries.drain().collect()
        };

        for (id, entry) in &drained {
            tracing::debug!("Failing request id={} method={}", id, entry.method);
        }
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(ClientError::ConnectionLost));
        }
        count
    }

    /// Returns the number of pending calls.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered call awaiting its single resolution.
///
/// Dropping an unsettled call removes its entry, so a caller that gives up
/// early never leaves anything behind in the table.
pub struct PendingCall<'a> {
    table: &'a PendingTable,
    id: u64,
    method: String,
    registered_at: Instant,
    rx: oneshot::Receiver<Outcome>,
    settled: bool,
}

impl PendingCall<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Withdraws the call before it is resolved.
    pub fn cancel(mut self) {
        self.settled = true;
        self.table.remove(self.id);
    }

    /// Returns when `timeout` runs out for this call, counted from registration.
    ///
    /// `None` means the deadline lies beyond what an `Instant` can represent.
    pub fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.registered_at.checked_add(timeout)
    }

    /// Waits for the response, the deadline, or connection loss.
    ///
    /// The deadline counts from registration. When it passes, the entry is
    /// removed and the call fails with `Timeout`; if removal finds the entry
    /// already gone, a resolution raced the deadline and its value is used.
    pub async fn wait(mut self, timeout: Duration) -> Result<Response, ClientError> {
        let Some(deadline) = self.deadline(timeout) else {
            let received = (&mut self.rx).await;
            self.settled = true;
            return received.unwrap_or(Err(ClientError::ConnectionLost));
        };

        let received = match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(received) => received,
            Err(_) => {
                if self.table.remove(self.id) {
                    self.settled = true;
                    let elapsed = self.registered_at.elapsed();
                    tracing::warn!(
                        "Request id={} method={} timed out after {:?}",
                        self.id,
                        self.method,
                        elapsed
                    );
                    return Err(ClientError::Timeout {
                        method: std::mem::take(&mut self.method),
                        elapsed,
                    });
                }
                (&mut self.rx).await
            }
        };

        self.settled = true;
        // A dropped sender without a value only happens when the table itself
        // is torn down, which is connection loss from the caller's view.
        received.unwrap_or(Err(ClientError::ConnectionLost))
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled && self.table.remove(self.id) {
            tracing::debug!(
                "Request id={} method={} abandoned by caller",
                self.id,
                self.method
            );
        }
    }
}
