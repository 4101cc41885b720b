//! Outstanding requests awaiting a response.
//!
//! Every entry is removed exactly once: by its response, by its deadline,
//! or by a bulk rejection when the connection goes away.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use flowlink_protocol::RpcError;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::ClientError;

pub(crate) type Reply = oneshot::Sender<Result<serde_json::Value, ClientError>>;

pub(crate) struct PendingRequest {
    method: String,
    created_at: Instant,
    /// `None` when the timeout is too large to represent.
    deadline: Option<Instant>,
    reply: Reply,
}

impl PendingRequest {
    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    /// Deliver the response outcome to the caller.
    pub(crate) fn settle(self, outcome: Result<serde_json::Value, RpcError>) {
        tracing::trace!(
            method = %self.method,
            elapsed_ms = self.created_at.elapsed().as_millis() as u64,
            "Request settled"
        );
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.reply.send(outcome.map_err(ClientError::from));
    }

    fn reject(self, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

pub(crate) struct PendingRequests {
    next_id: u64,
    entries: HashMap<u64, PendingRequest>,
    deadlines: BTreeSet<(Instant, u64)>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
            deadlines: BTreeSet::new(),
        }
    }

    /// Record a new request and return its id. Ids start at 1 and are
    /// never reused for the lifetime of the client.
    ///
    /// A timeout past the clock's range never expires.
    pub(crate) fn insert(&mut self, method: &str, timeout: Duration, reply: Reply) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let created_at = Instant::now();
        let deadline = created_at.checked_add(timeout);
        match deadline {
            Some(deadline) => {
                self.deadlines.insert((deadline, id));
            }
            None => tracing::debug!(id, method, "Request timeout out of range, no deadline set"),
        }
        self.entries.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                created_at,
                deadline,
                reply,
            },
        );
        id
    }

    /// Remove the entry for `id`, if it is still outstanding.
    pub(crate) fn take(&mut self, id: u64) -> Option<PendingRequest> {
        let entry = self.entries.remove(&id)?;
        if let Some(deadline) = entry.deadline {
            self.deadlines.remove(&(deadline, id));
        }
        Some(entry)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Fail every request whose deadline has passed with `RequestTimeout`.
    /// Returns the expired ids with their methods.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<(u64, String)> {
        let mut expired = Vec::new();
        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            if let Some(entry) = self.entries.remove(&id) {
                let method = entry.method.clone();
                entry.reject(ClientError::RequestTimeout {
                    method: method.clone(),
                });
                expired.push((id, method));
            }
        }
        expired
    }

    /// Fail every outstanding request with `ConnectionClosed`.
    /// Returns how many were rejected.
    pub(crate) fn reject_all(&mut self) -> usize {
        self.deadlines.clear();
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.reject(ClientError::ConnectionClosed);
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }
}
