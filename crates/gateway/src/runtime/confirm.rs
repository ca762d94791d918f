//! Tool confirmation broker — gates tool executions behind an
//! out-of-band human approval.
//!
//! A pending confirmation pairs an opaque 10-hex ID with a one-shot
//! completion signal. The orchestrator registers and awaits; the REST API
//! resolves. A timer auto-denies on deadline so a turn never blocks
//! forever. Resolution is idempotent at the edge: a second resolve is a
//! no-op that reports `AlreadyResolved`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use mochi_sessions::generate_id;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The decision delivered to the waiting orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approved,
    Denied { reason: DenyReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    User,
    Timeout,
}

/// Outcome of a resolve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    NotFound,
    AlreadyResolved,
}

struct PendingConfirmation {
    session_id: String,
    tool_name: String,
    arguments: Map<String, Value>,
    respond: oneshot::Sender<ConfirmationDecision>,
    deadline: DateTime<Utc>,
}

/// Serializable snapshot of a pending confirmation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfirmationInfo {
    pub confirmation_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub deadline: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Broker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide registry of pending tool confirmations.
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    /// IDs that have been resolved (or timed out), so a late second
    /// resolve can be distinguished from an unknown ID.
    resolved: Mutex<HashSet<String>>,
}

impl Default for ConfirmationBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashSet::new()),
        }
    }

    /// Register a pending confirmation and arm its deadline timer.
    ///
    /// Returns the confirmation ID plus the receiver the orchestrator
    /// awaits. A zero timeout denies immediately.
    pub fn register(
        self: &Arc<Self>,
        session_id: &str,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> (String, oneshot::Receiver<ConfirmationDecision>) {
        let id = generate_id();
        let (tx, rx) = oneshot::channel();

        self.pending.lock().insert(
            id.clone(),
            PendingConfirmation {
                session_id: session_id.to_string(),
                tool_name: tool_name.to_string(),
                arguments,
                respond: tx,
                deadline: Utc::now()
                    + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero()),
            },
        );

        let broker = Arc::clone(self);
        let timer_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if broker.finish(&timer_id, ConfirmationDecision::Denied { reason: DenyReason::Timeout })
                == ResolveOutcome::Resolved
            {
                tracing::info!(confirmation_id = %timer_id, "confirmation timed out, auto-denied");
            }
        });

        (id, rx)
    }

    /// Resolve a pending confirmation from the REST API.
    pub fn resolve(&self, id: &str, approved: bool) -> ResolveOutcome {
        let decision = if approved {
            ConfirmationDecision::Approved
        } else {
            ConfirmationDecision::Denied { reason: DenyReason::User }
        };
        self.finish(id, decision)
    }

    fn finish(&self, id: &str, decision: ConfirmationDecision) -> ResolveOutcome {
        let pending = self.pending.lock().remove(id);
        match pending {
            Some(waiter) => {
                self.resolved.lock().insert(id.to_string());
                // The orchestrator may have gone away on disconnect.
                let _ = waiter.respond.send(decision);
                ResolveOutcome::Resolved
            }
            None if self.resolved.lock().contains(id) => ResolveOutcome::AlreadyResolved,
            None => ResolveOutcome::NotFound,
        }
    }

    /// All currently pending confirmations.
    pub fn list_pending(&self) -> Vec<ConfirmationInfo> {
        self.pending
            .lock()
            .iter()
            .map(|(id, p)| ConfirmationInfo {
                confirmation_id: id.clone(),
                session_id: p.session_id.clone(),
                tool_name: p.tool_name.clone(),
                arguments: p.arguments.clone(),
                deadline: p.deadline,
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> Arc<ConfirmationBroker> {
        Arc::new(ConfirmationBroker::new())
    }

    #[tokio::test]
    async fn approve_resolves_waiter() {
        let broker = broker();
        let (id, rx) =
            broker.register("s1", "now", Map::new(), Duration::from_secs(300));
        assert_eq!(broker.list_pending().len(), 1);

        assert_eq!(broker.resolve(&id, true), ResolveOutcome::Resolved);
        assert_eq!(rx.await.unwrap(), ConfirmationDecision::Approved);
        assert!(broker.list_pending().is_empty());
    }

    #[tokio::test]
    async fn deny_resolves_waiter() {
        let broker = broker();
        let (id, rx) =
            broker.register("s1", "now", Map::new(), Duration::from_secs(300));

        assert_eq!(broker.resolve(&id, false), ResolveOutcome::Resolved);
        assert_eq!(
            rx.await.unwrap(),
            ConfirmationDecision::Denied { reason: DenyReason::User }
        );
    }

    #[tokio::test]
    async fn second_resolve_reports_already_resolved() {
        let broker = broker();
        let (id, rx) =
            broker.register("s1", "now", Map::new(), Duration::from_secs(300));

        assert_eq!(broker.resolve(&id, true), ResolveOutcome::Resolved);
        // The second decision does not overwrite the first.
        assert_eq!(broker.resolve(&id, false), ResolveOutcome::AlreadyResolved);
        assert_eq!(rx.await.unwrap(), ConfirmationDecision::Approved);
    }

    #[tokio::test]
    async fn unknown_id_reports_not_found() {
        let broker = broker();
        assert_eq!(broker.resolve("ffffffffff", true), ResolveOutcome::NotFound);
    }

    #[tokio::test]
    async fn zero_timeout_denies_immediately() {
        let broker = broker();
        let (_id, rx) = broker.register("s1", "now", Map::new(), Duration::ZERO);
        assert_eq!(
            rx.await.unwrap(),
            ConfirmationDecision::Denied { reason: DenyReason::Timeout }
        );
    }

    #[tokio::test]
    async fn timeout_then_resolve_reports_already_resolved() {
        let broker = broker();
        let (id, rx) = broker.register("s1", "now", Map::new(), Duration::ZERO);
        // Wait for the timer to fire.
        assert_eq!(
            rx.await.unwrap(),
            ConfirmationDecision::Denied { reason: DenyReason::Timeout }
        );
        assert_eq!(broker.resolve(&id, true), ResolveOutcome::AlreadyResolved);
    }

    #[tokio::test]
    async fn ids_are_ten_hex() {
        let broker = broker();
        let (id, _rx) =
            broker.register("s1", "now", Map::new(), Duration::from_secs(300));
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
