//! Output routing to realtime subscribers
//!
//! Each session has at most one subscriber, stored in a keyed registry and
//! resolved at dispatch time rather than captured when the reader task is
//! created. A WebSocket that connects after the agent is already running
//! replaces whatever subscriber came before it and receives every event
//! from that point on; earlier events are not replayed (the session buffer
//! retains the full output regardless).

use crate::analysis::types::OutputEvent;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Sending half of a subscriber's event channel
pub type OutputSender = mpsc::UnboundedSender<OutputEvent>;

/// Per-session subscriber registry
#[derive(Default)]
pub struct OutputRouter {
    subscribers: RwLock<HashMap<String, OutputSender>>,
}

impl OutputRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the subscriber for a session
    pub async fn set_subscriber(&self, session_id: &str, tx: OutputSender) {
        self.subscribers
            .write()
            .await
            .insert(session_id.to_string(), tx);
    }

    /// Remove the subscriber for a session, if any
    pub async fn remove_subscriber(&self, session_id: &str) {
        self.subscribers.write().await.remove(session_id);
    }

    /// Whether a subscriber is currently registered for a session
    pub async fn has_subscriber(&self, session_id: &str) -> bool {
        self.subscribers.read().await.contains_key(session_id)
    }

    /// Deliver an event to the session's current subscriber.
    ///
    /// The lookup happens here, at dispatch time. Without a subscriber the
    /// event is dropped; a closed subscriber channel is logged and ignored
    /// so a dead connection never stalls the producing reader task.
    pub async fn dispatch(&self, session_id: &str, event: OutputEvent) {
        let tx = self.subscribers.read().await.get(session_id).cloned();
        match tx {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!(session_id, "Subscriber channel closed, event discarded");
                }
            }
            None => {
                tracing::trace!(session_id, "No subscriber registered, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_without_subscriber_is_dropped() {
        let router = OutputRouter::new();
        router
            .dispatch("s1", OutputEvent::Chunk("early\n".to_string()))
            .await;

        // A subscriber attached afterwards must not see the earlier event
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_order_preserved() {
        let router = OutputRouter::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx).await;

        for i in 0..5 {
            router
                .dispatch("s1", OutputEvent::Chunk(format!("line {}\n", i)))
                .await;
        }

        for i in 0..5 {
            assert_eq!(
                rx.try_recv().unwrap(),
                OutputEvent::Chunk(format!("line {}\n", i))
            );
        }
    }

    #[tokio::test]
    async fn test_replacing_subscriber_redirects_dispatch() {
        let router = OutputRouter::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx1).await;
        router
            .dispatch("s1", OutputEvent::Chunk("first\n".to_string()))
            .await;

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx2).await;
        router
            .dispatch("s1", OutputEvent::Chunk("second\n".to_string()))
            .await;

        assert_eq!(
            rx1.try_recv().unwrap(),
            OutputEvent::Chunk("first\n".to_string())
        );
        assert!(rx1.try_recv().is_err());
        assert_eq!(
            rx2.try_recv().unwrap(),
            OutputEvent::Chunk("second\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_dispatch_to_closed_subscriber_does_not_panic() {
        let router = OutputRouter::new();
        let (tx, rx) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx).await;
        drop(rx);

        router
            .dispatch("s1", OutputEvent::Chunk("into the void\n".to_string()))
            .await;
    }

    #[tokio::test]
    async fn test_remove_subscriber() {
        let router = OutputRouter::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx).await;
        assert!(router.has_subscriber("s1").await);

        router.remove_subscriber("s1").await;
        assert!(!router.has_subscriber("s1").await);

        // Removing again is harmless
        router.remove_subscriber("s1").await;
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let router = OutputRouter::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        router.set_subscriber("s1", tx1).await;
        router.set_subscriber("s2", tx2).await;

        router.dispatch("s1", OutputEvent::Completed).await;

        assert_eq!(rx1.try_recv().unwrap(), OutputEvent::Completed);
        assert!(rx2.try_recv().is_err());
    }
}
