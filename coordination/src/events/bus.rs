//! Event bus for deliberation runs
//!
//! Provides in-process pub/sub using Tokio broadcast channels. Every run
//! publishes through the [`EventPublisher`] trait; [`EventBus`] is the
//! in-process implementation subscribers attach to.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::{DeliberationEvent, EventEnvelope};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to send event: {0}")]
    SendFailed(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, PublishError>;

/// Delivers events for a conversation to whoever is listening.
///
/// Delivery is ordered per conversation and at-least-once; consumers must
/// tolerate duplicates. An error here means the transport itself is gone.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, conversation_id: &str, event: DeliberationEvent)
        -> EventBusResult<()>;
}

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    /// Broadcast sender for publishing events
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create an event bus with a custom per-subscriber buffer
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn send(&self, conversation_id: &str, event: DeliberationEvent) -> EventBusResult<()> {
        let event_type = event.event_type();
        let envelope = EventEnvelope::new(conversation_id, event);

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(envelope) {
            Ok(count) => {
                debug!(event_type, conversation_id, receivers = count, "Event published");
            }
            Err(_) => {
                debug!(event_type, conversation_id, "Event published (no receivers)");
            }
        }
        Ok(())
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(
        &self,
        conversation_id: &str,
        event: DeliberationEvent,
    ) -> EventBusResult<()> {
        self.send(conversation_id, event)
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by conversation ID
    pub conversation_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by conversation ID
    pub fn conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(ref cid) = self.conversation_id {
            if &envelope.conversation_id != cid {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == envelope.event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<EventEnvelope>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<EventEnvelope>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<EventEnvelope, broadcast::error::RecvError> {
        loop {
            let envelope = self.receiver.recv().await?;
            if self.filter.matches(&envelope) {
                return Ok(envelope);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    /// Subscribe with a filter
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(agent: &str, content: &str) -> DeliberationEvent {
        DeliberationEvent::Token {
            agent: agent.to_string(),
            content: content.to_string(),
            round: 1,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish("c-1", DeliberationEvent::RoundUpdate { round: 2 })
            .await
            .unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.conversation_id, "c-1");
        assert_eq!(received.event.event_type(), "round_update");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        assert!(bus.publish("c-1", token("OpenAI", "hi")).await.is_ok());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.send("c-1", token("Gemini", "a")).unwrap();

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event, e2.event);
    }

    #[tokio::test]
    async fn test_order_preserved_within_conversation() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for piece in ["a", "b", "c"] {
            bus.send("c-1", token("OpenAI", piece)).unwrap();
        }
        let mut seen = String::new();
        for _ in 0..3 {
            if let DeliberationEvent::Token { content, .. } = rx.recv().await.unwrap().event {
                seen.push_str(&content);
            }
        }
        assert_eq!(seen, "abc");
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .conversation("c-1")
            .types(vec!["final", "error"]);

        let matching = EventEnvelope::new("c-1", DeliberationEvent::Final { result: "x".into() });
        let other_conversation =
            EventEnvelope::new("c-2", DeliberationEvent::Final { result: "x".into() });
        let other_type = EventEnvelope::new("c-1", token("OpenAI", "x"));

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&other_conversation));
        assert!(!filter.matches(&other_type));
        assert!(EventFilter::new().matches(&other_type));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().conversation("target"));

        let publisher = Arc::clone(&bus);
        tokio::spawn(async move {
            publisher.send("other", token("OpenAI", "skip")).unwrap();
            publisher
                .send("target", DeliberationEvent::RoundUpdate { round: 2 })
                .unwrap();
        });

        let envelope = filtered.recv().await.unwrap();
        assert_eq!(envelope.conversation_id, "target");
        assert_eq!(envelope.event.round(), Some(2));
    }
}
