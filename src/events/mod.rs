//! Outbound user events.
//!
//! Publishing never blocks and never fails the calling operation. Delivery is
//! at most once: an event is dropped, with a warning, when the queue is full
//! or the delivery task has stopped, and a sink error is logged, not retried.

use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum UserEvent {
    UserRegistered {
        user_id: String,
        email: String,
        username: String,
    },
    UserLoggedIn {
        user_id: String,
        platform: String,
        device_id: String,
    },
}

impl UserEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "UserRegistered",
            UserEvent::UserLoggedIn { .. } => "UserLoggedIn",
        }
    }
}

pub trait EventPublisher: Send + Sync {
    /// Fire-and-forget.
    fn publish(&self, event: UserEvent);
}

/// Final destination of published events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &UserEvent) -> Result<(), AppError>;
}

/// Writes events to the log as JSON.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: &UserEvent) -> Result<(), AppError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::InternalError(format!("event encoding failed: {e}")))?;
        info!(target: "identity.events", event = event.name(), %payload, "User event");
        Ok(())
    }
}

pub struct ChannelEventPublisher {
    sender: mpsc::Sender<UserEvent>,
}

impl ChannelEventPublisher {
    /// Starts the delivery task. It exits once every publisher is dropped.
    pub fn spawn(buffer: usize, sink: Arc<dyn EventSink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<UserEvent>(buffer.max(1));

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = sink.deliver(&event).await {
                    warn!(target: "identity.events", event = event.name(), error = %e, "Event delivery failed");
                }
            }
        });

        (Self { sender }, handle)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: UserEvent) {
        if let Err(e) = self.sender.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("queue full", event),
                mpsc::error::TrySendError::Closed(event) => ("publisher closed", event),
            };
            warn!(target: "identity.events", event = event.name(), reason, "Dropping user event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<UserEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn deliver(&self, event: &UserEvent) -> Result<(), AppError> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn deliver(&self, _event: &UserEvent) -> Result<(), AppError> {
            Err(AppError::InternalError("broker down".into()))
        }
    }

    fn login_event(n: usize) -> UserEvent {
        UserEvent::UserLoggedIn {
            user_id: format!("u-{n}"),
            platform: "ios".into(),
            device_id: "d-1".into(),
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let (publisher, handle) = ChannelEventPublisher::spawn(8, sink.clone());

        publisher.publish(login_event(1));
        publisher.publish(login_event(2));
        drop(publisher);
        handle.await.unwrap();

        assert_eq!(*sink.events.lock().await, vec![login_event(1), login_event(2)]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let sink = Arc::new(RecordingSink::default());
        let (publisher, handle) = ChannelEventPublisher::spawn(1, sink.clone());

        // current-thread runtime: the delivery task cannot run until we yield
        for n in 0..10 {
            publisher.publish(login_event(n));
        }
        drop(publisher);
        handle.await.unwrap();

        assert_eq!(*sink.events.lock().await, vec![login_event(0)]);
    }

    #[tokio::test]
    async fn test_sink_errors_do_not_stop_delivery() {
        let (publisher, handle) = ChannelEventPublisher::spawn(4, Arc::new(FailingSink));
        publisher.publish(login_event(1));
        publisher.publish(login_event(2));
        drop(publisher);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_log_sink_accepts_events() {
        let event = UserEvent::UserRegistered {
            user_id: "u-1".into(),
            email: "a@example.com".into(),
            username: "alice".into(),
        };
        LogSink.deliver(&event).await.unwrap();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "UserRegistered");
        assert_eq!(json["user_id"], "u-1");
    }
}
