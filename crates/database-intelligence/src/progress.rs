//! Stage-event broadcasting for the two pipelines.
//!
//! Every pipeline transition produces one [`StageEvent`] on the topic of its
//! flow. Publishing is fire-and-forget: no subscriber, a lagging subscriber or a
//! full channel never blocks or fails the pipeline that emitted the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::metrics;

/// Broadcast channel capacity per topic. Slow receivers lose the oldest events.
pub const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    NlToSql,
    QueryExecution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    InProgress,
    Success,
    Error,
}

/// Logical broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    NlToSql,
    QueryExecution,
}

impl Topic {
    pub fn destination(&self) -> &'static str {
        match self {
            Topic::NlToSql => "/topic/nl-to-sql",
            Topic::QueryExecution => "/topic/query-execution",
        }
    }

    pub fn feature(&self) -> Feature {
        match self {
            Topic::NlToSql => Feature::NlToSql,
            Topic::QueryExecution => Feature::QueryExecution,
        }
    }
}

/// Immutable progress message for one pipeline transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageEvent {
    pub feature: Feature,
    pub request_id: String,
    pub stage: String,
    pub status: StageStatus,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(
        feature: Feature,
        request_id: &str,
        stage: &str,
        status: StageStatus,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            feature,
            request_id: request_id.to_string(),
            stage: stage.to_string(),
            status,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Transport-agnostic publish interface.
pub trait ProgressPublisher: Send + Sync {
    /// Must return promptly and must not fail the caller.
    fn publish(&self, topic: Topic, event: StageEvent);
}

/// In-process broadcaster with one `tokio::sync::broadcast` channel per topic.
#[derive(Clone)]
pub struct BroadcastPublisher {
    nl_to_sql: broadcast::Sender<StageEvent>,
    query_execution: broadcast::Sender<StageEvent>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self::with_capacity(TOPIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (nl_to_sql, _) = broadcast::channel(capacity);
        let (query_execution, _) = broadcast::channel(capacity);
        Self {
            nl_to_sql,
            query_execution,
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<StageEvent> {
        match topic {
            Topic::NlToSql => &self.nl_to_sql,
            Topic::QueryExecution => &self.query_execution,
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<StageEvent> {
        self.sender(topic).subscribe()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPublisher for BroadcastPublisher {
    fn publish(&self, topic: Topic, event: StageEvent) {
        metrics::inc_progress_event(topic.destination());
        trace!(
            "{} {} {:?} {}",
            topic.destination(),
            event.request_id,
            event.status,
            event.stage
        );
        // Err only means nobody is listening right now
        if self.sender(topic).send(event).is_err() {
            debug!("No subscribers on {}, event dropped", topic.destination());
        }
    }
}

/// Captures events in publish order. Used by tests and diagnostics.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(Topic, StageEvent)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Topic, StageEvent)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `(stage, status)` pairs for one topic, in order.
    pub fn stages(&self, topic: Topic) -> Vec<(String, StageStatus)> {
        self.events()
            .into_iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, e)| (e.stage, e.status))
            .collect()
    }
}

impl ProgressPublisher for RecordingPublisher {
    fn publish(&self, topic: Topic, event: StageEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push((topic, event)),
            Err(poisoned) => poisoned.into_inner().push((topic, event)),
        }
    }
}

/// Publisher bound to one topic and request id.
#[derive(Clone)]
pub struct StageReporter {
    publisher: Arc<dyn ProgressPublisher>,
    topic: Topic,
    request_id: String,
}

impl StageReporter {
    pub fn new(publisher: Arc<dyn ProgressPublisher>, topic: Topic, request_id: impl Into<String>) -> Self {
        Self {
            publisher,
            topic,
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn progress(&self, stage: &str, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.emit(stage, StageStatus::InProgress, message, data);
    }

    pub fn success(&self, stage: &str, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.emit(stage, StageStatus::Success, message, data);
    }

    pub fn error(&self, stage: &str, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.emit(stage, StageStatus::Error, message, data);
    }

    fn emit(&self, stage: &str, status: StageStatus, message: impl Into<String>, data: Option<serde_json::Value>) {
        let event = StageEvent::new(self.topic.feature(), &self.request_id, stage, status, message, data);
        self.publisher.publish(self.topic, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ===== Wire Format Tests =====

    #[test]
    fn test_stage_event_wire_format() {
        let event = StageEvent::new(
            Feature::NlToSql,
            "req-1",
            "RETRIEVING_SCHEMA",
            StageStatus::InProgress,
            "Retrieving relevant schema context",
            Some(json!({"databaseId": 3})),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["feature"], "NL_TO_SQL");
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["stage"], "RETRIEVING_SCHEMA");
        assert_eq!(value["status"], "IN_PROGRESS");
        assert_eq!(value["data"]["databaseId"], 3);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_query_execution_feature_name() {
        let value = serde_json::to_value(Topic::QueryExecution.feature()).unwrap();
        assert_eq!(value, "QUERY_EXECUTION");
        assert_eq!(Topic::QueryExecution.destination(), "/topic/query-execution");
    }

    // ===== Broadcast Tests =====

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        let publisher = BroadcastPublisher::new();
        assert_eq!(publisher.subscriber_count(Topic::NlToSql), 0);
        let reporter = StageReporter::new(Arc::new(publisher), Topic::NlToSql, "req-0");
        reporter.progress("REQUEST_RECEIVED", "received", None);
        reporter.error("RETRIEVAL_FAILED", "boom", None);
    }

    #[tokio::test]
    async fn test_events_are_delivered_in_order_per_topic() {
        let publisher = BroadcastPublisher::new();
        let mut nl_rx = publisher.subscribe(Topic::NlToSql);
        let mut exec_rx = publisher.subscribe(Topic::QueryExecution);

        let shared: Arc<dyn ProgressPublisher> = Arc::new(publisher.clone());
        let nl = StageReporter::new(shared.clone(), Topic::NlToSql, "a");
        let exec = StageReporter::new(shared, Topic::QueryExecution, "b");

        nl.progress("REQUEST_RECEIVED", "r", None);
        exec.progress("REQUEST_RECEIVED", "r", None);
        nl.success("COMPLETED", "done", None);

        let first = nl_rx.recv().await.unwrap();
        let second = nl_rx.recv().await.unwrap();
        assert_eq!(first.stage, "REQUEST_RECEIVED");
        assert_eq!(second.stage, "COMPLETED");
        assert_eq!(second.status, StageStatus::Success);

        let only = exec_rx.recv().await.unwrap();
        assert_eq!(only.feature, Feature::QueryExecution);
        assert_eq!(only.request_id, "b");
        assert!(exec_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_publisher() {
        let publisher = BroadcastPublisher::with_capacity(2);
        let mut rx = publisher.subscribe(Topic::NlToSql);
        let reporter = StageReporter::new(Arc::new(publisher), Topic::NlToSql, "lag");

        for i in 0..10 {
            reporter.progress(&format!("STAGE_{}", i), "m", None);
        }

        // The receiver is told it lagged, then sees the newest events
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        let next = rx.recv().await.unwrap();
        assert_eq!(next.stage, "STAGE_8");
    }

    // ===== Recording Publisher Tests =====

    #[test]
    fn test_recording_publisher_keeps_order() {
        let recorder = Arc::new(RecordingPublisher::new());
        let reporter = StageReporter::new(recorder.clone(), Topic::QueryExecution, "rec");
        reporter.progress("REQUEST_RECEIVED", "r", None);
        reporter.error("ERROR", "e", None);

        assert_eq!(
            recorder.stages(Topic::QueryExecution),
            vec![
                ("REQUEST_RECEIVED".to_string(), StageStatus::InProgress),
                ("ERROR".to_string(), StageStatus::Error),
            ]
        );
        assert!(recorder.stages(Topic::NlToSql).is_empty());
    }
}
