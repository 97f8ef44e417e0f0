//! Server-sent event streams of the two progress topics.
//!
//! Each connected client gets its own broadcast receiver. A client that falls
//! behind skips the events it missed and keeps streaming.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::progress::Topic;
use crate::shared_state::AppState;

/// GET /events/nl-to-sql
pub async fn nl_to_sql_events(State(state): State<AppState>) -> Response {
    topic_stream(state, Topic::NlToSql)
}

/// GET /events/query-execution
pub async fn query_execution_events(State(state): State<AppState>) -> Response {
    topic_stream(state, Topic::QueryExecution)
}

fn topic_stream(state: AppState, topic: Topic) -> Response {
    let mut receiver = state.events.subscribe(topic);
    debug!("SSE subscriber attached to {}", topic.destination());

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => yield Ok::<_, Infallible>(Event::default().event(&event.stage).data(data)),
                    Err(e) => warn!("Failed to encode stage event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE subscriber on {} lagged, {} events skipped", topic.destination(), skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
