//! Typed progress events for review callers.
//!
//! A discriminated union instead of loose dictionaries: callers match on
//! the variant, serializers get a stable `type` tag. Delivery is an
//! unbounded channel; a missing or closed receiver never stalls a review.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::model::ReviewOutcome;

/// One progress event emitted during a review.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    Status { state: String, message: String },
    Progress { percent: u8, message: String },
    Error { message: String },
    Final { result: ReviewOutcome },
}

/// Event destination handed into the pipeline.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<ReviewEvent>>,
}

impl EventSink {
    /// Sink that delivers into the given channel.
    pub fn new(tx: UnboundedSender<ReviewEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything (no caller listening).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn status(&self, state: &str, message: impl Into<String>) {
        self.send(ReviewEvent::Status {
            state: state.to_string(),
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        self.send(ReviewEvent::Progress {
            percent,
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(ReviewEvent::Error {
            message: message.into(),
        });
    }

    pub fn final_result(&self, result: ReviewOutcome) {
        self.send(ReviewEvent::Final { result });
    }

    fn send(&self, event: ReviewEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("event receiver dropped, continuing without progress events");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_a_type_tag() {
        let json = serde_json::to_value(ReviewEvent::Progress {
            percent: 60,
            message: "Stage 1 complete".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percent"], 60);
    }

    #[tokio::test]
    async fn sink_delivers_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.status("stage_0_started", "planning");
        sink.progress(10, "plan ready");

        match rx.recv().await.unwrap() {
            ReviewEvent::Status { state, .. } => assert_eq!(state, "stage_0_started"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ReviewEvent::Progress { percent, .. } => assert_eq!(percent, 10),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn disabled_sink_never_panics() {
        EventSink::disabled().status("x", "y");
    }

    #[test]
    fn dropped_receiver_is_tolerated() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        EventSink::new(tx).progress(50, "halfway");
    }
}
