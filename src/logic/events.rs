//! Decision Events - fire-and-forget notifications
//!
//! On block/quarantine the engine hands a `DecisionEvent` to a `Notifier`.
//! Delivery (webhooks, alerting) is the consumer's job; `notify` must
//! never block the request path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::logic::policy::{Action, DecisionResult};
use crate::logic::rules::Trigger;

/// Event names
pub mod events {
    pub const SUBMISSION_BLOCKED: &str = "submission:blocked";
    pub const SUBMISSION_QUARANTINED: &str = "submission:quarantined";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub event: String,
    pub submission_id: Uuid,
    pub action: Action,
    pub score: f64,
    pub triggers: Vec<Trigger>,
    pub endpoint: String,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
}

impl DecisionEvent {
    /// Event for a flagged decision, None for allow/challenge
    pub fn from_decision(decision: &DecisionResult, endpoint: &str, ip: &str) -> Option<Self> {
        let event = match decision.action {
            Action::Block => events::SUBMISSION_BLOCKED,
            Action::Quarantine => events::SUBMISSION_QUARANTINED,
            Action::Allow | Action::Challenge => return None,
        };
        Some(Self {
            event: event.to_string(),
            submission_id: decision.submission_id,
            action: decision.action,
            score: decision.score,
            triggers: decision.triggers.clone(),
            endpoint: endpoint.to_string(),
            ip: ip.to_string(),
            timestamp: decision.decided_at,
        })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: DecisionEvent);
}

/// Hands events to an async consumer over an unbounded channel
pub struct ChannelNotifier {
    tx: UnboundedSender<DecisionEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<DecisionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: DecisionEvent) {
        let id = event.submission_id;
        if self.tx.send(event).is_err() {
            log::warn!("[submission {}] Notifier channel closed, event dropped", id);
        }
    }
}

/// Writes events to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: DecisionEvent) {
        log::info!(
            "[submission {}] {} score={:.2} ip={} endpoint={} triggers={}",
            event.submission_id,
            event.event,
            event.score,
            event.ip,
            event.endpoint,
            event.triggers.len()
        );
    }
}
