//! Per-cycle event trail
//!
//! Each stage of a cycle records what happened as a [`StepEvent`]. Callers
//! branch on `stage`/`outcome`; the human-readable reason is rendered from
//! the decision reason plus every blocked or failed event.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    StopLoss,
    Sentiment,
    Oracle,
    Quantity,
    Risk,
    Order,
    Position,
    Trailing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::StopLoss => "stop_loss",
            Stage::Sentiment => "sentiment",
            Stage::Oracle => "oracle",
            Stage::Quantity => "quantity",
            Stage::Risk => "risk",
            Stage::Order => "order",
            Stage::Position => "position",
            Stage::Trailing => "trailing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Stage ran and succeeded
    Ok,
    /// Stage did not apply this cycle
    Skipped,
    /// A stop fired
    Triggered,
    /// Stage changed state (stop raised, quantity clamped)
    Adjusted,
    /// Policy prevented the action
    Blocked,
    /// Stage errored; the cycle continued
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Skipped => "skipped",
            Outcome::Triggered => "triggered",
            Outcome::Adjusted => "adjusted",
            Outcome::Blocked => "blocked",
            Outcome::Failed => "failed",
        }
    }

    /// Rendered into the reason string
    pub fn is_annotation(&self) -> bool {
        matches!(self, Outcome::Blocked | Outcome::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub stage: Stage,
    pub outcome: Outcome,
    pub detail: String,
}

impl StepEvent {
    pub fn new(stage: Stage, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            stage,
            outcome,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.stage, self.outcome.as_str(), self.detail)
    }
}

/// Ordered event list for one cycle
#[derive(Debug, Clone, Default)]
pub struct Trail {
    events: Vec<StepEvent>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage, outcome: Outcome, detail: impl Into<String>) -> &StepEvent {
        self.events.push(StepEvent::new(stage, outcome, detail));
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &[StepEvent] {
        &self.events
    }

    pub fn has(&self, stage: Stage, outcome: Outcome) -> bool {
        self.events
            .iter()
            .any(|e| e.stage == stage && e.outcome == outcome)
    }

    /// `base` followed by every annotating event, separated by " | "
    pub fn render(&self, base: &str) -> String {
        render_reason(base, &self.events)
    }

    pub fn into_events(self) -> Vec<StepEvent> {
        self.events
    }
}

pub fn render_reason(base: &str, events: &[StepEvent]) -> String {
    let mut reason = base.to_string();
    for event in events.iter().filter(|e| e.outcome.is_annotation()) {
        if !reason.is_empty() {
            reason.push_str(" | ");
        }
        reason.push_str(&event.to_string());
    }
    reason
}
