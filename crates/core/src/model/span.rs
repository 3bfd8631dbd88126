use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentscopeError, Result};
use crate::ids::new_span_id;

/// Type tag of a span.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Llm,
    Tool,
    #[default]
    Function,
    Chain,
    Agent,
    Custom,
}

impl SpanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Function => "function",
            Self::Chain => "chain",
            Self::Agent => "agent",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for SpanKind {
    type Err = AgentscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "tool" => Ok(Self::Tool),
            "function" => Ok(Self::Function),
            "chain" => Ok(Self::Chain),
            "agent" => Ok(Self::Agent),
            "custom" => Ok(Self::Custom),
            _ => Err(AgentscopeError::Parse(format!("unknown span type: {s}"))),
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status shared by spans and traces.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Running,
    Success,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Records arriving over the wire without a status were completed by the sender.
    pub(crate) fn completed() -> Self {
        Self::Success
    }
}

impl FromStr for Status {
    type Err = AgentscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "success" | "ok" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(AgentscopeError::Parse(format!("unknown status: {s}"))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a span or trace ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error(String),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Success => Status::Success,
            Self::Error(_) => Status::Error,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Error(msg) => Some(msg),
        }
    }
}

/// LLM usage attached to a span.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmUsage {
    pub model: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cost_usd: Option<f64>,
}

impl LlmUsage {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn tokens(mut self, input: i64, output: i64) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self
    }

    pub fn cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = Some(cost_usd);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanRecord {
    pub id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub span_type: SpanKind,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<i64>,
    #[serde(default)]
    pub output_tokens: Option<i64>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub input_data: Option<Value>,
    #[serde(default)]
    pub output_data: Option<Value>,
    #[serde(default = "Status::completed")]
    pub status: Status,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl SpanRecord {
    /// A running span starting now.
    pub fn start(name: impl Into<String>, kind: SpanKind, parent_span_id: Option<String>) -> Self {
        Self::start_at(name, kind, parent_span_id, Utc::now())
    }

    pub fn start_at(
        name: impl Into<String>,
        kind: SpanKind,
        parent_span_id: Option<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_span_id(),
            parent_span_id,
            name: name.into(),
            span_type: kind,
            start_time,
            end_time: None,
            duration_ms: None,
            model: None,
            input_tokens: None,
            output_tokens: None,
            cost_usd: None,
            input_data: None,
            output_data: None,
            status: Status::Running,
            error_message: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn finish(&mut self, outcome: Outcome) -> bool {
        self.finish_at(outcome, Utc::now())
    }

    /// Sets end time, duration, status and error together. Returns false if the
    /// span was already finished, in which case nothing changes.
    pub fn finish_at(&mut self, outcome: Outcome, end_time: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.end_time = Some(end_time);
        self.duration_ms = Some(elapsed_ms(self.start_time, end_time));
        self.status = outcome.status();
        self.error_message = outcome.error_message().map(str::to_string);
        true
    }

    pub fn apply_llm(&mut self, usage: LlmUsage) {
        self.span_type = SpanKind::Llm;
        self.model = Some(usage.model);
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self.cost_usd = usage.cost_usd;
    }

    /// input + output tokens, `None` when the span reported neither.
    pub fn token_count(&self) -> Option<i64> {
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0).saturating_add(output.unwrap_or(0))),
        }
    }
}

pub(crate) fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn span_kind_parse_and_display() {
        assert_eq!(SpanKind::from_str("LLM").unwrap(), SpanKind::Llm);
        assert_eq!(SpanKind::Agent.to_string(), "agent");
        assert!(SpanKind::from_str("workflow").is_err());
    }

    #[test]
    fn token_count_saturates_instead_of_wrapping() {
        let mut span = SpanRecord::start("chat", SpanKind::Llm, None);
        span.apply_llm(LlmUsage::new("m").tokens(i64::MAX, 1));
        assert_eq!(span.token_count(), Some(i64::MAX));
    }

    #[test]
    fn finish_sets_end_and_duration_together() {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let mut span = SpanRecord::start_at("step", SpanKind::Tool, None, start);
        assert!(span.is_running());
        assert_eq!(span.status, Status::Running);

        assert!(span.finish_at(
            Outcome::Error("boom".into()),
            start + Duration::milliseconds(250)
        ));
        assert_eq!(span.duration_ms, Some(250));
        assert_eq!(span.status, Status::Error);
        assert_eq!(span.error_message.as_deref(), Some("boom"));

        assert!(!span.finish_at(Outcome::Success, start + Duration::seconds(5)));
        assert_eq!(span.duration_ms, Some(250));
        assert_eq!(span.status, Status::Error);
    }

    #[test]
    fn clock_skew_never_yields_negative_duration() {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 1).unwrap();
        let mut span = SpanRecord::start_at("skewed", SpanKind::Function, None, start);
        span.finish_at(Outcome::Success, start - Duration::seconds(1));
        assert_eq!(span.duration_ms, Some(0));
    }

    #[test]
    fn token_count_only_when_reported() {
        let mut span = SpanRecord::start("call", SpanKind::Function, None);
        assert_eq!(span.token_count(), None);
        span.apply_llm(LlmUsage::new("gpt-4o").tokens(100, 20).cost(0.002));
        assert_eq!(span.span_type, SpanKind::Llm);
        assert_eq!(span.token_count(), Some(120));

        span.output_tokens = None;
        assert_eq!(span.token_count(), Some(100));
    }

    #[test]
    fn deserializes_minimal_wire_span() {
        let raw = r#"{"id":"s1","name":"Step 1","start_time":"2026-02-01T00:00:00Z"}"#;
        let span: SpanRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(span.span_type, SpanKind::Function);
        assert_eq!(span.status, Status::Success);
        assert!(span.parent_span_id.is_none());
    }
}
