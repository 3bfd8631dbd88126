//! Call-graph instrumentation for LLM applications.
//!
//! A [`Tracer`] turns nested instrumented calls into a tree of spans under one
//! trace and hands the finished trace to a [`Submitter`] when the outermost call
//! returns:
//!
//! ```no_run
//! use agentscope::{SdkConfig, SpanKind, Tracer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tracer = Tracer::http(SdkConfig::load()?)?;
//! let answer = tracer
//!     .span("answer_question", SpanKind::Agent)
//!     .input("what is the refund policy?")
//!     .run(|| {
//!         tracer
//!             .span("search_docs", SpanKind::Tool)
//!             .run(|| Ok::<_, std::io::Error>(vec!["policy.md"]))
//!     })?;
//! # let _ = answer;
//! tracer.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod client;
pub mod config;
pub mod context;
pub mod submit;
pub mod tracer;

pub use agentscope_core::model::{LlmUsage, SpanKind, SpanRecord, Status, TraceRecord};
pub use agentscope_core::{AgentscopeError, Result};
pub use capture::{CaptureError, capture};
pub use client::{CollectorClient, TraceListParams};
pub use config::SdkConfig;
pub use context::{current_span_id, current_trace_id, scope};
pub use submit::{HttpSubmitter, MemorySubmitter, NoopSubmitter, Submitter};
pub use tracer::{ManualSpan, SpanBuilder, SpanGuard, TraceGuard, Tracer};

/// Builds an HTTP-backed tracer from defaults, the config file and the environment.
pub fn init() -> Result<Tracer> {
    Tracer::http(SdkConfig::load()?)
}
