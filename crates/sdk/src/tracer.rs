use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use agentscope_core::Result;
use agentscope_core::model::{LlmUsage, Outcome, SpanKind, SpanRecord, TraceRecord};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::capture::capture;
use crate::config::SdkConfig;
use crate::context::{self, Frame, TraceHandle};
use crate::submit::{HttpSubmitter, MemorySubmitter, NoopSubmitter, Submitter};

// SDK diagnostics surface at info when the debug flag is on.
macro_rules! diag {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Entry point for instrumentation. Clones share configuration and submitter.
#[derive(Clone)]
pub struct Tracer {
    config: Arc<SdkConfig>,
    submitter: Arc<dyn Submitter>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Tracer {
    pub fn new(config: SdkConfig, submitter: Arc<dyn Submitter>) -> Self {
        diag!(
            config.debug,
            project_id = %config.project_id,
            endpoint = %config.endpoint,
            enabled = config.enabled,
            "tracer initialized"
        );
        Self {
            config: Arc::new(config),
            submitter,
        }
    }

    /// Tracer that posts finished traces to `config.endpoint`.
    pub fn http(config: SdkConfig) -> Result<Self> {
        let submitter = HttpSubmitter::new(&config)?;
        Ok(Self::new(config, Arc::new(submitter)))
    }

    pub fn in_memory(config: SdkConfig) -> (Self, MemorySubmitter) {
        let sink = MemorySubmitter::new();
        (Self::new(config, Arc::new(sink.clone())), sink)
    }

    pub fn disabled() -> Self {
        Self::new(SdkConfig::default().disabled(), Arc::new(NoopSubmitter))
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn span(&self, name: impl Into<String>, kind: SpanKind) -> SpanBuilder {
        SpanBuilder {
            tracer: self.clone(),
            name: name.into(),
            kind,
            input: None,
        }
    }

    /// Opens a fresh root trace for the current context, even when one is
    /// already open. The previous trace and span come back when the guard drops.
    pub fn start_trace(&self, name: impl Into<String>) -> TraceGuard {
        if !self.config.enabled {
            return TraceGuard { inner: None };
        }

        let trace = TraceHandle::new(TraceRecord::start(&self.config.project_id, name));
        let prev = Frame {
            trace: context::set_current_trace(Some(trace.clone())),
            span: context::set_current_span(None),
        };
        TraceGuard {
            inner: Some(ActiveTrace {
                tracer: self.clone(),
                trace,
                prev,
                outcome: None,
            }),
        }
    }

    /// Finishes the open trace as successful, submits it and clears both the
    /// trace and span slots. Returns false when no trace was open.
    pub fn end_trace(&self) -> bool {
        let Some(trace) = context::current_trace() else {
            return false;
        };
        context::set_current_trace(None);
        context::set_current_span(None);
        self.finalize(&trace, Outcome::Success);
        true
    }

    /// Appends an already-completed span to the open trace, parented on the
    /// current span. Does nothing without an open trace. Returns the span id.
    pub fn add_span(&self, span: ManualSpan) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let trace = context::current_trace()?;

        let end = Utc::now();
        let start = span
            .duration_ms
            .and_then(|ms| chrono::Duration::try_milliseconds(ms.max(0)))
            .and_then(|elapsed| end.checked_sub_signed(elapsed))
            .unwrap_or(end);
        let mut record =
            SpanRecord::start_at(span.name, span.kind, context::current_span_id(), start);
        if let Some(usage) = span.llm {
            record.apply_llm(usage);
        }
        record.input_data = span.input_data;
        record.output_data = span.output_data;
        record.finish_at(span.outcome, end);

        let id = record.id.clone();
        trace.lock().push_span(record);
        Some(id)
    }

    /// Flushes the submitter.
    pub fn shutdown(&self) {
        self.submitter.shutdown();
    }

    fn capture<T: Serialize + ?Sized>(&self, value: &T) -> Option<Value> {
        match capture(value, self.config.payload_cap()) {
            Ok(v) => Some(v),
            Err(err) => {
                diag!(self.config.debug, error = %err, "payload capture failed; leaving it empty");
                None
            }
        }
    }

    fn finalize(&self, trace: &TraceHandle, outcome: Outcome) {
        let record = {
            let mut record = trace.lock();
            if !record.finish(outcome) {
                return;
            }
            record.clone()
        };

        diag!(
            self.config.debug,
            trace_id = %record.id,
            name = %record.name,
            spans = record.span_count,
            duration_ms = ?record.duration_ms,
            status = %record.status,
            "sending trace"
        );
        if !self.submitter.submit(&record) {
            diag!(self.config.debug, trace_id = %record.id, "trace was not accepted by the submitter");
        }
    }
}

/// One instrumented call, configured before it runs.
#[derive(Debug)]
pub struct SpanBuilder {
    tracer: Tracer,
    name: String,
    kind: SpanKind,
    input: Option<Value>,
}

impl SpanBuilder {
    pub fn input<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if self.tracer.config.enabled {
            self.input = self.tracer.capture(value);
        }
        self
    }

    /// Opens the span in the current context. Dropping the guard closes it.
    ///
    /// The context lives in a thread-local unless a task scope is active, so a
    /// guard must not be held across an `.await` on a multi-threaded runtime:
    /// the task may resume on another worker and parent its spans wrongly. In
    /// async code use [`run_async`](Self::run_async), or wrap the future in
    /// [`context::scope`](crate::context::scope) before entering.
    pub fn enter(self) -> SpanGuard {
        if !self.tracer.config.enabled {
            return SpanGuard { inner: None };
        }

        let (trace, is_root) = match context::current_trace() {
            Some(trace) => (trace, false),
            None => {
                let trace =
                    TraceHandle::new(TraceRecord::start(&self.tracer.config.project_id, &self.name));
                context::set_current_trace(Some(trace.clone()));
                (trace, true)
            }
        };

        // a new root never inherits a span left over from an earlier trace
        let parent = if is_root { None } else { context::current_span_id() };
        let mut span = SpanRecord::start(self.name, self.kind, parent);
        span.input_data = self.input;
        let prev_span = context::set_current_span(Some(span.id.clone()));

        SpanGuard {
            inner: Some(ActiveSpan {
                tracer: self.tracer,
                trace,
                span,
                prev_span,
                is_root,
                outcome: None,
                on_drop: Outcome::Success,
            }),
        }
    }

    /// Runs `op` inside the span. An `Err` marks the span failed with its
    /// `Display` text and is returned unchanged.
    pub fn run<T, E, F>(self, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        T: Serialize,
        E: fmt::Display,
    {
        if !self.tracer.config.enabled {
            return op();
        }

        let mut guard = self.enter();
        let result = op();
        guard.record_result(&result);
        drop(guard);
        result
    }

    /// [`run`](Self::run) for operations that cannot fail.
    pub fn call<T, F>(self, op: F) -> T
    where
        F: FnOnce() -> T,
        T: Serialize,
    {
        match self.run(|| Ok::<T, Infallible>(op())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Async form of [`run`](Self::run). The future runs in its own context
    /// scope, so concurrently awaited siblings keep separate parentage. If the
    /// returned future is dropped early the span is recorded as cancelled.
    pub async fn run_async<T, E, Fut>(self, fut: Fut) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
        E: fmt::Display,
    {
        if !self.tracer.config.enabled {
            return fut.await;
        }

        context::scope(async move {
            let mut guard = self.enter();
            if let Some(active) = guard.inner.as_mut() {
                active.on_drop = Outcome::Error("cancelled".to_string());
            }
            let result = fut.await;
            guard.record_result(&result);
            result
        })
        .await
    }
}

struct ActiveSpan {
    tracer: Tracer,
    trace: TraceHandle,
    span: SpanRecord,
    prev_span: Option<String>,
    is_root: bool,
    outcome: Option<Outcome>,
    on_drop: Outcome,
}

impl ActiveSpan {
    fn close(mut self, outcome: Outcome) {
        self.span.finish(outcome.clone());
        self.trace.lock().push_span(self.span);
        context::set_current_span(self.prev_span);

        if self.is_root {
            self.tracer.finalize(&self.trace, outcome);
            if let Some(current) = context::current_trace()
                && current.same_as(&self.trace)
            {
                context::set_current_trace(None);
            }
        }
    }
}

/// An open span. Closes on drop, as success unless told otherwise.
#[must_use = "the span closes as soon as the guard is dropped"]
pub struct SpanGuard {
    inner: Option<ActiveSpan>,
}

impl fmt::Debug for SpanGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanGuard")
            .field("span_id", &self.span_id())
            .finish()
    }
}

impl SpanGuard {
    /// `None` when tracing is disabled.
    pub fn span_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|a| a.span.id.as_str())
    }

    pub fn trace_id(&self) -> Option<String> {
        self.inner.as_ref().map(|a| a.trace.id())
    }

    pub fn set_llm(&mut self, usage: LlmUsage) {
        if let Some(active) = self.inner.as_mut() {
            active.span.apply_llm(usage);
        }
    }

    pub fn set_output<T: Serialize + ?Sized>(&mut self, value: &T) {
        if let Some(active) = self.inner.as_mut() {
            active.span.output_data = active.tracer.capture(value);
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if let Some(active) = self.inner.as_mut() {
            active.outcome = Some(Outcome::Error(message.into()));
        }
    }

    pub fn succeed(&mut self) {
        if let Some(active) = self.inner.as_mut() {
            active.outcome = Some(Outcome::Success);
        }
    }

    fn record_result<T: Serialize, E: fmt::Display>(&mut self, result: &std::result::Result<T, E>) {
        match result {
            Ok(value) => {
                self.set_output(value);
                self.succeed();
            }
            Err(err) => self.fail(err.to_string()),
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let Some(active) = self.inner.take() else {
            return;
        };
        let outcome = match &active.outcome {
            Some(outcome) => outcome.clone(),
            None if std::thread::panicking() => Outcome::Error("panicked".to_string()),
            None => active.on_drop.clone(),
        };
        active.close(outcome);
    }
}

struct ActiveTrace {
    tracer: Tracer,
    trace: TraceHandle,
    prev: Frame,
    outcome: Option<Outcome>,
}

/// Scoped root trace from [`Tracer::start_trace`].
#[must_use = "the trace is submitted as soon as the guard is dropped"]
pub struct TraceGuard {
    inner: Option<ActiveTrace>,
}

impl fmt::Debug for TraceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceGuard")
            .field("trace_id", &self.trace_id())
            .finish()
    }
}

impl TraceGuard {
    pub fn trace_id(&self) -> Option<String> {
        self.inner.as_ref().map(|a| a.trace.id())
    }

    pub fn set_metadata<T: Serialize + ?Sized>(&mut self, metadata: &T) {
        let Some(active) = self.inner.as_mut() else {
            return;
        };
        match serde_json::to_value(metadata) {
            Ok(value) => active.trace.lock().metadata = Some(value),
            Err(err) => diag!(active.tracer.config.debug, error = %err, "trace metadata is not serializable"),
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if let Some(active) = self.inner.as_mut() {
            active.outcome = Some(Outcome::Error(message.into()));
        }
    }

    pub fn succeed(&mut self) {
        if let Some(active) = self.inner.as_mut() {
            active.outcome = Some(Outcome::Success);
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        let Some(active) = self.inner.take() else {
            return;
        };
        let outcome = match active.outcome {
            Some(outcome) => outcome,
            None if std::thread::panicking() => Outcome::Error("panicked".to_string()),
            None => Outcome::Success,
        };
        active.tracer.finalize(&active.trace, outcome);
        context::set_current_trace(active.prev.trace);
        context::set_current_span(active.prev.span);
    }
}

/// A completed span appended with [`Tracer::add_span`].
#[derive(Debug, Clone)]
pub struct ManualSpan {
    name: String,
    kind: SpanKind,
    llm: Option<LlmUsage>,
    input_data: Option<Value>,
    output_data: Option<Value>,
    duration_ms: Option<i64>,
    outcome: Outcome,
}

impl ManualSpan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SpanKind::Custom,
            llm: None,
            input_data: None,
            output_data: None,
            duration_ms: None,
            outcome: Outcome::Success,
        }
    }

    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Also switches the span type to `llm`.
    pub fn llm(mut self, usage: LlmUsage) -> Self {
        self.llm = Some(usage);
        self
    }

    pub fn input(mut self, data: Value) -> Self {
        self.input_data = Some(data);
        self
    }

    pub fn output(mut self, data: Value) -> Self {
        self.output_data = Some(data);
        self
    }

    pub fn duration_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.outcome = Outcome::Error(message.into());
        self
    }
}
