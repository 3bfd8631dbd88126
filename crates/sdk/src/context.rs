//! Per-execution-context "current trace" and "current span" slots.
//!
//! Synchronous code reads a thread-local frame. Async code runs inside a
//! task-local scope entered by [`scope`], which shadows the thread-local frame
//! for as long as the scoped future is being polled.

use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentscope_core::model::TraceRecord;

/// Trace under construction, shared by every span of one call tree.
#[derive(Debug, Clone)]
pub(crate) struct TraceHandle(Arc<Mutex<TraceRecord>>);

impl TraceHandle {
    pub(crate) fn new(record: TraceRecord) -> Self {
        Self(Arc::new(Mutex::new(record)))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TraceRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub(crate) fn same_as(&self, other: &TraceHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    pub(crate) trace: Option<TraceHandle>,
    pub(crate) span: Option<String>,
}

thread_local! {
    static THREAD_FRAME: RefCell<Frame> = RefCell::new(Frame::default());
}

tokio::task_local! {
    static TASK_FRAME: RefCell<Frame>;
}

fn with_frame<R>(f: impl FnOnce(&mut Frame) -> R) -> R {
    if TASK_FRAME.try_with(|_| ()).is_ok() {
        TASK_FRAME.with(|cell| f(&mut cell.borrow_mut()))
    } else {
        THREAD_FRAME.with(|cell| f(&mut cell.borrow_mut()))
    }
}

pub(crate) fn snapshot() -> Frame {
    with_frame(|frame| frame.clone())
}

pub(crate) fn current_trace() -> Option<TraceHandle> {
    with_frame(|frame| frame.trace.clone())
}

pub(crate) fn set_current_trace(trace: Option<TraceHandle>) -> Option<TraceHandle> {
    with_frame(|frame| std::mem::replace(&mut frame.trace, trace))
}

/// Id of the innermost open span in this execution context.
pub fn current_span_id() -> Option<String> {
    with_frame(|frame| frame.span.clone())
}

/// Id of the trace open in this execution context.
pub fn current_trace_id() -> Option<String> {
    current_trace().map(|trace| trace.id())
}

pub(crate) fn set_current_span(span: Option<String>) -> Option<String> {
    with_frame(|frame| std::mem::replace(&mut frame.span, span))
}

/// Runs `fut` with its own copy of the caller's context.
///
/// Spans opened inside `fut` parent onto whatever is current here, but nothing
/// `fut` does to its slots leaks back to the caller or to sibling futures. Use it
/// around futures handed to `tokio::spawn` or `join!` that open traces themselves.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    let seed = snapshot();
    TASK_FRAME.scope(RefCell::new(seed), fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_slots_read_none() {
        std::thread::spawn(|| {
            assert!(current_trace().is_none());
            assert!(current_span_id().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn set_returns_previous_value() {
        std::thread::spawn(|| {
            assert_eq!(set_current_span(Some("a".into())), None);
            assert_eq!(set_current_span(Some("b".into())), Some("a".into()));
            assert_eq!(current_span_id().as_deref(), Some("b"));
            set_current_span(None);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn threads_do_not_share_slots() {
        set_current_span(Some("main".into()));
        std::thread::spawn(|| assert!(current_span_id().is_none()))
            .join()
            .unwrap();
        assert_eq!(current_span_id().as_deref(), Some("main"));
        set_current_span(None);
    }

    #[tokio::test]
    async fn scope_is_seeded_and_isolated() {
        set_current_span(Some("outer".into()));
        scope(async {
            assert_eq!(current_span_id().as_deref(), Some("outer"));
            set_current_span(Some("inner".into()));
            assert_eq!(current_span_id().as_deref(), Some("inner"));
        })
        .await;
        assert_eq!(current_span_id().as_deref(), Some("outer"));
        set_current_span(None);
    }
}
