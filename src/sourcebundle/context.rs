//! Per-call context threaded through builds and collaborator calls.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::trace::BuildTracer;

/// A cooperatively-checked cancellation flag shared between the caller, the
/// builder, and its collaborators.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    /// Requests cancellation. Collaborators are expected to notice promptly
    /// and return an error, after which the builder is poisoned.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for CancelFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelFlag").field(&self.is_cancelled()).finish()
    }
}

/// Carries the cross-cutting state for one builder call: an optional
/// [`BuildTracer`] for progress events and a [`CancelFlag`].
///
/// Tracer `*_start` hooks may return a replacement context which is then
/// used for the framed request and its paired end event, letting a tracer
/// carry per-operation state such as spans.
#[derive(Clone, Default)]
pub struct BuildContext {
    tracer: Option<Arc<dyn BuildTracer>>,
    cancel: CancelFlag,
}

impl BuildContext {
    pub fn new() -> BuildContext {
        BuildContext::default()
    }

    /// Returns a derived context carrying the given tracer. Each context
    /// has at most one tracer; an existing one is replaced.
    pub fn with_tracer(mut self, tracer: Arc<dyn BuildTracer>) -> BuildContext {
        self.tracer = Some(tracer);
        self
    }

    /// Returns a derived context carrying the given cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> BuildContext {
        self.cancel = cancel;
        self
    }

    pub fn tracer(&self) -> Option<&Arc<dyn BuildTracer>> {
        self.tracer.as_ref()
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("tracer", &self.tracer.as_ref().map(|_| "..."))
            .field("cancel", &self.cancel)
            .finish()
    }
}
