use crate::propagation::TraceContext;
use crate::recorder::Recorder;
use crate::reporter::Endpoint;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The role a span played in a remote exchange. Absent kind means local
/// (in-process) work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    /// Initiator of an RPC: timestamps cover the request until the response.
    Client,
    /// Handler of an RPC: often shares its span id with the client.
    Server,
    /// Sender of a one-way message.
    Producer,
    /// Receiver of a one-way message.
    Consumer,
}

/// A timed operation within a trace.
///
/// Spans come in two shapes sharing one type: recording spans write through
/// to the in-flight registry, while unsampled or disabled work yields a
/// no-op span whose mutators do nothing. Both carry a full [`TraceContext`]
/// so instrumentation can always read and propagate identifiers.
///
/// Recording methods take `&self` and may be called from any thread;
/// mutations to one span from several threads are applied in whatever order
/// the caller's own synchronization arranges.
#[derive(Clone)]
pub struct Span {
    context: TraceContext,
    inner: SpanInner,
}

#[derive(Clone)]
enum SpanInner {
    Real { recorder: Arc<Recorder> },
    Noop,
}

impl Span {
    pub(crate) fn real(context: TraceContext, recorder: Arc<Recorder>) -> Self {
        Span {
            context,
            inner: SpanInner::Real { recorder },
        }
    }

    pub(crate) fn noop(context: TraceContext) -> Self {
        Span {
            context,
            inner: SpanInner::Noop,
        }
    }

    /// The identifiers this span carries. Valid even on a no-op span.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// True if this span records nothing.
    pub fn is_noop(&self) -> bool {
        matches!(self.inner, SpanInner::Noop)
    }

    fn recorder(&self) -> Option<&Arc<Recorder>> {
        match &self.inner {
            SpanInner::Real { recorder } => Some(recorder),
            SpanInner::Noop => None,
        }
    }

    /// Record the start of the operation at the current time.
    pub fn start(&self) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.start(&self.context, None);
        }
        self
    }

    /// Record the start of the operation at the given epoch microseconds.
    pub fn start_with_timestamp(&self, timestamp: u64) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.start(&self.context, Some(timestamp));
        }
        self
    }

    /// Set the operation name.
    pub fn name(&self, name: &str) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.name(&self.context, name);
        }
        self
    }

    /// Set the span kind.
    pub fn kind(&self, kind: SpanKind) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.kind(&self.context, kind);
        }
        self
    }

    /// Record an event at the current time.
    pub fn annotate(&self, value: &str) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.annotate(&self.context, None, value);
        }
        self
    }

    /// Record an event at the given epoch microseconds.
    pub fn annotate_at(&self, timestamp: u64, value: &str) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.annotate(&self.context, Some(timestamp), value);
        }
        self
    }

    /// Attach key-value metadata. A later write to the same key replaces the
    /// earlier value.
    pub fn tag(&self, key: &str, value: &str) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.tag(&self.context, key, value);
        }
        self
    }

    /// Name the other side of the exchange.
    pub fn remote_endpoint(&self, endpoint: Endpoint) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.remote_endpoint(&self.context, endpoint);
        }
        self
    }

    /// Record that the operation failed.
    pub fn error(&self, message: &str) -> &Self {
        if let Some(recorder) = self.recorder() {
            recorder.error(&self.context, message);
        }
        self
    }

    /// Complete the span at the current time and report it. Finishing twice
    /// reports once.
    pub fn finish(&self) {
        if let Some(recorder) = self.recorder() {
            recorder.finish(&self.context, None);
        }
    }

    /// Complete the span at the given epoch microseconds and report it.
    pub fn finish_with_timestamp(&self, timestamp: u64) {
        if let Some(recorder) = self.recorder() {
            recorder.finish(&self.context, Some(timestamp));
        }
    }

    /// Report whatever has been recorded so far without marking the
    /// operation complete. Useful for one-shot spans whose end is unknowable.
    pub fn flush(&self) {
        if let Some(recorder) = self.recorder() {
            recorder.flush(&self.context);
        }
    }

    /// Throw away everything recorded so far; nothing is reported.
    pub fn abandon(&self) {
        if let Some(recorder) = self.recorder() {
            recorder.abandon(&self.context);
        }
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context && self.is_noop() == other.is_noop()
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(if self.is_noop() { "NoopSpan" } else { "RealSpan" })
            .field("context", &self.context)
            .finish()
    }
}
