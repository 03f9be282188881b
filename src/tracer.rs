use crate::lifecycle::TracingInner;
use crate::propagation::{
    ContextOrFlags, Extra, ExtractedContext, SamplingFlags, Scope, TraceContext,
};
use crate::sampler::ShouldSample;
use crate::span::Span;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const NONZERO_IDS: &str = "trace and span ids are nonzero";

/// Creates and manages spans.
///
/// Every entry point returns a usable [`Span`]; when work is unsampled or
/// tracing is disabled the span is a no-op that still carries valid
/// identifiers. No operation here errors or panics on any input.
#[derive(Clone)]
pub struct Tracer {
    sampler: Arc<dyn ShouldSample>,
    inner: Arc<TracingInner>,
}

impl Tracer {
    pub(crate) fn new(inner: Arc<TracingInner>) -> Self {
        Tracer {
            sampler: inner.sampler.clone(),
            inner,
        }
    }

    /// A tracer sharing this one's state but sampling new traces with
    /// `sampler`. Useful to tune the sample rate of one call site.
    pub fn with_sampler<S: ShouldSample + 'static>(&self, sampler: S) -> Tracer {
        Tracer {
            sampler: Arc::new(sampler),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Start a new root span, consulting the sampler for the decision.
    pub fn new_trace(&self) -> Span {
        self.new_root(SamplingFlags::EMPTY, Vec::new())
    }

    /// Start a new root span honoring an explicit sampling decision. With
    /// [`SamplingFlags::EMPTY`] this behaves like [`new_trace`](Self::new_trace).
    pub fn new_trace_with_flags(&self, flags: SamplingFlags) -> Span {
        self.new_root(flags, Vec::new())
    }

    /// Continue an ongoing trace by sharing the caller's span id, so that
    /// both sides report halves of one span.
    ///
    /// When the configuration cannot represent a shared span id this falls
    /// back to [`new_child`](Self::new_child). An undecided sampling
    /// decision is resolved here and stamped on the returned context.
    pub fn join_span(&self, context: &TraceContext) -> Span {
        if !self.inner.supports_join {
            return self.new_child(context);
        }
        let sampled = context
            .sampled()
            .unwrap_or_else(|| self.sampler.is_sampled(context.trace_id()));
        let joined = context
            .to_builder()
            .sampled(Some(sampled))
            .shared(true)
            .build()
            .expect(NONZERO_IDS);
        self.materialize(joined)
    }

    /// Start a span under `parent`, with a fresh span id.
    ///
    /// The child shares the parent's trace id, debug bit, and propagation
    /// payloads; an undecided parent decision is resolved here.
    pub fn new_child(&self, parent: &TraceContext) -> Span {
        self.new_child_with(parent, SamplingFlags::EMPTY, Vec::new())
    }

    /// Start the next span for extracted inbound trace state, against the
    /// calling thread's current span.
    ///
    /// A full extracted context is joined (or degraded to a child when joins
    /// are unsupported). A trace id alone starts a new span in that trace.
    /// Bare flags make a child of the current span when one is in scope,
    /// overlaying the extracted decision, and a new trace otherwise.
    /// Extracted propagation payloads are appended after the current
    /// context's own, preserving order.
    pub fn next_span_with(&self, extracted: ExtractedContext) -> Span {
        let (variant, extra) = extracted.into_parts();
        match variant {
            ContextOrFlags::Context(context) => {
                let context = context.with_appended_extra(extra);
                self.join_span(&context)
            }
            ContextOrFlags::TraceId(trace_id_context) => {
                let sampled = trace_id_context
                    .sampled()
                    .unwrap_or_else(|| self.sampler.is_sampled(trace_id_context.trace_id()));
                let context = TraceContext::builder()
                    .trace_id_high(trace_id_context.trace_id_high())
                    .trace_id(trace_id_context.trace_id())
                    .span_id(self.next_span_id())
                    .sampled(Some(sampled))
                    .debug(trace_id_context.debug())
                    .extra(extra)
                    .build()
                    .expect(NONZERO_IDS);
                self.materialize(context)
            }
            ContextOrFlags::Flags(flags) => {
                match self.inner.current_trace_context.current() {
                    Some(parent) => self.new_child_with(&parent, flags, extra),
                    None => self.new_root(flags, extra),
                }
            }
        }
    }

    /// Start the next span with nothing extracted: a child of the current
    /// span when one is in scope, a new trace otherwise.
    pub fn next_span(&self) -> Span {
        self.next_span_with(ExtractedContext::empty())
    }

    /// Lift a context into a [`Span`] without changing any identifiers.
    ///
    /// Repeated calls with the same context converge on the same in-flight
    /// record.
    pub fn to_span(&self, context: TraceContext) -> Span {
        self.materialize(context)
    }

    /// Install `span`'s context (or clear the current one, given `None`) as
    /// current on the calling thread until the returned guard drops.
    pub fn with_span_in_scope(&self, span: Option<&Span>) -> SpanInScope {
        SpanInScope {
            _scope: self
                .inner
                .current_trace_context
                .new_scope(span.map(Span::context)),
        }
    }

    /// The span current on the calling thread, if any.
    pub fn current_span(&self) -> Option<Span> {
        self.inner
            .current_trace_context
            .current()
            .map(|context| self.to_span(context))
    }

    fn new_root(&self, flags: SamplingFlags, extra: Vec<Extra>) -> Span {
        let trace_id_high = if self.inner.trace_id_128bit {
            self.next_trace_id()
        } else {
            0
        };
        let trace_id = self.next_trace_id();
        let sampled = flags
            .sampled()
            .unwrap_or_else(|| self.sampler.is_sampled(trace_id));
        let context = TraceContext::builder()
            .trace_id_high(trace_id_high)
            .trace_id(trace_id)
            .span_id(self.next_span_id())
            .sampled(Some(sampled))
            .debug(flags.is_debug())
            .extra(extra)
            .build()
            .expect(NONZERO_IDS);
        self.materialize(context)
    }

    fn new_child_with(
        &self,
        parent: &TraceContext,
        flags: SamplingFlags,
        extracted_extra: Vec<Extra>,
    ) -> Span {
        let sampled = flags
            .sampled()
            .or_else(|| parent.sampled())
            .unwrap_or_else(|| self.sampler.is_sampled(parent.trace_id()));
        let mut extra = parent.extra().to_vec();
        extra.extend(extracted_extra);
        let context = TraceContext::builder()
            .trace_id_high(parent.trace_id_high())
            .trace_id(parent.trace_id())
            .parent_id(Some(parent.span_id()))
            .span_id(self.next_span_id())
            .sampled(Some(sampled))
            .debug(parent.debug() || flags.is_debug())
            .extra(extra)
            .build()
            .expect(NONZERO_IDS);
        self.materialize(context)
    }

    fn materialize(&self, context: TraceContext) -> Span {
        if self.inner.noop.load(Ordering::Relaxed) || context.sampled() == Some(false) {
            Span::noop(context)
        } else {
            Span::real(context, Arc::clone(&self.inner.recorder))
        }
    }

    fn next_trace_id(&self) -> u64 {
        loop {
            let id = self.inner.id_generator.next_trace_id();
            if id != 0 {
                return id;
            }
        }
    }

    fn next_span_id(&self) -> u64 {
        loop {
            let id = self.inner.id_generator.next_span_id();
            if id != 0 {
                return id;
            }
        }
    }
}

impl fmt::Display for Tracer {
    /// Diagnostic rendering: the current span's identifiers when one is in
    /// scope, otherwise any in-flight spans as one-line JSON, the noop flag
    /// when set, and always the reporter.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tracer{")?;
        if let Some(context) = self.inner.current_trace_context.current() {
            write!(f, "currentSpan={context}, ")?;
        }
        let in_flight = self.inner.recorder.snapshot();
        if !in_flight.is_empty() {
            let json = serde_json::to_string(&in_flight).map_err(|_| fmt::Error)?;
            write!(f, "inFlight={json}, ")?;
        }
        if self.inner.noop.load(Ordering::Relaxed) {
            f.write_str("noop=true, ")?;
        }
        write!(f, "reporter={}}}", self.inner.recorder.reporter())
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("sampler", &self.sampler)
            .field("noop", &self.inner.noop.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Guard holding a span in scope; dropping it restores the previous scope.
#[derive(Debug)]
pub struct SpanInScope {
    _scope: Scope,
}
