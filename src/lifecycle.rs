use crate::clock::{Clock, SystemClock};
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::propagation::{
    B3Propagation, CurrentTraceContext, Propagation, ThreadLocalCurrentTraceContext,
};
use crate::recorder::Recorder;
use crate::reporter::{Endpoint, FinishedSpanHandler, LoggingReporter, Reporter};
use crate::sampler::{Sampler, ShouldSample};
use crate::tracer::Tracer;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_SERVICE_NAME: &str = "unknown";

/// The most recently built instance that has not been closed.
static CURRENT_TRACING: Lazy<Mutex<Option<Tracing>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug)]
pub(crate) struct TracingInner {
    pub(crate) recorder: Arc<Recorder>,
    pub(crate) sampler: Arc<dyn ShouldSample>,
    pub(crate) id_generator: Arc<dyn IdGenerator>,
    pub(crate) propagation: Arc<dyn Propagation>,
    pub(crate) current_trace_context: Arc<dyn CurrentTraceContext>,
    pub(crate) trace_id_128bit: bool,
    pub(crate) supports_join: bool,
    pub(crate) noop: AtomicBool,
}

/// A configured tracing instance.
///
/// Building one registers it as the process-wide current instance, which
/// stays available through [`Tracing::current`] until [`close`] releases it.
/// Cloning shares the instance. Several instances may coexist, each with
/// its own reporter and in-flight registry; tests should always close what
/// they build so state does not leak between cases.
///
/// [`close`]: Tracing::close
#[derive(Clone, Debug)]
pub struct Tracing {
    inner: Arc<TracingInner>,
}

impl Tracing {
    /// Start configuring an instance.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The most recently built instance that has not been closed.
    pub fn current() -> Option<Tracing> {
        CURRENT_TRACING
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A tracer bound to this instance.
    pub fn tracer(&self) -> Tracer {
        Tracer::new(Arc::clone(&self.inner))
    }

    /// When true, every span-creating entry point yields a no-op span
    /// regardless of sampling. Spans already in flight are unaffected.
    pub fn set_noop(&self, noop: bool) {
        self.inner.noop.store(noop, Ordering::Relaxed);
    }

    /// True if spans are currently disabled via [`set_noop`](Self::set_noop).
    pub fn is_noop(&self) -> bool {
        self.inner.noop.load(Ordering::Relaxed)
    }

    /// The header codec in use.
    pub fn propagation(&self) -> Arc<dyn Propagation> {
        Arc::clone(&self.inner.propagation)
    }

    /// The per-thread scope tracker in use.
    pub fn current_trace_context(&self) -> Arc<dyn CurrentTraceContext> {
        Arc::clone(&self.inner.current_trace_context)
    }

    /// The timestamp source in use.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(self.inner.recorder.clock())
    }

    /// Release this instance's process-wide registration. Idempotent; other
    /// handles to the instance keep working, but [`Tracing::current`] no
    /// longer returns it.
    pub fn close(&self) {
        let mut current = CURRENT_TRACING
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let registered_here = current
            .as_ref()
            .is_some_and(|registered| Arc::ptr_eq(&registered.inner, &self.inner));
        if registered_here {
            *current = None;
        }
    }
}

/// Configures and builds a [`Tracing`] instance.
#[derive(Default)]
pub struct Builder {
    local_service_name: Option<String>,
    local_endpoint: Option<Endpoint>,
    reporter: Option<Arc<dyn Reporter>>,
    sampler: Option<Arc<dyn ShouldSample>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    propagation: Option<Arc<dyn Propagation>>,
    current_trace_context: Option<Arc<dyn CurrentTraceContext>>,
    trace_id_128bit: bool,
    supports_join: Option<bool>,
    finished_span_handlers: Vec<Arc<dyn FinishedSpanHandler>>,
}

impl Builder {
    /// Lowercase label of this service, used on every reported span's local
    /// endpoint. Defaults to `"unknown"`. Ignored when a full local endpoint
    /// is supplied.
    pub fn with_local_service_name(mut self, local_service_name: impl Into<String>) -> Self {
        self.local_service_name = Some(local_service_name.into());
        self
    }

    /// The endpoint stamped on every reported span, overriding the computed
    /// one.
    pub fn with_local_endpoint(mut self, local_endpoint: Endpoint) -> Self {
        self.local_endpoint = Some(local_endpoint);
        self
    }

    /// Sink for finished spans. Defaults to [`LoggingReporter`].
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Sampling policy for new traces. Defaults to [`Sampler::AlwaysOn`].
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Timestamp source. Defaults to [`SystemClock`].
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Identifier source. Defaults to [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Arc::new(id_generator));
        self
    }

    /// Header codec. Defaults to [`B3Propagation`].
    pub fn with_propagation<P: Propagation + 'static>(mut self, propagation: P) -> Self {
        self.propagation = Some(Arc::new(propagation));
        self
    }

    /// Per-thread scope tracker. Defaults to
    /// [`ThreadLocalCurrentTraceContext`].
    pub fn with_current_trace_context<C: CurrentTraceContext + 'static>(
        mut self,
        current_trace_context: C,
    ) -> Self {
        self.current_trace_context = Some(Arc::new(current_trace_context));
        self
    }

    /// Generate 128-bit trace ids for new traces.
    pub fn with_trace_id_128bit(mut self, trace_id_128bit: bool) -> Self {
        self.trace_id_128bit = trace_id_128bit;
        self
    }

    /// Override whether joins may share a span id. `false` turns every join
    /// into a child span. Defaults to what the propagation reports.
    pub fn with_supports_join(mut self, supports_join: bool) -> Self {
        self.supports_join = Some(supports_join);
        self
    }

    /// Append an interceptor applied to each finished span before the
    /// reporter.
    pub fn with_finished_span_handler<H: FinishedSpanHandler + 'static>(
        mut self,
        handler: H,
    ) -> Self {
        self.finished_span_handlers.push(Arc::new(handler));
        self
    }

    /// Build and register the instance as the process-wide current one.
    pub fn build(self) -> Tracing {
        let propagation = self
            .propagation
            .unwrap_or_else(|| Arc::new(B3Propagation::new()));
        let local_endpoint = self.local_endpoint.unwrap_or_else(|| {
            Endpoint::builder()
                .service_name(
                    self.local_service_name
                        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
                )
                .build()
        });
        let recorder = Recorder::new(
            self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            local_endpoint,
            self.reporter
                .unwrap_or_else(|| Arc::new(LoggingReporter::new())),
            self.finished_span_handlers,
        );
        let inner = Arc::new(TracingInner {
            recorder: Arc::new(recorder),
            sampler: self.sampler.unwrap_or_else(|| Arc::new(Sampler::AlwaysOn)),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(RandomIdGenerator::new())),
            supports_join: self
                .supports_join
                .unwrap_or_else(|| propagation.supports_join()),
            trace_id_128bit: self.trace_id_128bit || propagation.requires_128bit_trace_id(),
            propagation,
            current_trace_context: self
                .current_trace_context
                .unwrap_or_else(|| Arc::new(ThreadLocalCurrentTraceContext::new())),
            noop: AtomicBool::new(false),
        });

        let tracing = Tracing { inner };
        *CURRENT_TRACING
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tracing.clone());
        tracing
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("local_service_name", &self.local_service_name)
            .field("trace_id_128bit", &self.trace_id_128bit)
            .field("supports_join", &self.supports_join)
            .finish_non_exhaustive()
    }
}
