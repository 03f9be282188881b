use crate::clock::Clock;
use crate::propagation::TraceContext;
use crate::reporter::{Annotation, Endpoint, FinishedSpanHandler, ReportedSpan, Reporter};
use crate::span::SpanKind;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// Accumulates what a span records between start and finish.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MutableSpan {
    pub(crate) name: Option<String>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) start_timestamp: Option<u64>,
    pub(crate) finish_timestamp: Option<u64>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) tags: BTreeMap<String, String>,
    pub(crate) remote_endpoint: Option<Endpoint>,
    pub(crate) error: Option<String>,
}

#[derive(Debug)]
struct InFlight {
    context: TraceContext,
    state: Mutex<MutableSpan>,
}

impl InFlight {
    fn with_state<T>(&self, f: impl FnOnce(&mut MutableSpan) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

/// Registry of spans that have started recording but not yet finished,
/// keyed by (trace id high, trace id, span id).
#[derive(Debug, Default)]
struct SpanMap {
    spans: DashMap<(u64, u64, u64), Arc<InFlight>>,
}

impl SpanMap {
    /// At most one record exists per key; concurrent callers see the same
    /// record.
    fn get_or_create(&self, context: &TraceContext) -> Arc<InFlight> {
        self.spans
            .entry(context.span_key())
            .or_insert_with(|| {
                Arc::new(InFlight {
                    context: context.clone(),
                    state: Mutex::new(MutableSpan::default()),
                })
            })
            .clone()
    }

    /// Atomic removal; a second call for the same key returns `None`.
    fn remove(&self, context: &TraceContext) -> Option<Arc<InFlight>> {
        self.spans
            .remove(&context.span_key())
            .map(|(_, entry)| entry)
    }

    fn snapshot(&self) -> Vec<Arc<InFlight>> {
        self.spans.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Routes span mutations into the in-flight registry and finished spans to
/// the reporter.
#[derive(Debug)]
pub(crate) struct Recorder {
    span_map: SpanMap,
    clock: Arc<dyn Clock>,
    local_endpoint: Endpoint,
    reporter: Arc<dyn Reporter>,
    finished_span_handlers: Vec<Arc<dyn FinishedSpanHandler>>,
}

impl Recorder {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        local_endpoint: Endpoint,
        reporter: Arc<dyn Reporter>,
        finished_span_handlers: Vec<Arc<dyn FinishedSpanHandler>>,
    ) -> Self {
        Recorder {
            span_map: SpanMap::default(),
            clock,
            local_endpoint,
            reporter,
            finished_span_handlers,
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    pub(crate) fn start(&self, context: &TraceContext, timestamp: Option<u64>) {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now_micros());
        self.span_map
            .get_or_create(context)
            .with_state(|state| state.start_timestamp = Some(timestamp));
    }

    pub(crate) fn name(&self, context: &TraceContext, name: &str) {
        let name = name.to_string();
        self.span_map
            .get_or_create(context)
            .with_state(|state| state.name = Some(name));
    }

    pub(crate) fn kind(&self, context: &TraceContext, kind: SpanKind) {
        self.span_map
            .get_or_create(context)
            .with_state(|state| state.kind = Some(kind));
    }

    pub(crate) fn annotate(&self, context: &TraceContext, timestamp: Option<u64>, value: &str) {
        let annotation = Annotation {
            timestamp: timestamp.unwrap_or_else(|| self.clock.now_micros()),
            value: value.to_string(),
        };
        self.span_map
            .get_or_create(context)
            .with_state(|state| state.annotations.push(annotation));
    }

    pub(crate) fn tag(&self, context: &TraceContext, key: &str, value: &str) {
        let (key, value) = (key.to_string(), value.to_string());
        self.span_map
            .get_or_create(context)
            .with_state(|state| {
                state.tags.insert(key, value);
            });
    }

    pub(crate) fn remote_endpoint(&self, context: &TraceContext, endpoint: Endpoint) {
        self.span_map
            .get_or_create(context)
            .with_state(|state| state.remote_endpoint = Some(endpoint));
    }

    pub(crate) fn error(&self, context: &TraceContext, message: &str) {
        let message = message.to_string();
        self.span_map
            .get_or_create(context)
            .with_state(|state| state.error = Some(message));
    }

    /// Removes the in-flight record and reports it. The second finish of a
    /// span is a no-op.
    pub(crate) fn finish(&self, context: &TraceContext, finish_timestamp: Option<u64>) {
        let Some(entry) = self.span_map.remove(context) else {
            return;
        };
        let finish_timestamp = finish_timestamp.unwrap_or_else(|| self.clock.now_micros());
        let span = entry.with_state(|state| {
            state.finish_timestamp = Some(finish_timestamp);
            self.to_reported(context, state)
        });
        self.report(context, span);
    }

    /// Reports whatever has accumulated, without a finish timestamp.
    pub(crate) fn flush(&self, context: &TraceContext) {
        let Some(entry) = self.span_map.remove(context) else {
            return;
        };
        let span = entry.with_state(|state| self.to_reported(context, state));
        self.report(context, span);
    }

    /// Drops the in-flight record unreported.
    pub(crate) fn abandon(&self, context: &TraceContext) {
        self.span_map.remove(context);
    }

    /// In-flight spans converted to their reportable shape, for diagnostics.
    pub(crate) fn snapshot(&self) -> Vec<ReportedSpan> {
        self.span_map
            .snapshot()
            .iter()
            .map(|entry| entry.with_state(|state| self.to_reported(&entry.context, state)))
            .collect()
    }

    fn to_reported(&self, context: &TraceContext, state: &MutableSpan) -> ReportedSpan {
        let mut tags = state.tags.clone();
        if let Some(error) = &state.error {
            tags.insert("error".to_string(), error.clone());
        }
        let duration = match (state.start_timestamp, state.finish_timestamp) {
            (Some(start), Some(finish)) => {
                let elapsed = finish.saturating_sub(start);
                (elapsed > 0).then_some(elapsed)
            }
            _ => None,
        };
        ReportedSpan {
            trace_id: context.trace_id_string(),
            parent_id: context.parent_id().map(|id| format!("{id:016x}")),
            id: format!("{:016x}", context.span_id()),
            kind: state.kind,
            name: state.name.clone(),
            timestamp: state.start_timestamp,
            duration,
            local_endpoint: Some(self.local_endpoint.clone()),
            remote_endpoint: state.remote_endpoint.clone(),
            annotations: state.annotations.clone(),
            tags,
            debug: context.debug().then_some(true),
            shared: context.shared().then_some(true),
        }
    }

    // Handlers and the reporter run after the record has left the map, so
    // neither can deadlock against concurrent span mutations.
    fn report(&self, context: &TraceContext, mut span: ReportedSpan) {
        for handler in &self.finished_span_handlers {
            if !handler.handle(context, &mut span) {
                return;
            }
        }
        if catch_unwind(AssertUnwindSafe(|| self.reporter.report(span))).is_err() {
            tracing::warn!(reporter = %self.reporter, "span reporter panicked; span dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::fmt;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Default)]
    struct CollectingReporter(Arc<Mutex<Vec<ReportedSpan>>>);

    impl CollectingReporter {
        fn spans(&self) -> Vec<ReportedSpan> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Reporter for CollectingReporter {
        fn report(&self, span: ReportedSpan) {
            self.0.lock().unwrap().push(span);
        }
    }

    impl fmt::Display for CollectingReporter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("CollectingReporter{}")
        }
    }

    #[derive(Debug)]
    struct PanickingReporter;

    impl Reporter for PanickingReporter {
        fn report(&self, _span: ReportedSpan) {
            panic!("reporter blew up");
        }
    }

    impl fmt::Display for PanickingReporter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("PanickingReporter{}")
        }
    }

    fn recorder_with(reporter: Arc<dyn Reporter>) -> Recorder {
        Recorder::new(
            Arc::new(SystemClock::new()),
            Endpoint::builder().service_name("my-service").build(),
            reporter,
            Vec::new(),
        )
    }

    fn context(span_id: u64) -> TraceContext {
        TraceContext::builder()
            .trace_id(1)
            .span_id(span_id)
            .sampled(Some(true))
            .build()
            .unwrap()
    }

    #[test]
    fn finish_reports_once() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        recorder.start(&context, Some(1));
        recorder.finish(&context, Some(3));
        recorder.finish(&context, Some(5));

        let reported = spans.spans();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].timestamp, Some(1));
        assert_eq!(reported[0].duration, Some(2));
    }

    #[test]
    fn conversion_is_total_with_defaults() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        // never started, only tagged
        recorder.tag(&context, "peer", "backend");
        recorder.finish(&context, Some(9));

        let reported = spans.spans();
        assert_eq!(reported[0].trace_id, "0000000000000001");
        assert_eq!(reported[0].id, "000000000000000a");
        assert_eq!(reported[0].timestamp, None);
        assert_eq!(reported[0].duration, None);
        assert_eq!(
            reported[0].local_endpoint.as_ref().unwrap().service_name,
            Some("my-service".to_string())
        );
        assert_eq!(reported[0].tags.get("peer"), Some(&"backend".to_string()));
    }

    #[test]
    fn error_becomes_tag() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        recorder.start(&context, Some(1));
        recorder.error(&context, "boom");
        recorder.finish(&context, Some(2));

        let reported = spans.spans();
        assert_eq!(reported[0].tags.get("error"), Some(&"boom".to_string()));
    }

    #[test]
    fn tags_are_last_write_wins() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        recorder.tag(&context, "clnt/http.status", "500");
        recorder.tag(&context, "clnt/http.status", "503");
        recorder.finish(&context, Some(2));

        let reported = spans.spans();
        assert_eq!(
            reported[0].tags.get("clnt/http.status"),
            Some(&"503".to_string())
        );
    }

    #[test]
    fn flush_reports_without_duration() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        recorder.start(&context, Some(1));
        recorder.flush(&context);

        let reported = spans.spans();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].timestamp, Some(1));
        assert_eq!(reported[0].duration, None);
    }

    #[test]
    fn abandon_reports_nothing() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        recorder.start(&context, Some(1));
        recorder.abandon(&context);
        recorder.finish(&context, Some(2));

        assert!(spans.spans().is_empty());
    }

    #[test]
    fn snapshot_sees_in_flight_only() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        assert!(recorder.snapshot().is_empty());
        recorder.start(&context, Some(1));
        assert_eq!(recorder.snapshot().len(), 1);
        recorder.finish(&context, Some(2));
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn zero_duration_is_omitted() {
        let spans = CollectingReporter::default();
        let recorder = recorder_with(Arc::new(spans.clone()));
        let context = context(10);

        recorder.start(&context, Some(5));
        recorder.finish(&context, Some(5));

        let reported = spans.spans();
        assert_eq!(reported[0].duration, None);
    }

    #[test]
    fn reporter_panic_is_swallowed() {
        let recorder = recorder_with(Arc::new(PanickingReporter));
        let context = context(10);

        recorder.start(&context, Some(1));
        recorder.finish(&context, Some(2)); // must not unwind
    }

    #[derive(Debug)]
    struct RenameHandler;

    impl FinishedSpanHandler for RenameHandler {
        fn handle(&self, _context: &TraceContext, span: &mut ReportedSpan) -> bool {
            span.name = Some("renamed".to_string());
            true
        }
    }

    #[derive(Debug)]
    struct DropAllHandler;

    impl FinishedSpanHandler for DropAllHandler {
        fn handle(&self, _context: &TraceContext, _span: &mut ReportedSpan) -> bool {
            false
        }
    }

    #[test]
    fn handlers_run_in_order_before_reporter() {
        let spans = CollectingReporter::default();
        let recorder = Recorder::new(
            Arc::new(SystemClock::new()),
            Endpoint::default(),
            Arc::new(spans.clone()),
            vec![Arc::new(RenameHandler)],
        );
        let context = context(10);
        recorder.name(&context, "original");
        recorder.finish(&context, None);

        let reported = spans.spans();
        assert_eq!(reported[0].name, Some("renamed".to_string()));
    }

    #[test]
    fn handler_returning_false_drops_span() {
        let spans = CollectingReporter::default();
        let recorder = Recorder::new(
            Arc::new(SystemClock::new()),
            Endpoint::default(),
            Arc::new(spans.clone()),
            vec![Arc::new(DropAllHandler)],
        );
        let context = context(10);
        recorder.start(&context, None);
        recorder.finish(&context, None);

        assert!(spans.spans().is_empty());
    }

    #[test]
    fn concurrent_mutations_share_one_record() {
        let spans = CollectingReporter::default();
        let recorder = Arc::new(recorder_with(Arc::new(spans.clone())));
        let context = context(10);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let recorder = Arc::clone(&recorder);
                let context = context.clone();
                std::thread::spawn(move || {
                    for step in 0..50 {
                        recorder.annotate(&context, Some(step), &format!("w{worker}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        recorder.finish(&context, None);

        let reported = spans.spans();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].annotations.len(), 8 * 50);
    }
}
