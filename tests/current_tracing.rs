//! Process-wide registration lifecycle. These cases observe and mutate the
//! shared current-instance slot, so they live in their own test binary and
//! run serially.

use serial_test::serial;
use std::fmt;
use std::sync::{Arc, Mutex};
use zipline::{ReportedSpan, Reporter, Tracing};

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

#[test]
#[serial]
fn current_is_the_most_recently_built_instance() {
    let first_spans = CollectingReporter::default();
    let second_spans = CollectingReporter::default();
    let first = Tracing::builder().with_reporter(first_spans.clone()).build();
    let second = Tracing::builder()
        .with_reporter(second_spans.clone())
        .build();

    let current = Tracing::current().expect("an instance was just built");
    current.tracer().new_trace().start().finish();

    assert!(first_spans.spans().is_empty());
    assert_eq!(second_spans.spans().len(), 1);

    first.close();
    second.close();
}

#[test]
#[serial]
fn closing_a_stale_instance_keeps_the_current_one() {
    let first_spans = CollectingReporter::default();
    let second_spans = CollectingReporter::default();
    let first = Tracing::builder().with_reporter(first_spans.clone()).build();
    let second = Tracing::builder()
        .with_reporter(second_spans.clone())
        .build();

    first.close();

    let current = Tracing::current().expect("the newer instance is still registered");
    current.tracer().new_trace().start().finish();
    assert_eq!(second_spans.spans().len(), 1);

    second.close();
    assert!(Tracing::current().is_none());
}

#[test]
#[serial]
fn close_is_idempotent() {
    let tracing = Tracing::builder().build();
    tracing.close();
    tracing.close();
    assert!(Tracing::current().is_none());
}

#[test]
#[serial]
fn closed_instances_keep_working_unregistered() {
    let spans = CollectingReporter::default();
    let tracing = Tracing::builder().with_reporter(spans.clone()).build();
    let tracer = tracing.tracer();
    tracing.close();

    tracer.new_trace().start().finish();
    assert_eq!(spans.spans().len(), 1);
}
