//! Zipline records causally-linked timed operations (spans) inside a process
//! and forwards finished spans to a [`Reporter`], typically one that sends
//! them on to a trace collector.
//!
//! The entry point is [`Tracing`], which owns the configuration (sampling,
//! clock, propagation, reporting) and hands out [`Tracer`]s:
//!
//! ```
//! use zipline::{Tracing, SpanKind};
//!
//! let tracing = Tracing::builder()
//!     .with_local_service_name("frontend")
//!     .build();
//! let tracer = tracing.tracer();
//!
//! let span = tracer.new_trace();
//! span.name("get /api").kind(SpanKind::Server).start();
//! // ... handle the request ...
//! span.finish();
//!
//! tracing.close();
//! ```
//!
//! ## Sampling
//!
//! Whether a trace is recorded is decided once, at the root, and the decision
//! sticks for every span of that trace. Unsampled work still produces a
//! [`Span`] carrying valid identifiers so that instrumentation can propagate
//! them downstream, but all of its recording methods are no-ops.
//!
//! ## Scopes
//!
//! The span a thread is currently working within is tracked per-thread.
//! [`Tracer::with_span_in_scope`] installs a span as current and returns a
//! guard that restores the previous one when dropped; scopes nest LIFO.
//! Hand-offs to other tasks are explicit, via
//! [`propagation::FutureScopeExt`] or [`propagation::wrap`].
//!
//! ## Propagation
//!
//! Trace identifiers cross process boundaries as headers. The
//! [`propagation`] module defines the carrier-agnostic codec interface, the
//! default B3 multi-header codec, and a W3C `tracestate` reader/writer for
//! interoperating with other tracing systems.

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

pub mod propagation;

mod clock;
mod id_generator;
mod lifecycle;
mod recorder;
mod reporter;
mod sampler;
mod span;
mod tracer;

pub use clock::{Clock, SystemClock};
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use lifecycle::{Builder, Tracing};
pub use reporter::{
    Annotation, Endpoint, EndpointBuilder, FinishedSpanHandler, LoggingReporter, NoopReporter,
    ReportedSpan, Reporter,
};
pub use sampler::{Sampler, ShouldSample};
pub use span::{Span, SpanKind};
pub use tracer::{SpanInScope, Tracer};
