//! Carrying trace state across process boundaries.
//!
//! Trace identifiers leave a process as headers on outbound requests and are
//! recovered from inbound ones. A [`Propagation`] implementation owns a set
//! of header names and knows how to write a [`TraceContext`] into any
//! carrier exposing [`Injector`], and how to read an [`ExtractedContext`]
//! back out of any carrier exposing [`Extractor`].
//!
//! Inside the process, the active context for each thread is tracked by a
//! [`CurrentTraceContext`], with scoped LIFO acquisition.

use std::collections::HashMap;

pub mod b3;
pub mod tracestate;

mod current;
mod extracted;
mod future_ext;
mod trace_context;

pub use b3::B3Propagation;
pub use current::{
    wrap, CurrentTraceContext, Scope, StrictCurrentTraceContext, ThreadLocalCurrentTraceContext,
};
pub use extracted::{ContextOrFlags, ExtractedContext};
pub use future_ext::{FutureScopeExt, WithContext};
pub use trace_context::{
    ContextError, Extra, SamplingFlags, TraceContext, TraceContextBuilder, TraceIdContext,
    TraceIdContextBuilder,
};

/// Interface for adding fields to an underlying carrier such as a `HashMap`
/// or an HTTP request's headers.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Interface for reading fields from an underlying carrier such as a
/// `HashMap` or an HTTP request's headers.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|value| value.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|key| key.as_str()).collect::<Vec<_>>()
    }
}

/// A header codec: writes contexts into carriers and reads them back.
///
/// Implementations decide what their wire format can express.
/// [`supports_join`](Propagation::supports_join) reports whether the format
/// carries the single-span-id convention, where a server takes over the
/// client's span id; formats without it force a fresh child span instead.
pub trait Propagation: Send + Sync + std::fmt::Debug {
    /// The header names this codec owns.
    fn keys(&self) -> &[&'static str];

    /// Write `context` into `injector`.
    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector);

    /// Read whatever trace state `extractor` holds. Malformed input yields
    /// an empty extraction, never an error.
    fn extract(&self, extractor: &dyn Extractor) -> ExtractedContext;

    /// True if the wire format can represent a shared span id.
    fn supports_join(&self) -> bool {
        true
    }

    /// True if this codec requires 128-bit trace ids.
    fn requires_128bit_trace_id(&self) -> bool {
        false
    }
}
