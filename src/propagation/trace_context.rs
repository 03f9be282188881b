use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

/// Opaque per-trace payload attached by propagation plugins.
///
/// Payloads are immutable once attached and travel with the context through
/// child spans and joins, in append order.
pub type Extra = Arc<dyn Any + Send + Sync>;

/// Error returned when an identifier tuple fails validation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextError {
    /// The trace id was zero.
    #[error("trace id is zero")]
    ZeroTraceId,
    /// The span id was zero.
    #[error("span id is zero")]
    ZeroSpanId,
}

/// The sampling decision and debug bit carried alongside (or instead of)
/// trace identifiers.
///
/// The decision is tri-state: yes, no, or not yet made. The debug bit forces
/// recording regardless of downstream sampling configuration and implies a
/// positive decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SamplingFlags {
    sampled: Option<bool>,
    debug: bool,
}

impl SamplingFlags {
    /// No decision has been made.
    pub const EMPTY: SamplingFlags = SamplingFlags {
        sampled: None,
        debug: false,
    };
    /// The trace is recorded.
    pub const SAMPLED: SamplingFlags = SamplingFlags {
        sampled: Some(true),
        debug: false,
    };
    /// The trace is not recorded.
    pub const NOT_SAMPLED: SamplingFlags = SamplingFlags {
        sampled: Some(false),
        debug: false,
    };
    /// The trace is recorded and flagged for collector-side retention.
    pub const DEBUG: SamplingFlags = SamplingFlags {
        sampled: Some(true),
        debug: true,
    };

    /// Build flags from an optional decision and a debug bit.
    pub fn new(sampled: Option<bool>, debug: bool) -> Self {
        if debug {
            SamplingFlags::DEBUG
        } else {
            SamplingFlags { sampled, debug }
        }
    }

    /// The sampling decision, if one has been made. Debug implies sampled.
    pub fn sampled(&self) -> Option<bool> {
        if self.debug {
            Some(true)
        } else {
            self.sampled
        }
    }

    /// True if the debug bit is set.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// True if neither a decision nor the debug bit is present.
    pub fn is_empty(&self) -> bool {
        self.sampled().is_none()
    }
}

/// Immutable identifier tuple linking a span to its trace, carried on the
/// wire and in-process.
///
/// Two contexts are equal when their identifiers and sampling/debug flags
/// match; the `shared` bit and `extra` payloads are excluded from equality.
#[derive(Clone)]
pub struct TraceContext {
    trace_id_high: u64,
    trace_id: u64,
    parent_id: Option<u64>,
    span_id: u64,
    sampled: Option<bool>,
    debug: bool,
    shared: bool,
    extra: Vec<Extra>,
}

impl TraceContext {
    /// Start building a context. [`Builder::trace_id`] and
    /// [`Builder::span_id`] are required and must be nonzero.
    pub fn builder() -> TraceContextBuilder {
        TraceContextBuilder::default()
    }

    /// A builder initialized with this context's fields.
    pub fn to_builder(&self) -> TraceContextBuilder {
        TraceContextBuilder {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            parent_id: self.parent_id,
            span_id: self.span_id,
            sampled: self.sampled,
            debug: self.debug,
            shared: self.shared,
            extra: self.extra.clone(),
        }
    }

    /// Upper 64 bits of the trace id, zero in 64-bit mode.
    pub fn trace_id_high(&self) -> u64 {
        self.trace_id_high
    }

    /// Lower 64 bits of the trace id, never zero.
    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    /// The parent span id, absent on a root span.
    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    /// The span id, never zero.
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// The sampling decision, if one has been made. Debug implies sampled.
    pub fn sampled(&self) -> Option<bool> {
        if self.debug {
            Some(true)
        } else {
            self.sampled
        }
    }

    /// True if this trace is flagged for collector-side retention.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// True if this span id was taken over from the caller's wire context,
    /// meaning two services report halves of the same span.
    pub fn shared(&self) -> bool {
        self.shared
    }

    /// Propagation payloads attached to this trace, in append order.
    pub fn extra(&self) -> &[Extra] {
        &self.extra
    }

    /// The trace id in fixed-width lowercase hex: 32 characters when the
    /// high half is set, 16 otherwise.
    pub fn trace_id_string(&self) -> String {
        if self.trace_id_high != 0 {
            format!("{:016x}{:016x}", self.trace_id_high, self.trace_id)
        } else {
            format!("{:016x}", self.trace_id)
        }
    }

    /// Key identifying this span in the in-flight registry.
    pub(crate) fn span_key(&self) -> (u64, u64, u64) {
        (self.trace_id_high, self.trace_id, self.span_id)
    }

    /// Append payloads after this context's own, preserving order.
    pub(crate) fn with_appended_extra(mut self, extra: Vec<Extra>) -> Self {
        self.extra.extend(extra);
        self
    }
}

impl PartialEq for TraceContext {
    fn eq(&self, other: &Self) -> bool {
        self.trace_id_high == other.trace_id_high
            && self.trace_id == other.trace_id
            && self.parent_id == other.parent_id
            && self.span_id == other.span_id
            && self.sampled() == other.sampled()
            && self.debug == other.debug
    }
}

impl Eq for TraceContext {}

impl Hash for TraceContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trace_id_high.hash(state);
        self.trace_id.hash(state);
        self.parent_id.hash(state);
        self.span_id.hash(state);
        self.sampled().hash(state);
        self.debug.hash(state);
    }
}

impl fmt::Display for TraceContext {
    /// Renders `traceId/spanId` in fixed-width lowercase hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trace_id_high != 0 {
            write!(f, "{:016x}", self.trace_id_high)?;
        }
        write!(f, "{:016x}/{:016x}", self.trace_id, self.span_id)
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("trace_id", &self.trace_id_string())
            .field("parent_id", &self.parent_id.map(|id| format!("{id:016x}")))
            .field("span_id", &format_args!("{:016x}", self.span_id))
            .field("sampled", &self.sampled())
            .field("debug", &self.debug)
            .field("shared", &self.shared)
            .field("extra", &self.extra.len())
            .finish()
    }
}

/// Builder for [`TraceContext`].
#[derive(Clone, Debug, Default)]
pub struct TraceContextBuilder {
    trace_id_high: u64,
    trace_id: u64,
    parent_id: Option<u64>,
    span_id: u64,
    sampled: Option<bool>,
    debug: bool,
    shared: bool,
    extra: Vec<Extra>,
}

impl TraceContextBuilder {
    /// Set the upper 64 bits of the trace id.
    pub fn trace_id_high(mut self, trace_id_high: u64) -> Self {
        self.trace_id_high = trace_id_high;
        self
    }

    /// Set the lower 64 bits of the trace id. Required, nonzero.
    pub fn trace_id(mut self, trace_id: u64) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Set the parent span id. Zero is treated as absent.
    pub fn parent_id(mut self, parent_id: Option<u64>) -> Self {
        self.parent_id = parent_id.filter(|id| *id != 0);
        self
    }

    /// Set the span id. Required, nonzero.
    pub fn span_id(mut self, span_id: u64) -> Self {
        self.span_id = span_id;
        self
    }

    /// Set or clear the sampling decision.
    pub fn sampled(mut self, sampled: Option<bool>) -> Self {
        self.sampled = sampled;
        self
    }

    /// Set the debug bit. Debug implies a positive sampling decision.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Mark the span id as shared with the caller.
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Replace the propagation payloads.
    pub fn extra(mut self, extra: Vec<Extra>) -> Self {
        self.extra = extra;
        self
    }

    /// Append one propagation payload.
    pub fn add_extra(mut self, extra: Extra) -> Self {
        self.extra.push(extra);
        self
    }

    /// Validate and build the context.
    pub fn build(self) -> Result<TraceContext, ContextError> {
        if self.trace_id == 0 {
            return Err(ContextError::ZeroTraceId);
        }
        if self.span_id == 0 {
            return Err(ContextError::ZeroSpanId);
        }
        let sampled = if self.debug { Some(true) } else { self.sampled };
        Ok(TraceContext {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            parent_id: self.parent_id,
            span_id: self.span_id,
            sampled,
            debug: self.debug,
            shared: self.shared,
            extra: self.extra,
        })
    }
}

/// Trace identifiers extracted from a carrier that named a trace but not a
/// span, as some wire formats allow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceIdContext {
    trace_id_high: u64,
    trace_id: u64,
    sampled: Option<bool>,
    debug: bool,
}

impl TraceIdContext {
    /// Start building a trace-id-only context.
    pub fn builder() -> TraceIdContextBuilder {
        TraceIdContextBuilder::default()
    }

    /// Upper 64 bits of the trace id, zero in 64-bit mode.
    pub fn trace_id_high(&self) -> u64 {
        self.trace_id_high
    }

    /// Lower 64 bits of the trace id, never zero.
    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    /// The sampling decision, if one has been made. Debug implies sampled.
    pub fn sampled(&self) -> Option<bool> {
        if self.debug {
            Some(true)
        } else {
            self.sampled
        }
    }

    /// True if this trace is flagged for collector-side retention.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Builder for [`TraceIdContext`].
#[derive(Clone, Debug, Default)]
pub struct TraceIdContextBuilder {
    trace_id_high: u64,
    trace_id: u64,
    sampled: Option<bool>,
    debug: bool,
}

impl TraceIdContextBuilder {
    /// Set the upper 64 bits of the trace id.
    pub fn trace_id_high(mut self, trace_id_high: u64) -> Self {
        self.trace_id_high = trace_id_high;
        self
    }

    /// Set the lower 64 bits of the trace id. Required, nonzero.
    pub fn trace_id(mut self, trace_id: u64) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Set or clear the sampling decision.
    pub fn sampled(mut self, sampled: Option<bool>) -> Self {
        self.sampled = sampled;
        self
    }

    /// Set the debug bit.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate and build the context.
    pub fn build(self) -> Result<TraceIdContext, ContextError> {
        if self.trace_id == 0 {
            return Err(ContextError::ZeroTraceId);
        }
        let sampled = if self.debug { Some(true) } else { self.sampled };
        Ok(TraceIdContext {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            sampled,
            debug: self.debug,
        })
    }
}
