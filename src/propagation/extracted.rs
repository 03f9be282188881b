use crate::propagation::{Extra, SamplingFlags, TraceContext, TraceIdContext};

/// What a carrier held: a full context, a trace id without a span id, or
/// bare sampling flags.
#[derive(Clone, Debug)]
pub enum ContextOrFlags {
    /// Both trace and span ids were present.
    Context(TraceContext),
    /// Only trace identifiers were present; a span id must be minted.
    TraceId(TraceIdContext),
    /// No identifiers, possibly a sampling decision or debug bit.
    Flags(SamplingFlags),
}

/// The result of extracting trace state from an inbound carrier.
///
/// Extraction can surface anywhere between a complete identifier tuple and
/// nothing at all, so the payload is a three-way sum. Propagation payloads
/// ride alongside independently: plugins can attach data even when the
/// carrier held no usable identifiers.
#[derive(Clone, Debug)]
pub struct ExtractedContext {
    inner: ContextOrFlags,
    extra: Vec<Extra>,
}

impl ExtractedContext {
    /// Nothing was extracted: no identifiers, no decision.
    pub fn empty() -> Self {
        ExtractedContext::from_flags(SamplingFlags::EMPTY)
    }

    /// The carrier held a complete identifier tuple.
    pub fn from_context(context: TraceContext) -> Self {
        ExtractedContext {
            inner: ContextOrFlags::Context(context),
            extra: Vec::new(),
        }
    }

    /// The carrier held a trace id but no span id.
    pub fn from_trace_id(context: TraceIdContext) -> Self {
        ExtractedContext {
            inner: ContextOrFlags::TraceId(context),
            extra: Vec::new(),
        }
    }

    /// The carrier held at most a sampling decision.
    pub fn from_flags(flags: SamplingFlags) -> Self {
        ExtractedContext {
            inner: ContextOrFlags::Flags(flags),
            extra: Vec::new(),
        }
    }

    /// Append a propagation payload, preserving append order.
    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra.push(extra);
        self
    }

    /// The extracted identifiers or flags.
    pub fn context_or_flags(&self) -> &ContextOrFlags {
        &self.inner
    }

    /// Payloads attached during extraction, in append order.
    pub fn extra(&self) -> &[Extra] {
        &self.extra
    }

    pub(crate) fn into_parts(self) -> (ContextOrFlags, Vec<Extra>) {
        (self.inner, self.extra)
    }
}

impl Default for ExtractedContext {
    fn default() -> Self {
        ExtractedContext::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_has_no_decision() {
        let extracted = ExtractedContext::empty();
        match extracted.context_or_flags() {
            ContextOrFlags::Flags(flags) => assert!(flags.is_empty()),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(extracted.extra().is_empty());
    }

    #[test]
    fn extra_survives_without_identifiers() {
        let extracted = ExtractedContext::empty()
            .with_extra(Arc::new("payload") as Extra)
            .with_extra(Arc::new(2i64) as Extra);
        assert_eq!(extracted.extra().len(), 2);
        assert_eq!(
            extracted.extra()[0].downcast_ref::<&str>(),
            Some(&"payload")
        );
    }
}
