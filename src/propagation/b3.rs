//! B3 multi-header codec.
//!
//! Identifiers travel in the `X-B3-TraceId`, `X-B3-SpanId`,
//! `X-B3-ParentSpanId`, `X-B3-Sampled` and `X-B3-Flags` headers. The format
//! carries the single-span-id convention: a server handling a request may
//! take over the caller's span id, so [`supports_join`] is true.
//!
//! [`supports_join`]: crate::propagation::Propagation::supports_join

use crate::propagation::{
    Extractor, ExtractedContext, Injector, Propagation, SamplingFlags, TraceContext,
    TraceIdContext,
};

const TRACE_ID_HEADER: &str = "X-B3-TraceId";
const SPAN_ID_HEADER: &str = "X-B3-SpanId";
const PARENT_SPAN_ID_HEADER: &str = "X-B3-ParentSpanId";
const SAMPLED_HEADER: &str = "X-B3-Sampled";
const FLAGS_HEADER: &str = "X-B3-Flags";

const B3_HEADERS: [&str; 5] = [
    TRACE_ID_HEADER,
    SPAN_ID_HEADER,
    PARENT_SPAN_ID_HEADER,
    SAMPLED_HEADER,
    FLAGS_HEADER,
];

/// Propagates contexts in B3 multi-header format.
#[derive(Clone, Debug, Default)]
pub struct B3Propagation {
    _private: (),
}

impl B3Propagation {
    /// Create a new B3 codec.
    pub fn new() -> Self {
        B3Propagation { _private: () }
    }

    fn extract_flags(extractor: &dyn Extractor) -> Result<SamplingFlags, ()> {
        let debug = matches!(extractor.get(FLAGS_HEADER).map(str::trim), Some("1"));
        let sampled = match extractor.get(SAMPLED_HEADER).map(str::trim) {
            Some("1") | Some("true") => Some(true),
            Some("0") | Some("false") => Some(false),
            None | Some("") => None,
            Some(_) => return Err(()),
        };
        Ok(SamplingFlags::new(sampled, debug))
    }

    fn extract_context(&self, extractor: &dyn Extractor) -> Result<ExtractedContext, ()> {
        let flags = Self::extract_flags(extractor)?;

        let Some(trace_id_header) = extractor.get(TRACE_ID_HEADER) else {
            return Ok(ExtractedContext::from_flags(flags));
        };
        let (trace_id_high, trace_id) = parse_trace_id(trace_id_header.trim()).ok_or(())?;

        let Some(span_id_header) = extractor.get(SPAN_ID_HEADER) else {
            let context = TraceIdContext::builder()
                .trace_id_high(trace_id_high)
                .trace_id(trace_id)
                .sampled(flags.sampled())
                .debug(flags.is_debug())
                .build()
                .map_err(|_| ())?;
            return Ok(ExtractedContext::from_trace_id(context));
        };
        let span_id = parse_hex_16(span_id_header.trim()).ok_or(())?;

        let parent_id = match extractor.get(PARENT_SPAN_ID_HEADER) {
            Some(parent_header) => Some(parse_hex_16(parent_header.trim()).ok_or(())?),
            None => None,
        };

        let context = TraceContext::builder()
            .trace_id_high(trace_id_high)
            .trace_id(trace_id)
            .parent_id(parent_id)
            .span_id(span_id)
            .sampled(flags.sampled())
            .debug(flags.is_debug())
            .build()
            .map_err(|_| ())?;
        Ok(ExtractedContext::from_context(context))
    }
}

impl Propagation for B3Propagation {
    fn keys(&self) -> &[&'static str] {
        &B3_HEADERS
    }

    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector) {
        injector.set(TRACE_ID_HEADER, context.trace_id_string());
        injector.set(SPAN_ID_HEADER, format!("{:016x}", context.span_id()));
        if let Some(parent_id) = context.parent_id() {
            injector.set(PARENT_SPAN_ID_HEADER, format!("{parent_id:016x}"));
        }
        if context.debug() {
            injector.set(FLAGS_HEADER, "1".to_string());
        } else if let Some(sampled) = context.sampled() {
            injector.set(SAMPLED_HEADER, if sampled { "1" } else { "0" }.to_string());
        }
    }

    fn extract(&self, extractor: &dyn Extractor) -> ExtractedContext {
        self.extract_context(extractor)
            .unwrap_or_else(|()| ExtractedContext::empty())
    }
}

/// Parses exactly 16 lowercase hex characters, preserving leading zeros.
fn parse_hex_16(value: &str) -> Option<u64> {
    if value.len() != 16 {
        return None;
    }
    if value
        .bytes()
        .any(|byte| !byte.is_ascii_hexdigit() || byte.is_ascii_uppercase())
    {
        return None;
    }
    u64::from_str_radix(value, 16).ok()
}

/// Parses a 16- or 32-character lowercase hex trace id into (high, low).
fn parse_trace_id(value: &str) -> Option<(u64, u64)> {
    match value.len() {
        16 => Some((0, parse_hex_16(value)?)),
        32 => Some((parse_hex_16(&value[..16])?, parse_hex_16(&value[16..])?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::ContextOrFlags;
    use std::collections::HashMap;

    fn extract(headers: &[(&str, &str)]) -> ExtractedContext {
        let mut carrier = HashMap::new();
        for (key, value) in headers {
            carrier.set(key, value.to_string());
        }
        B3Propagation::new().extract(&carrier)
    }

    fn expect_flags(extracted: &ExtractedContext) -> SamplingFlags {
        match extracted.context_or_flags() {
            ContextOrFlags::Flags(flags) => *flags,
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn extract_full_context() {
        let extracted = extract(&[
            ("X-B3-TraceId", "00000000000000010000000000000002"),
            ("X-B3-SpanId", "0000000000000003"),
            ("X-B3-ParentSpanId", "0000000000000004"),
            ("X-B3-Sampled", "1"),
        ]);
        let context = match extracted.context_or_flags() {
            ContextOrFlags::Context(context) => context,
            other => panic!("unexpected variant: {other:?}"),
        };
        assert_eq!(context.trace_id_high(), 1);
        assert_eq!(context.trace_id(), 2);
        assert_eq!(context.span_id(), 3);
        assert_eq!(context.parent_id(), Some(4));
        assert_eq!(context.sampled(), Some(true));
        assert!(!context.debug());
    }

    #[test]
    fn extract_trace_id_only() {
        let extracted = extract(&[("X-B3-TraceId", "000000000000000a")]);
        match extracted.context_or_flags() {
            ContextOrFlags::TraceId(context) => {
                assert_eq!(context.trace_id(), 10);
                assert_eq!(context.trace_id_high(), 0);
                assert_eq!(context.sampled(), None);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn extract_sampling_only() {
        assert_eq!(
            expect_flags(&extract(&[("X-B3-Sampled", "0")])),
            SamplingFlags::NOT_SAMPLED
        );
        assert_eq!(
            expect_flags(&extract(&[("X-B3-Sampled", "true")])),
            SamplingFlags::SAMPLED
        );
        assert_eq!(
            expect_flags(&extract(&[("X-B3-Flags", "1")])),
            SamplingFlags::DEBUG
        );
        assert_eq!(expect_flags(&extract(&[])), SamplingFlags::EMPTY);
    }

    #[test]
    fn extract_rejects_malformed() {
        for (headers, reason) in [
            (
                vec![("X-B3-TraceId", "abc"), ("X-B3-SpanId", "0000000000000003")],
                "short trace id",
            ),
            (
                vec![
                    ("X-B3-TraceId", "000000000000000G"),
                    ("X-B3-SpanId", "0000000000000003"),
                ],
                "non-hex trace id",
            ),
            (
                vec![
                    ("X-B3-TraceId", "000000000000000A"),
                    ("X-B3-SpanId", "0000000000000003"),
                ],
                "uppercase trace id",
            ),
            (
                vec![
                    ("X-B3-TraceId", "0000000000000001"),
                    ("X-B3-SpanId", "0000000000000000"),
                ],
                "zero span id",
            ),
            (
                vec![
                    ("X-B3-TraceId", "0000000000000000"),
                    ("X-B3-SpanId", "0000000000000003"),
                ],
                "zero trace id",
            ),
            (
                vec![
                    ("X-B3-TraceId", "0000000000000001"),
                    ("X-B3-SpanId", "0000000000000003"),
                    ("X-B3-Sampled", "maybe"),
                ],
                "bogus sampled",
            ),
        ] {
            let extracted = extract(&headers);
            assert_eq!(
                expect_flags(&extracted),
                SamplingFlags::EMPTY,
                "{reason}"
            );
        }
    }

    #[test]
    fn inject_writes_fixed_width_lowercase() {
        let context = TraceContext::builder()
            .trace_id(2)
            .parent_id(Some(4))
            .span_id(3)
            .sampled(Some(true))
            .build()
            .unwrap();
        let mut carrier = HashMap::new();
        B3Propagation::new().inject(&context, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, "X-B3-TraceId"),
            Some("0000000000000002")
        );
        assert_eq!(
            Extractor::get(&carrier, "X-B3-SpanId"),
            Some("0000000000000003")
        );
        assert_eq!(
            Extractor::get(&carrier, "X-B3-ParentSpanId"),
            Some("0000000000000004")
        );
        assert_eq!(Extractor::get(&carrier, "X-B3-Sampled"), Some("1"));
        assert_eq!(Extractor::get(&carrier, "X-B3-Flags"), None);
    }

    #[test]
    fn inject_debug_uses_flags_header() {
        let context = TraceContext::builder()
            .trace_id(2)
            .span_id(3)
            .debug(true)
            .build()
            .unwrap();
        let mut carrier = HashMap::new();
        B3Propagation::new().inject(&context, &mut carrier);

        assert_eq!(Extractor::get(&carrier, "X-B3-Flags"), Some("1"));
        assert_eq!(Extractor::get(&carrier, "X-B3-Sampled"), None);
    }

    #[test]
    fn inject_omits_sampled_when_undecided() {
        let context = TraceContext::builder().trace_id(2).span_id(3).build().unwrap();
        let mut carrier = HashMap::new();
        B3Propagation::new().inject(&context, &mut carrier);

        assert_eq!(Extractor::get(&carrier, "X-B3-Sampled"), None);
        assert_eq!(Extractor::get(&carrier, "X-B3-Flags"), None);
    }

    #[test]
    fn round_trip() {
        let context = TraceContext::builder()
            .trace_id_high(0x0102_0304_0506_0708)
            .trace_id(0x90a0_b0c0_d0e0_f001)
            .parent_id(Some(5))
            .span_id(6)
            .sampled(Some(false))
            .build()
            .unwrap();
        let mut carrier = HashMap::new();
        let propagation = B3Propagation::new();
        propagation.inject(&context, &mut carrier);

        match propagation.extract(&carrier).context_or_flags() {
            ContextOrFlags::Context(extracted) => assert_eq!(extracted, &context),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
