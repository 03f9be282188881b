use crate::propagation::TraceContext;
use crate::span::SpanKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Sink for finished spans.
///
/// Reporters run on the thread that finished the span and must not block for
/// long; buffering and transport belong behind this interface, not in front
/// of it. A reporter that panics does not unwind into the caller: the panic
/// is caught, logged, and the span counts as reported.
///
/// The `Display` rendering is part of the tracer's diagnostic output.
pub trait Reporter: Send + Sync + fmt::Debug + fmt::Display {
    /// Accept one finished span. Delivery is best-effort.
    fn report(&self, span: ReportedSpan);
}

/// A network context, used to name the service that recorded a span or the
/// remote side it talked to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Lowercase label of this node in the service graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// IPv4 address of this endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    /// IPv6 address of this endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    /// Listen port of this endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    /// Start building an endpoint.
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::default()
    }
}

/// Builder for [`Endpoint`].
#[derive(Clone, Debug, Default)]
pub struct EndpointBuilder {
    endpoint: Endpoint,
}

impl EndpointBuilder {
    /// Name the service this endpoint belongs to.
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.endpoint.service_name = Some(service_name.into());
        self
    }

    /// Set the IPv4 address.
    pub fn ipv4(mut self, ipv4: Ipv4Addr) -> Self {
        self.endpoint.ipv4 = Some(ipv4);
        self
    }

    /// Set the IPv6 address.
    pub fn ipv6(mut self, ipv6: Ipv6Addr) -> Self {
        self.endpoint.ipv6 = Some(ipv6);
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.endpoint.port = Some(port);
        self
    }

    /// Build the endpoint.
    pub fn build(self) -> Endpoint {
        self.endpoint
    }
}

/// A timestamped event recorded on a span.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Annotation {
    /// Epoch microseconds at which the event occurred.
    pub timestamp: u64,
    /// What happened.
    pub value: String,
}

/// A finished span as handed to a [`Reporter`].
///
/// Identifiers are fixed-width lowercase hex. Serialization is the JSON
/// shape collectors ingest; absent fields are omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedSpan {
    /// Trace id: 16 or 32 hex characters.
    pub trace_id: String,
    /// Parent span id, absent on a root span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Span id: 16 hex characters.
    pub id: String,
    /// The role this span played in an exchange, absent for local work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SpanKind>,
    /// Lowercase operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Start time in epoch microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Elapsed microseconds, absent when unfinished or when zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// The endpoint that recorded this span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    /// The other side of the exchange, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    /// Timestamped events, in insertion order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// Key-value metadata; last write per key wins.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// True when the trace was flagged for collector-side retention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    /// True when this span id was shared with the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
}

/// Interceptor applied to each finished span before the reporter sees it.
///
/// Handlers run in registration order and may rewrite the span; returning
/// `false` drops it instead of reporting.
pub trait FinishedSpanHandler: Send + Sync + fmt::Debug {
    /// Inspect or mutate a finished span. Return `false` to drop it.
    fn handle(&self, context: &TraceContext, span: &mut ReportedSpan) -> bool;
}

/// A [`Reporter`] that discards every span.
#[derive(Clone, Debug, Default)]
pub struct NoopReporter {
    _private: (),
}

impl NoopReporter {
    /// Create a new discarding reporter.
    pub fn new() -> Self {
        NoopReporter { _private: () }
    }
}

impl Reporter for NoopReporter {
    fn report(&self, _span: ReportedSpan) {}
}

impl fmt::Display for NoopReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopReporter{}")
    }
}

/// A [`Reporter`] that emits each finished span as a `tracing` debug event.
#[derive(Clone, Debug, Default)]
pub struct LoggingReporter {
    _private: (),
}

impl LoggingReporter {
    /// Create a new logging reporter.
    pub fn new() -> Self {
        LoggingReporter { _private: () }
    }
}

impl Reporter for LoggingReporter {
    fn report(&self, span: ReportedSpan) {
        match serde_json::to_string(&span) {
            Ok(json) => tracing::debug!(span = %json, "reported span"),
            Err(error) => tracing::warn!(%error, "failed to encode reported span"),
        }
    }
}

impl fmt::Display for LoggingReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggingReporter{}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_span_serialization() {
        let span = ReportedSpan {
            trace_id: "0000000000000001".to_string(),
            id: "000000000000000a".to_string(),
            timestamp: Some(1),
            local_endpoint: Some(Endpoint::builder().service_name("my-service").build()),
            ..ReportedSpan::default()
        };
        assert_eq!(
            serde_json::to_string(&span).unwrap(),
            "{\"traceId\":\"0000000000000001\",\"id\":\"000000000000000a\",\
             \"timestamp\":1,\"localEndpoint\":{\"serviceName\":\"my-service\"}}"
        );
    }

    #[test]
    fn full_span_serialization() {
        let mut tags = BTreeMap::new();
        tags.insert("a".to_string(), "b".to_string());
        let span = ReportedSpan {
            trace_id: "4e441824ec2b6a44ffdc9bb9a6453df3".to_string(),
            parent_id: Some("ffdc9bb9a6453df3".to_string()),
            id: "efdc9cd9a1849df3".to_string(),
            kind: Some(SpanKind::Server),
            name: Some("main".to_string()),
            timestamp: Some(1_502_787_600_000_000),
            duration: Some(150_000),
            local_endpoint: Some(
                Endpoint::builder()
                    .service_name("frontend")
                    .ipv4(Ipv4Addr::new(192, 168, 0, 1))
                    .port(8080)
                    .build(),
            ),
            remote_endpoint: Some(Endpoint::builder().service_name("backend").build()),
            annotations: vec![Annotation {
                timestamp: 1_502_780_000_000_000,
                value: "interesting event".to_string(),
            }],
            tags,
            debug: None,
            shared: Some(true),
        };
        assert_eq!(
            serde_json::to_string(&span).unwrap(),
            "{\"traceId\":\"4e441824ec2b6a44ffdc9bb9a6453df3\",\
             \"parentId\":\"ffdc9bb9a6453df3\",\"id\":\"efdc9cd9a1849df3\",\
             \"kind\":\"SERVER\",\"name\":\"main\",\"timestamp\":1502787600000000,\
             \"duration\":150000,\"localEndpoint\":{\"serviceName\":\"frontend\",\
             \"ipv4\":\"192.168.0.1\",\"port\":8080},\
             \"remoteEndpoint\":{\"serviceName\":\"backend\"},\
             \"annotations\":[{\"timestamp\":1502780000000000,\
             \"value\":\"interesting event\"}],\"tags\":{\"a\":\"b\"},\"shared\":true}"
        );
    }

    #[test]
    fn empty_endpoint_serialization() {
        assert_eq!(serde_json::to_string(&Endpoint::default()).unwrap(), "{}");
    }
}
