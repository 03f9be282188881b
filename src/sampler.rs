use std::fmt;

/// The [`ShouldSample`] interface decides whether a new trace is recorded.
///
/// The decision is made once per trace, at the first span whose inbound
/// context carries no decision, and must be deterministic for a given trace
/// id so that every service participating in the trace agrees. Contexts that
/// already carry a decision are never re-sampled.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Returns true if a trace with the given id should be recorded.
    ///
    /// Must return the same result for the same `trace_id` for the lifetime
    /// of the process.
    fn is_sampled(&self, trace_id: u64) -> bool;
}

/// This trait should not be used directly; instead users should use
/// [`ShouldSample`].
pub trait CloneShouldSample {
    /// Clone the boxed sampler.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in sampling policies.
///
/// For more complex scenarios implement [`ShouldSample`] directly.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Record every trace.
    AlwaysOn,
    /// Record no traces.
    AlwaysOff,
    /// Record a given fraction of traces, derived deterministically from the
    /// trace id. Fractions >= 1 always sample; fractions <= 0 never do.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn is_sampled(&self, trace_id: u64) -> bool {
        match self {
            Sampler::AlwaysOn => true,
            Sampler::AlwaysOff => false,
            Sampler::TraceIdRatioBased(ratio) => sample_based_on_ratio(*ratio, trace_id),
        }
    }
}

fn sample_based_on_ratio(ratio: f64, trace_id: u64) -> bool {
    if ratio >= 1.0 {
        return true;
    }
    let upper_bound = (ratio.max(0.0) * (1u64 << 63) as f64) as u64;
    (trace_id >> 1) < upper_bound
}
