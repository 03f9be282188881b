use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;

/// Interface for generating trace and span identifiers.
///
/// Implementations must never return zero: a zero trace or span id means
/// "absent" on every wire format this library speaks.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new nonzero trace id half (64 bits).
    ///
    /// When 128-bit trace ids are enabled this is called once per half, and
    /// both halves must be nonzero.
    fn next_trace_id(&self) -> u64;

    /// Generate a new nonzero span id.
    fn next_span_id(&self) -> u64;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates ids using a per-thread random number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl RandomIdGenerator {
    /// Create a new random id generator.
    pub fn new() -> Self {
        RandomIdGenerator { _private: () }
    }
}

impl IdGenerator for RandomIdGenerator {
    fn next_trace_id(&self) -> u64 {
        CURRENT_RNG.with(next_nonzero)
    }

    fn next_span_id(&self) -> u64 {
        CURRENT_RNG.with(next_nonzero)
    }
}

fn next_nonzero(rng: &RefCell<rngs::SmallRng>) -> u64 {
    let mut rng = rng.borrow_mut();
    loop {
        let id = rng.gen::<u64>();
        if id != 0 {
            return id;
        }
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}
