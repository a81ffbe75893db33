//! Process-wide bound on intra-op parallelism.
//!
//! Dense contractions hand this bound to faer's GEMM. It is a performance knob
//! only; results do not depend on it beyond floating-point reassociation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use faer::Par;

static NUM_THREADS: AtomicUsize = AtomicUsize::new(1);

/// Set the number of threads used inside a single tensor operation.
///
/// Values of `0` or `1` select sequential execution.
pub fn set_num_threads(threads: usize) {
    NUM_THREADS.store(threads.max(1), Ordering::Relaxed);
}

/// Current intra-op thread bound.
#[must_use]
pub fn num_threads() -> usize {
    NUM_THREADS.load(Ordering::Relaxed)
}

/// faer parallelism matching [`num_threads`].
pub(crate) fn par() -> Par {
    match NonZeroUsize::new(num_threads()) {
        Some(n) if n.get() > 1 => Par::Rayon(n),
        _ => Par::Seq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_threads_means_sequential() {
        let before = num_threads();
        set_num_threads(0);
        assert_eq!(num_threads(), 1);
        assert!(matches!(par(), Par::Seq));
        set_num_threads(before);
    }
}
