#![cfg_attr(not(feature = "std"), no_std)]

//! Shared low-level primitives for the slab allocator crates.
//!
//! Re-exports `spin`'s lock types under a project-local name so the rest of
//! the workspace depends on one API rather than on `spin` directly.

pub use spin::{Mutex, MutexGuard};
pub use spin::{Once, Lazy};

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn mutex_round_trips_value() {
        let lock = Mutex::new(42);
        {
            let mut guard = lock.lock();
            assert_eq!(*guard, 42);
            *guard = 43;
        }
        assert_eq!(*lock.lock(), 43);
    }

    #[test]
    fn once_runs_exactly_once() {
        use core::sync::atomic::{AtomicUsize, Ordering};
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        static ONCE: Once<u32> = Once::new();

        for _ in 0..4 {
            ONCE.call_once(|| {
                RUNS.fetch_add(1, Ordering::SeqCst);
                7
            });
        }
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
        assert_eq!(*ONCE.get().unwrap(), 7);
    }
}
