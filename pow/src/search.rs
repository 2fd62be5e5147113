// Parallel nonce search across local cores
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use ferropool_core::NonceRange;
use primitive_types::U256;
use tracing::{debug, info, warn};

use crate::kernel::{meets_target, pow_hash, HeaderPrefix};

/// Sentinel held in the shared slot while no nonce has been published.
const NONCE_NONE: u64 = u64::MAX;

/// Sampling interval of the progress reporter.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared between a search and its owner.
///
/// Setting it stops all search threads within one hash attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Multi-threaded proof-of-work search over a nonce range.
pub struct Searcher {
    threads: usize,
}

impl Searcher {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// One search thread per core, leaving one core for the session layer.
    pub fn auto() -> Self {
        Self::new(num_cpus::get().saturating_sub(1))
    }

    /// Search `range` for a nonce whose header hash is strictly below
    /// `target`.
    ///
    /// The range is split evenly across the configured threads; the first
    /// thread to find a hit publishes it and the rest stop. Any qualifying
    /// nonce may be returned, not necessarily the smallest. Returns `None`
    /// when the range is exhausted or the search is cancelled.
    pub fn search(
        &self,
        prefix: &HeaderPrefix,
        target: U256,
        range: NonceRange,
        cancel: &CancelFlag,
    ) -> Option<u32> {
        if range.is_empty() {
            return None;
        }

        let slices = range.split(self.threads);
        let found = AtomicU64::new(NONCE_NONE);
        let progress: Vec<AtomicU64> =
            slices.iter().map(|s| AtomicU64::new(s.start)).collect();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        debug!(
            "searching [{}, {}) across {} threads",
            range.start,
            range.end,
            slices.len()
        );

        thread::scope(|scope| {
            let reporter = {
                let progress = &progress;
                scope.spawn(move || {
                    while let Err(mpsc::RecvTimeoutError::Timeout) =
                        done_rx.recv_timeout(PROGRESS_INTERVAL)
                    {
                        let last: Vec<u64> =
                            progress.iter().map(|p| p.load(Ordering::Relaxed)).collect();
                        debug!("last nonce tried per thread: {:?}", last);
                    }
                })
            };

            let handles: Vec<_> = slices
                .iter()
                .enumerate()
                .map(|(i, slice)| {
                    let slice = *slice;
                    let found = &found;
                    let progress = &progress[i];
                    scope.spawn(move || {
                        search_slice(prefix, target, slice, found, progress, cancel)
                    })
                })
                .collect();

            for handle in handles {
                // A panicked thread forfeits only its own slice.
                if handle.join().is_err() {
                    warn!("search thread panicked; abandoning its slice");
                }
            }

            drop(done_tx);
            let _ = reporter.join();
        });

        match found.load(Ordering::Acquire) {
            NONCE_NONE => None,
            nonce => Some(nonce as u32),
        }
    }
}

fn search_slice(
    prefix: &HeaderPrefix,
    target: U256,
    slice: NonceRange,
    found: &AtomicU64,
    progress: &AtomicU64,
    cancel: &CancelFlag,
) {
    for nonce in slice.start..slice.end {
        if cancel.is_cancelled() || found.load(Ordering::Acquire) != NONCE_NONE {
            return;
        }

        let nonce = nonce as u32;
        let hash = pow_hash(prefix, nonce);
        progress.store(nonce as u64, Ordering::Relaxed);

        if meets_target(hash, target) {
            // First publication wins; later hits are discarded.
            if found
                .compare_exchange(NONCE_NONE, nonce as u64, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                info!("nonce {} satisfies the target", nonce);
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::expand_compact;
    use ferropool_core::MiningTemplate;

    fn genesis_template() -> MiningTemplate {
        let merkle =
            hex::decode("3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a")
                .unwrap();
        MiningTemplate {
            version: 1,
            prev_block: U256::zero(),
            mrkl_root: U256::from_little_endian(&merkle),
            timestamp: 1231006505,
            bits_difficulty: 0x1d00ffff,
        }
    }

    #[test]
    fn test_trivial_target_finds_a_nonce() {
        let prefix = HeaderPrefix::from_template(&genesis_template());
        let range = NonceRange::new(0, 100);

        let nonce = Searcher::new(2)
            .search(&prefix, U256::MAX, range, &CancelFlag::new())
            .unwrap();

        assert!((nonce as u64) < range.end);
        assert!(meets_target(pow_hash(&prefix, nonce), U256::MAX));
    }

    #[test]
    fn test_impossible_target_exhausts_range() {
        let prefix = HeaderPrefix::from_template(&genesis_template());
        let range = NonceRange::new(0, 1000);

        let result = Searcher::new(4).search(&prefix, U256::zero(), range, &CancelFlag::new());
        assert_eq!(result, None);
    }

    #[test]
    fn test_cancelled_search_returns_promptly() {
        let prefix = HeaderPrefix::from_template(&genesis_template());
        let cancel = CancelFlag::new();
        cancel.cancel();

        // The full nonce space would take hours; cancellation short-circuits.
        let result = Searcher::new(2).search(&prefix, U256::zero(), NonceRange::FULL, &cancel);
        assert_eq!(result, None);
    }

    #[test]
    fn test_genesis_nonce_recovered() {
        let prefix = HeaderPrefix::from_template(&genesis_template());
        let target = expand_compact(0x1d00ffff).unwrap();
        let range = NonceRange::new(2083236893, 2083236894);

        let nonce = Searcher::new(2).search(&prefix, target, range, &CancelFlag::new());
        assert_eq!(nonce, Some(2083236893));
    }

    #[test]
    fn test_more_threads_than_nonces() {
        let prefix = HeaderPrefix::from_template(&genesis_template());
        let range = NonceRange::new(50, 52);

        let nonce = Searcher::new(8).search(&prefix, U256::MAX, range, &CancelFlag::new());
        assert!(matches!(nonce, Some(50..=51)));
    }

    #[test]
    fn test_empty_range_is_none() {
        let prefix = HeaderPrefix::from_template(&genesis_template());
        let range = NonceRange::new(10, 10);

        let result = Searcher::new(2).search(&prefix, U256::MAX, range, &CancelFlag::new());
        assert_eq!(result, None);
    }
}
