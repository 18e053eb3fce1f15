//! Bounded fan-out for per-page work.

use crate::error::{FolioError, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, Ordering};

/// Worker count used when an action does not set `threads`.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `f` over `items` on a pool of `threads` workers.
///
/// Results come back in input order once every worker has finished. Items not
/// started before `cancel` is raised are dropped and the call returns
/// [`FolioError::Cancelled`].
pub fn fan_out<T, R, F>(threads: usize, items: &[T], cancel: &AtomicBool, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("folio-worker-{i}"))
        .build()
        .map_err(|e| FolioError::Io(std::io::Error::other(e.to_string())))?;

    let results: Vec<Option<R>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                if cancel.load(Ordering::Relaxed) {
                    None
                } else {
                    Some(f(item))
                }
            })
            .collect()
    });

    if cancel.load(Ordering::Relaxed) {
        return Err(FolioError::Cancelled);
    }
    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn results_keep_input_order() {
        let cancel = AtomicBool::new(false);
        let items: Vec<u32> = (0..64).collect();
        let out = fan_out(4, &items, &cancel, |n| n * 2).unwrap();
        assert_eq!(out, items.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let cancel = AtomicBool::new(true);
        let calls = AtomicUsize::new(0);
        let err = fan_out(2, &[1, 2, 3], &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap_err();
        assert!(matches!(err, FolioError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_mid_batch_stops_scheduling() {
        let cancel = AtomicBool::new(false);
        let calls = AtomicUsize::new(0);
        let items: Vec<u32> = (0..500).collect();
        let err = fan_out(1, &items, &cancel, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            if *n == 3 {
                cancel.store(true, Ordering::SeqCst);
            }
        })
        .unwrap_err();
        assert!(matches!(err, FolioError::Cancelled));
        assert!(calls.load(Ordering::SeqCst) < items.len());
    }

    #[test]
    fn zero_threads_is_clamped() {
        let cancel = AtomicBool::new(false);
        assert_eq!(fan_out(0, &[1u8], &cancel, |n| *n).unwrap(), vec![1]);
    }
}
