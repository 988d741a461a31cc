//! Fixed-size worker pool over a bounded pair queue.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use tracing::{debug, trace};

use crate::error::{EngineError, Result};

use super::CancelToken;

/// Runs `work` for every item index on `workers` scoped threads.
///
/// Indices are pushed into a channel of `capacity` slots; a full channel
/// blocks the producer. Cancelling stops the producer, and the workers
/// drain what is already queued. Results come back sorted by index and
/// contain only the items that were processed.
///
/// # Errors
///
/// Returns [`EngineError::Worker`] if a worker panics or a queue lock is
/// poisoned.
pub(crate) fn run_indexed<T, F>(
    count: usize,
    workers: usize,
    capacity: usize,
    cancel: &CancelToken,
    work: F,
) -> Result<Vec<(usize, T)>>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let workers = workers.clamp(1, count.max(1));
    let (tx, rx) = mpsc::sync_channel::<usize>(capacity.max(1));
    let rx = Mutex::new(rx);
    let results = Mutex::new(Vec::with_capacity(count));

    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let (rx, results, work) = (&rx, &results, &work);
                scope.spawn(move || -> Result<()> {
                    let mut done = 0usize;
                    loop {
                        let next = rx
                            .lock()
                            .map_err(|_| EngineError::Worker("pair queue poisoned".into()))?
                            .recv();
                        let Ok(index) = next else {
                            break;
                        };
                        let out = work(index);
                        results
                            .lock()
                            .map_err(|_| EngineError::Worker("result list poisoned".into()))?
                            .push((index, out));
                        done += 1;
                    }
                    trace!(worker, done, "worker drained");
                    Ok(())
                })
            })
            .collect();

        let mut queued = 0usize;
        for index in 0..count {
            if cancel.is_cancelled() {
                debug!(queued, count, "producer cancelled");
                break;
            }
            // Fails only when every worker has exited.
            if tx.send(index).is_err() {
                break;
            }
            queued += 1;
        }
        drop(tx);

        for handle in handles {
            handle
                .join()
                .map_err(|_| EngineError::Worker("pair worker panicked".into()))??;
        }
        Ok(())
    })?;

    let mut results = results
        .into_inner()
        .map_err(|_| EngineError::Worker("result list poisoned".into()))?;
    results.sort_by_key(|(index, _)| *index);
    Ok(results)
}
