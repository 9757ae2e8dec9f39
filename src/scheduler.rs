// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Periodic Background Tasks
//!
//! A [`PeriodicTask`] is one unit of recurring work (for example the key ring
//! refresh). [`spawn_periodic`] drives it on a fixed interval for the life of
//! the process.
//!
//! ## Contract
//!
//! - A failed run is logged at `warn` and swallowed; the next tick retries.
//! - Runs never overlap: a slow run delays the following tick.
//! - The loop only ends when the cancellation token fires at shutdown. In
//!   flight work is abandoned; tasks keep no state that must be persisted.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Recurring unit of background work.
pub trait PeriodicTask: Send + Sync + 'static {
    type Error: Display + Send;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Execute one run.
    fn run_once(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Spawn `task` to run every `interval` until `shutdown` is cancelled.
///
/// The first run happens one full interval after spawning, since callers
/// perform the initial load themselves before serving traffic.
pub fn spawn_periodic<T: PeriodicTask>(
    task: T,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            task = task.name(),
            interval_secs = interval.as_secs(),
            "Periodic task starting"
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = shutdown.cancelled() => {
                    info!(task = task.name(), "Periodic task shutting down");
                    return;
                }
            }

            tokio::select! {
                result = task.run_once() => match result {
                    Ok(()) => debug!(task = task.name(), "Periodic task run complete"),
                    Err(e) => warn!(task = task.name(), error = %e, "Periodic task run failed"),
                },
                _ = shutdown.cancelled() => {
                    info!(task = task.name(), "Periodic task abandoned at shutdown");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        runs: Arc<AtomicUsize>,
        fail_every_other: bool,
    }

    impl PeriodicTask for Counting {
        type Error = String;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> Result<(), String> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other && n % 2 == 0 {
                Err(format!("run {n} failed"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_each_tick_and_survives_failures() {
        let runs = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let handle = spawn_periodic(
            Counting {
                runs: runs.clone(),
                fail_every_other: true,
            },
            Duration::from_secs(600),
            shutdown.clone(),
        );

        // Nothing runs before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(600 * 3 + 2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let handle = spawn_periodic(
            Counting {
                runs: runs.clone(),
                fail_every_other: false,
            },
            Duration::from_secs(10),
            shutdown.clone(),
        );

        shutdown.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
