//! Fixed-size fan-out pool.
//!
//! A feeder task pushes inputs into a bounded queue shared by `workers`
//! tasks. Each job yields `Ok(Some(r))`, `Ok(None)` (nothing to report) or
//! an error; results and errors fan in through two channels drained by
//! collector tasks. The barrier is: join every worker, drop the last
//! senders, then join the collectors. Result order is unspecified.
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a worker does after a job fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Keep draining the queue; report the first error seen.
    #[default]
    CollectAll,
    /// Cancel the shared token on the first error so the feeder, idle
    /// workers and in-flight paginators stop early.
    FailFast,
}

#[derive(Debug)]
pub struct PoolOutcome<R, E> {
    pub results: Vec<R>,
    pub first_error: Option<E>,
}

impl<R, E> PoolOutcome<R, E> {
    pub fn into_result(self) -> Result<Vec<R>, E> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FanOutPool {
    workers: usize,
    policy: ErrorPolicy,
}

impl FanOutPool {
    /// A pool with at least one worker.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            policy: ErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn run<I, R, E, F, Fut>(&self, inputs: Vec<I>, job: F) -> PoolOutcome<R, E>
    where
        I: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(I, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, E>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (input_tx, input_rx) = mpsc::channel::<I>(self.workers);
        let input_rx = Arc::new(Mutex::new(input_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<R>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<E>();

        let feeder = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for input in inputs {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("feeder cancelled");
                            break;
                        }
                        sent = input_tx.send(input) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                // input_tx drops here and closes the queue
            })
        };

        let results = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        });
        let errors = tokio::spawn(async move {
            let mut first = None;
            let mut swallowed = 0usize;
            while let Some(err) = error_rx.recv().await {
                if first.is_none() {
                    first = Some(err);
                } else {
                    swallowed += 1;
                }
            }
            (first, swallowed)
        });

        let job = Arc::new(job);
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let input_rx = Arc::clone(&input_rx);
            let job = Arc::clone(&job);
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();
            let cancel = cancel.clone();
            let policy = self.policy;
            workers.spawn(async move {
                let mut handled = 0usize;
                loop {
                    if policy == ErrorPolicy::FailFast && cancel.is_cancelled() {
                        break;
                    }
                    let next = input_rx.lock().await.recv().await;
                    let Some(input) = next else {
                        break;
                    };
                    handled += 1;
                    match job(input, cancel.clone()).await {
                        Ok(Some(result)) => {
                            let _ = result_tx.send(result);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            // Send before cancelling so the root cause is
                            // queued ahead of any Cancelled fallout.
                            let _ = error_tx.send(err);
                            if policy == ErrorPolicy::FailFast {
                                cancel.cancel();
                            }
                        }
                    }
                }
                debug!(worker, handled, "worker finished");
            });
        }
        drop(result_tx);
        drop(error_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    cancel.cancel();
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
        let _ = feeder.await;

        let results = results.await.unwrap_or_default();
        let (first_error, swallowed) = errors.await.unwrap_or((None, 0));
        if swallowed > 0 {
            warn!(swallowed, "additional job errors discarded");
        }
        PoolOutcome {
            results,
            first_error,
        }
    }
}
