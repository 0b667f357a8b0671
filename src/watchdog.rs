//! Deadline-bounded execution on a reusable worker thread.
//!
//! Jobs are sent to a background worker and the caller waits on the reply with a
//! deadline. When the deadline passes the worker is abandoned: its channels are
//! dropped, it finishes whatever it is running and exits, and the next job gets a
//! fresh worker. Nothing is shared with the abandoned job except what it owns.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

type Job<T> = Box<dyn FnOnce() -> T + Send + 'static>;

struct Worker<T> {
    jobs: Sender<Job<T>>,
    results: Receiver<T>,
}

impl<T: Send + 'static> Worker<T> {
    fn spawn() -> std::io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job<T>>();
        let (res_tx, res_rx) = mpsc::channel::<T>();
        thread::Builder::new()
            .name("logspell-watchdog".into())
            .spawn(move || {
                for job in job_rx {
                    if res_tx.send(job()).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self { jobs: job_tx, results: res_rx })
    }
}

/// Outcome of a time-boxed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deadline<T> {
    Completed(T),
    TimedOut,
}

impl<T> Deadline<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Deadline::Completed(v) => Some(v),
            Deadline::TimedOut => None,
        }
    }
}

pub struct Watchdog<T> {
    timeout: Duration,
    worker: Option<Worker<T>>,
    abandoned: usize,
}

impl<T: Send + 'static> Watchdog<T> {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, worker: None, abandoned: 0 }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of workers given up on so far.
    pub fn abandoned(&self) -> usize {
        self.abandoned
    }

    /// Runs `job` with the configured deadline.
    ///
    /// If no worker thread can be started the job runs inline, unbounded.
    pub fn run<F>(&mut self, job: F) -> Deadline<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if self.worker.is_none() {
            match Worker::spawn() {
                Ok(w) => self.worker = Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot start watchdog worker, running job inline");
                    return Deadline::Completed(job());
                }
            }
        }
        let Some(worker) = self.worker.as_ref() else {
            return Deadline::Completed(job());
        };

        if let Err(mpsc::SendError(job)) = worker.jobs.send(Box::new(job)) {
            // Worker died (a previous job panicked); retry once on a fresh one.
            self.worker = None;
            return match Worker::spawn() {
                Ok(w) => {
                    let sent = w.jobs.send(job);
                    self.worker = Some(w);
                    match sent {
                        Ok(()) => self.wait(),
                        Err(mpsc::SendError(job)) => Deadline::Completed(job()),
                    }
                }
                Err(_) => Deadline::Completed(job()),
            };
        }
        self.wait()
    }

    fn wait(&mut self) -> Deadline<T> {
        let Some(worker) = self.worker.as_ref() else { return Deadline::TimedOut };
        match worker.results.recv_timeout(self.timeout) {
            Ok(value) => Deadline::Completed(value),
            Err(RecvTimeoutError::Timeout) => {
                self.worker = None;
                self.abandoned += 1;
                Deadline::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The job panicked and took the worker down with it.
                self.worker = None;
                Deadline::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_within_deadline() {
        let mut dog = Watchdog::new(Duration::from_secs(2));
        assert_eq!(dog.run(|| 21 * 2), Deadline::Completed(42));
        assert_eq!(dog.run(|| 7), Deadline::Completed(7));
        assert_eq!(dog.abandoned(), 0);
    }

    #[test]
    fn slow_job_times_out_and_worker_is_replaced() {
        let mut dog = Watchdog::new(Duration::from_millis(50));
        let out = dog.run(|| {
            thread::sleep(Duration::from_millis(500));
            1
        });
        assert_eq!(out, Deadline::TimedOut);
        assert_eq!(dog.abandoned(), 1);
        // The stale result of the abandoned job must not leak into the next one.
        assert_eq!(dog.run(|| 2), Deadline::Completed(2));
    }

    #[test]
    fn panicking_job_does_not_poison_the_watchdog() {
        let mut dog: Watchdog<u32> = Watchdog::new(Duration::from_secs(2));
        assert_eq!(dog.run(|| panic!("boom")), Deadline::TimedOut);
        assert_eq!(dog.run(|| 3), Deadline::Completed(3));
    }
}
