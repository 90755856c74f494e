// Copyright 2025, The Embedtor Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Job handles for enqueued actions and commands.
//!
//! A job completes exactly once with a typed result or an error, runs its
//! completion hooks exactly once on that terminal transition, and may be
//! cancelled: a still-queued job completes with `Cancelled` without executing;
//! an executing job runs to completion but its result is discarded.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
    Mutex,
};

use tokio::sync::{oneshot, Notify};

use crate::error::RuntimeError;

type Hook = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
pub(crate) struct JobShared {
    cancelled: AtomicBool,
    completed: AtomicBool,
    cancel_notify: Notify,
    hooks: Mutex<Vec<Hook>>,
}

impl JobShared {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The caller's handle to a pending or running job.
pub struct RuntimeJob<T> {
    rx: oneshot::Receiver<Result<T, RuntimeError>>,
    shared: Arc<JobShared>,
}

impl<T> RuntimeJob<T> {
    /// Request cancellation. The waiter unblocks immediately; see the module
    /// docs for the effect on the underlying work.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.cancel_notify.notify_one();
    }

    /// Register a cleanup hook invoked exactly once when the job reaches a
    /// terminal state. A hook registered after completion runs immediately.
    pub fn on_completion<F: FnOnce() + Send + 'static>(&self, hook: F) {
        if self.shared.completed.load(Ordering::Acquire) {
            hook();
            return;
        }
        let mut hooks = self.shared.hooks.lock().expect("job hooks poisoned");
        // Re-check under the lock so a racing completion cannot strand the hook
        if self.shared.completed.load(Ordering::Acquire) {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }

    /// Await the job's terminal result.
    pub async fn wait(mut self) -> Result<T, RuntimeError> {
        tokio::select! {
            // A result that already arrived wins over a late cancel
            biased;
            result = &mut self.rx => match result {
                Ok(result) => result,
                Err(_) if self.shared.is_cancelled() => Err(RuntimeError::Cancelled),
                Err(_) => Err(RuntimeError::Destroyed),
            },
            _ = self.shared.cancel_notify.notified() => Err(RuntimeError::Cancelled),
        }
    }
}

/// The executor's side of a job. Dropping a completer without completing it
/// fails the waiter with `Destroyed`.
pub(crate) struct JobCompleter<T> {
    tx: oneshot::Sender<Result<T, RuntimeError>>,
    shared: Arc<JobShared>,
}

impl<T> JobCompleter<T> {
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Complete the job. A cancelled job's result is replaced with `Cancelled`.
    /// Hooks run exactly once, before the waiter observes the result.
    pub fn complete(self, result: Result<T, RuntimeError>) {
        let result = if self.is_cancelled() { Err(RuntimeError::Cancelled) } else { result };
        let hooks = {
            let mut hooks = self.shared.hooks.lock().expect("job hooks poisoned");
            self.shared.completed.store(true, Ordering::Release);
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
        let _ = self.tx.send(result);
    }
}

pub(crate) fn job_pair<T>() -> (RuntimeJob<T>, JobCompleter<T>) {
    let (tx, rx) = oneshot::channel();
    let shared = Arc::new(JobShared::default());
    (
        RuntimeJob {
            rx,
            shared: shared.clone(),
        },
        JobCompleter { tx, shared },
    )
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use embedtor_test_utils::unpack_enum;

    use super::*;

    #[tokio::test]
    async fn completes_once_with_result() {
        let (job, completer) = job_pair::<u32>();
        completer.complete(Ok(7));
        assert_eq!(job.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn hooks_fire_exactly_once_on_completion() {
        let (job, completer) = job_pair::<()>();
        let count = Arc::new(AtomicUsize::new(0));
        job.on_completion({
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        completer.complete(Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Hooks registered after the terminal state run immediately
        job.on_completion({
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
        job.wait().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_unblocks_the_waiter_immediately() {
        let (job, completer) = job_pair::<()>();
        job.cancel();
        assert!(completer.is_cancelled());
        let err = job.wait().await.unwrap_err();
        unpack_enum!(RuntimeError::Cancelled = err);

        // A later completion is discarded
        completer.complete(Ok(()));
    }

    #[tokio::test]
    async fn result_arriving_before_cancel_wins() {
        let (job, completer) = job_pair::<u32>();
        completer.complete(Ok(1));
        job.cancel();
        assert_eq!(job.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_completer_is_destroyed() {
        let (job, completer) = job_pair::<()>();
        drop(completer);
        let err = job.wait().await.unwrap_err();
        unpack_enum!(RuntimeError::Destroyed = err);
    }
}
