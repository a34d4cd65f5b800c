//! Work that outlives the response.
//!
//! Handlers queue cache writes and cleanup into a [`Deferred`] batch; the
//! HTTP layer hands the batch to [`BackgroundTasks`] once the response is
//! ready. Steps within one batch run in push order.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;

type Step = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Ordered steps to run after the response is sent.
#[derive(Default)]
pub struct Deferred {
    steps: Vec<(&'static str, Step)>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, name: &'static str, step: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.steps.push((name, Box::pin(step)));
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step sequentially.
    pub async fn run(self) {
        for (name, step) in self.steps {
            tracing::trace!(step = name, "deferred step");
            step.await;
        }
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|(name, _)| *name).collect();
        f.debug_struct("Deferred").field("steps", &names).finish()
    }
}

/// Tracks spawned deferred batches so shutdown can wait for them.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a batch on the current runtime. Empty batches are dropped.
    pub fn spawn(&self, deferred: Deferred) {
        if deferred.is_empty() {
            return;
        }
        let mut set = self.lock();
        while let Some(done) = set.try_join_next() {
            if let Err(e) = done {
                tracing::warn!(error = %e, "deferred task failed");
            }
        }
        set.spawn(deferred.run());
    }

    /// Wait for every spawned batch, including batches spawned meanwhile.
    pub async fn drain(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.lock());
            if set.is_empty() {
                return;
            }
            while let Some(done) = set.join_next().await {
                if let Err(e) = done {
                    tracing::warn!(error = %e, "deferred task failed");
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks").field("pending", &self.pending()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn test_steps_run_in_push_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut deferred = Deferred::new();
        for i in 0..3 {
            let log = log.clone();
            deferred.push("step", async move {
                tokio::task::yield_now().await;
                log.lock().unwrap().push(i);
            });
        }
        assert!(!deferred.is_empty());

        let tasks = BackgroundTasks::new();
        tasks.spawn(deferred);
        tasks.drain().await;

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_not_spawned() {
        let tasks = BackgroundTasks::new();
        tasks.spawn(Deferred::new());
        assert_eq!(tasks.pending(), 0);
        tasks.drain().await;
    }
}
