use crate::config::Config;
use crate::lifecycle::StatusMachine;
use crate::models::ProcessingTask;
use crate::processing::PostProcessor;
use crate::store::PairStore;
use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Outcome counts of one drain of the post-processing queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub failed: usize,
    /// Claimed by someone else first
    pub skipped: usize,
}

enum Outcome {
    Processed,
    Failed,
    Skipped,
}

/// Drains the awaiting-processing queue on a fixed number of threads
pub struct ProcessingPool<'a, S: PairStore> {
    store: &'a S,
    executor: PostProcessor<'a, S>,
    workers: usize,
}

impl<'a, S: PairStore> ProcessingPool<'a, S> {
    pub fn new(store: &'a S, config: &'a Config, workers: usize) -> Self {
        Self {
            store,
            executor: PostProcessor::new(store, config),
            workers: workers.max(1),
        }
    }

    /// Process every stage that is waiting right now. Stages queued while the
    /// drain runs are left for the next one.
    pub fn drain(&self) -> Result<DrainReport> {
        let tasks: VecDeque<ProcessingTask> = self.store.pairs_awaiting_processing()?.into();
        if tasks.is_empty() {
            log::debug!("No stages awaiting post-processing");
            return Ok(DrainReport::default());
        }
        log::info!("Post-processing {} stage(s) on {} worker(s)", tasks.len(), self.workers);

        let queue = Mutex::new(tasks);
        let report = Mutex::new(DrainReport::default());

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                scope.spawn(|| loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some(task) = next else { break };
                    let outcome = self.run_one(&task);
                    let mut report = report.lock().unwrap_or_else(|e| e.into_inner());
                    match outcome {
                        Outcome::Processed => report.processed += 1,
                        Outcome::Failed => report.failed += 1,
                        Outcome::Skipped => report.skipped += 1,
                    }
                });
            }
        });

        Ok(report.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    fn run_one(&self, task: &ProcessingTask) -> Outcome {
        let machine = StatusMachine::new(self.store);
        if !machine.claim_for_processing(task.pair_id, task.stage_number) {
            log::debug!(
                "Pair {} stage {} already claimed",
                task.pair_id,
                task.stage_number
            );
            return Outcome::Skipped;
        }

        match self.executor.process_task(task) {
            Ok(_) => Outcome::Processed,
            Err(e) => {
                log::error!(
                    "Post-processing pair {} stage {} failed: {}",
                    task.pair_id,
                    task.stage_number,
                    e
                );
                machine.requeue_for_processing(task.pair_id, task.stage_number);
                Outcome::Failed
            }
        }
    }
}
