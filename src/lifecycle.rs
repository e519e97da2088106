//! Status state machine
//!
//! All status writes go through [`StatusMachine`]. The transition rule is
//! enforced inside the same UPDATE that writes the new code, so a concurrent
//! writer can never slip a regression in between the check and the write.

use crate::dispatch::{Backend, Dispatcher};
use crate::models::StatusCode;
use crate::store::PairStore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("stage {stage_number} of pair {pair_id} not found")]
    StageNotFound { pair_id: i64, stage_number: i64 },
    #[error("refusing to move stage {stage_number} of pair {pair_id} from {from} to {to}")]
    Regression {
        pair_id: i64,
        stage_number: i64,
        from: StatusCode,
        to: StatusCode,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Whether a stage currently at `from` may be set to `to`
pub fn transition_allowed(from: StatusCode, to: StatusCode) -> bool {
    if to.is_terminal_failure() || from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    match (from.lifecycle_rank(), to.lifecycle_rank()) {
        (Some(from_rank), Some(to_rank)) => to_rank >= from_rank,
        _ => false,
    }
}

/// Every code a stage may currently hold for a move to `to` to be accepted
pub fn allowed_sources(to: StatusCode) -> Vec<StatusCode> {
    StatusCode::ALL
        .iter()
        .copied()
        .filter(|from| transition_allowed(*from, to))
        .collect()
}

/// Codes a stage may be requeued from for another post-processing run
const REQUEUE_SOURCES: [StatusCode; 4] = [
    StatusCode::Processing,
    StatusCode::ProcessingResults,
    StatusCode::Complete,
    StatusCode::ResultsError,
];

pub struct StatusMachine<'a, S: PairStore> {
    store: &'a S,
}

impl<'a, S: PairStore> StatusMachine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Set one stage's status, reporting why it was refused
    pub fn try_set_status(
        &self,
        pair_id: i64,
        stage_number: i64,
        code: StatusCode,
    ) -> Result<(), TransitionError> {
        if self
            .store
            .update_stage_status(pair_id, stage_number, code, &allowed_sources(code))?
        {
            return Ok(());
        }
        match self.store.get_stage_status(pair_id, stage_number)? {
            None => Err(TransitionError::StageNotFound { pair_id, stage_number }),
            Some(from) => Err(TransitionError::Regression { pair_id, stage_number, from, to: code }),
        }
    }

    /// Set one stage's status. Returns false if the write was refused or
    /// failed; the stage's state is then unknown to the caller.
    pub fn set_status(&self, pair_id: i64, stage_number: i64, code: StatusCode) -> bool {
        match self.try_set_status(pair_id, stage_number, code) {
            Ok(()) => {
                log::debug!("Pair {} stage {} -> {}", pair_id, stage_number, code);
                true
            }
            Err(e @ TransitionError::Store(_)) => {
                log::error!("{:#}", anyhow::Error::from(e));
                false
            }
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }

    /// Set every stage numbered `from_stage` or higher (`-1` for all stages)
    /// in one atomic write. Stages that would regress are left alone.
    ///
    /// Like [`kill_pair`](Self::kill_pair), returns false when the pair has
    /// no stage in that range. Nothing changing because every stage in range
    /// would regress still counts as success.
    pub fn set_all_later_statuses(&self, pair_id: i64, from_stage: i64, code: StatusCode) -> bool {
        let updated = match self
            .store
            .update_later_statuses(pair_id, from_stage, code, &allowed_sources(code))
        {
            Ok(updated) => updated,
            Err(e) => {
                log::error!("Failed to update stages of pair {}: {:#}", pair_id, e);
                return false;
            }
        };
        log::debug!("Pair {}: {} stage(s) from {} -> {}", pair_id, updated, from_stage, code);
        if updated > 0 {
            return true;
        }

        match self.store.get_pair_stages(pair_id) {
            Ok(stages) if stages.iter().any(|s| from_stage == -1 || s.stage_number >= from_stage) => {
                true
            }
            Ok(_) => {
                log::warn!("Pair {} has no stages from {} on", pair_id, from_stage);
                false
            }
            Err(e) => {
                log::error!("Failed to read stages of pair {}: {:#}", pair_id, e);
                false
            }
        }
    }

    /// Ask the backend to stop the pair, then mark the pair and every stage
    /// killed whatever the backend said
    pub fn kill_pair<B: Backend>(
        &self,
        dispatcher: &Dispatcher<'_, S, B>,
        pair_id: i64,
        handle: Option<i64>,
    ) -> bool {
        match handle {
            Some(handle) => {
                dispatcher.kill(handle);
            }
            None => log::debug!("Pair {} has no backend handle; nothing to terminate", pair_id),
        }

        match self
            .store
            .update_later_statuses(pair_id, -1, StatusCode::Killed, &StatusCode::ALL)
        {
            Ok(0) => {
                log::warn!("Pair {} has no stages to kill", pair_id);
                false
            }
            Ok(_) => {
                log::info!("Killed pair {}", pair_id);
                true
            }
            Err(e) => {
                log::error!("Failed to mark pair {} killed: {:#}", pair_id, e);
                false
            }
        }
    }

    /// Put a stage back in the post-processing queue. This is the one
    /// sanctioned backward move.
    pub fn requeue_for_processing(&self, pair_id: i64, stage_number: i64) -> bool {
        match self.store.update_stage_status(
            pair_id,
            stage_number,
            StatusCode::Processing,
            &REQUEUE_SOURCES,
        ) {
            Ok(true) => {
                log::info!("Requeued pair {} stage {} for processing", pair_id, stage_number);
                true
            }
            Ok(false) => {
                log::warn!(
                    "Pair {} stage {} cannot be requeued from its current status",
                    pair_id,
                    stage_number
                );
                false
            }
            Err(e) => {
                log::error!("Failed to requeue pair {} stage {}: {:#}", pair_id, stage_number, e);
                false
            }
        }
    }

    /// Compare-and-set claim; exactly one caller gets true per queued stage
    pub fn claim_for_processing(&self, pair_id: i64, stage_number: i64) -> bool {
        match self.store.claim_for_processing(pair_id, stage_number) {
            Ok(claimed) => claimed,
            Err(e) => {
                log::error!("Failed to claim pair {} stage {}: {:#}", pair_id, stage_number, e);
                false
            }
        }
    }
}
