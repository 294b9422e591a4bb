//! Trainer phases and the state threaded through a run

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::booster::BoostedEnsemble;
use crate::encoding::FeatureEncoder;
use crate::error::{MemboostError, Result};
use crate::metrics::TrainSample;

/// Per-chunk step of the chunked path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStep {
    LoadChunk,
    Encode,
    Align,
    Boost,
    Release,
}

impl ChunkStep {
    fn next(self) -> Option<ChunkStep> {
        match self {
            ChunkStep::LoadChunk => Some(ChunkStep::Encode),
            ChunkStep::Encode => Some(ChunkStep::Align),
            ChunkStep::Align => Some(ChunkStep::Boost),
            ChunkStep::Boost => Some(ChunkStep::Release),
            ChunkStep::Release => None,
        }
    }
}

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Planning,
    FullBatch,
    ChunkedTraining { chunk: usize, step: ChunkStep },
    Aggregating,
    Done,
}

impl Phase {
    pub fn chunk(chunk: usize, step: ChunkStep) -> Self {
        Phase::ChunkedTraining { chunk, step }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: Phase) -> bool {
        use ChunkStep::*;
        use Phase::*;

        match (self, next) {
            (Idle, Planning) | (Planning, FullBatch) | (FullBatch, Aggregating) | (Aggregating, Done) => true,
            (Planning, ChunkedTraining { chunk: 0, step: LoadChunk }) => true,
            (ChunkedTraining { chunk: a, step: s }, ChunkedTraining { chunk: b, step: t }) => {
                (a == b && s.next() == Some(t)) || (b == a + 1 && s == Release && t == LoadChunk)
            }
            // A load that finds no rows ends the loop early
            (ChunkedTraining { step: LoadChunk | Release, .. }, Aggregating) => true,
            _ => false,
        }
    }
}

/// Everything one run owns, moved from step to step
pub struct TrainerState {
    pub(super) phase: Phase,
    pub(super) ensemble: Option<BoostedEnsemble>,
    pub(super) encoder: FeatureEncoder,
    pub(super) train_sample: TrainSample,
    pub(super) rounds_applied: Vec<usize>,
    pub(super) chunks_processed: usize,
}

impl TrainerState {
    pub fn new(encoder: FeatureEncoder, train_sample: TrainSample) -> Self {
        Self {
            phase: Phase::Idle,
            ensemble: None,
            encoder,
            train_sample,
            rounds_applied: Vec::new(),
            chunks_processed: 0,
        }
    }

    /// Swap the encoder before any block has been encoded
    pub(super) fn with_encoder(mut self, encoder: FeatureEncoder) -> Self {
        debug_assert!(self.encoder.schema().is_none());
        self.encoder = encoder;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(mut self, next: Phase) -> Result<Self> {
        if !self.phase.can_transition_to(next) {
            return Err(MemboostError::StateError(format!("{:?} -> {:?}", self.phase, next)));
        }
        trace!(from = ?self.phase, to = ?next, "Trainer transition");
        self.phase = next;
        Ok(self)
    }

    pub fn ensemble(&self) -> Option<&BoostedEnsemble> {
        self.ensemble.as_ref()
    }

    /// Boosting rounds applied per chunk, in chunk order
    pub fn rounds_applied(&self) -> &[usize] {
        &self.rounds_applied
    }

    pub fn chunks_processed(&self) -> usize {
        self.chunks_processed
    }
}
