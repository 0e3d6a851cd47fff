//! In-memory registry of accepted faces.

use crate::config::Config;
use crate::similarity::{NccScorer, Similarity};
use crate::types::{FaceGrid, FaceTemplate};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry was already loaded")]
    AlreadyLoaded,
    #[error("registry already accepted {0} faces; bulk load must come first")]
    AlreadyAccepting(usize),
}

/// Deduplication policy.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// A stored template scoring strictly above this marks the candidate as seen.
    pub threshold: f32,
    /// When false every candidate is new and no scoring happens.
    pub compare: bool,
}

impl MatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.similarity_threshold,
            compare: config.use_stored_images,
        }
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            compare: true,
        }
    }
}

/// Outcome of scoring a candidate against the registry.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub is_new: bool,
    /// Highest score seen, `None` when nothing was compared.
    pub best: Option<f32>,
    /// Score against every template, in registry order.
    pub scores: Vec<f32>,
}

/// Append-only collection of accepted face templates.
pub struct FaceRegistry<S: Similarity = NccScorer> {
    templates: Vec<FaceTemplate>,
    policy: MatchPolicy,
    scorer: S,
    loaded: bool,
}

impl FaceRegistry<NccScorer> {
    pub fn new(policy: MatchPolicy) -> Self {
        Self::with_scorer(policy, NccScorer)
    }
}

impl<S: Similarity> FaceRegistry<S> {
    pub fn with_scorer(policy: MatchPolicy, scorer: S) -> Self {
        Self {
            templates: Vec::new(),
            policy,
            scorer,
            loaded: false,
        }
    }

    /// Seed the registry with previously stored faces.
    ///
    /// Allowed once, before any [`accept`](Self::accept). Later calls fail
    /// and leave the registry untouched.
    pub fn load(&mut self, initial: Vec<FaceTemplate>) -> Result<(), RegistryError> {
        if self.loaded {
            return Err(RegistryError::AlreadyLoaded);
        }
        if !self.templates.is_empty() {
            return Err(RegistryError::AlreadyAccepting(self.templates.len()));
        }

        tracing::info!(count = initial.len(), "registry loaded");
        self.templates = initial;
        self.loaded = true;
        Ok(())
    }

    /// Score `candidate` against every stored template.
    ///
    /// Always visits all templates so the full distribution is available
    /// for diagnostics; the verdict is the same as an early exit would give.
    pub fn assess(&self, candidate: &FaceGrid) -> Assessment {
        if !self.policy.compare || self.templates.is_empty() {
            return Assessment {
                is_new: true,
                best: None,
                scores: Vec::new(),
            };
        }

        let scores: Vec<f32> = self
            .templates
            .iter()
            .map(|t| self.scorer.score(candidate, t.grid()))
            .collect();

        let best = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let is_new = !scores.iter().any(|&s| s > self.policy.threshold);

        tracing::debug!(
            stored = self.templates.len(),
            similarities = %format_scores(&scores),
            is_new,
            "assessed candidate"
        );

        Assessment {
            is_new,
            best: Some(best),
            scores,
        }
    }

    /// True if no stored template is more similar than the threshold.
    pub fn is_new(&self, candidate: &FaceGrid) -> bool {
        self.assess(candidate).is_new
    }

    /// Record a face the persistence backend has confirmed under `id`.
    pub fn accept(&mut self, id: impl Into<String>, candidate: FaceGrid) {
        let template = FaceTemplate::new(id, candidate);
        tracing::debug!(id = template.id(), total = self.templates.len() + 1, "template accepted");
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[FaceTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }
}

fn format_scores(scores: &[f32]) -> String {
    scores
        .iter()
        .map(|s| format!("{s:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}
