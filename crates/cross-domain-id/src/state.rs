//! Join state for one resolution.

use crate::{CrossDomainId, LookupOutcome, ResolveError, ResolveResult};

/// Outcomes collected from the candidate domains of one resolution.
///
/// Outcomes are recorded by priority index as they arrive. The decision made
/// by [`ResolverState::finish`] depends only on the recorded outcomes and the
/// candidate order, never on arrival order.
#[derive(Debug, Clone)]
pub struct ResolverState {
    candidates: Vec<String>,
    outcomes: Vec<Option<LookupOutcome>>,
    outstanding: usize,
    fallback_id: String,
}

impl ResolverState {
    /// `fallback_id` is used if no domain knows the visitor.
    pub fn new(candidates: Vec<String>, fallback_id: String) -> Self {
        let outstanding = candidates.len();
        Self {
            outcomes: vec![None; outstanding],
            candidates,
            outstanding,
            fallback_id,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding == 0
    }

    /// Record the outcome for candidate `index`. Repeated reports are ignored.
    pub fn record(&mut self, index: usize, outcome: LookupOutcome) {
        if let Some(slot) = self.outcomes.get_mut(index) {
            if slot.is_none() {
                *slot = Some(outcome);
                self.outstanding -= 1;
            }
        }
    }

    /// Best answer so far in priority order.
    pub fn best(&self) -> Option<CrossDomainId> {
        self.candidates
            .iter()
            .zip(&self.outcomes)
            .find_map(|(domain, outcome)| match outcome {
                Some(LookupOutcome::Found(id)) => Some(CrossDomainId {
                    cross_domain_id: id.clone(),
                    from_domain: domain.clone(),
                }),
                _ => None,
            })
    }

    /// Reduce the recorded outcomes into one decision.
    ///
    /// Unsettled candidates count as failures.
    pub fn finish(self, current_host: &str) -> ResolveResult<CrossDomainId> {
        if let Some(found) = self.best() {
            return Ok(found);
        }

        let any_answered = self
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome, Some(LookupOutcome::Empty)));
        if any_answered || self.candidates.is_empty() {
            return Ok(CrossDomainId {
                cross_domain_id: self.fallback_id,
                from_domain: current_host.to_string(),
            });
        }

        let reason = self
            .outcomes
            .into_iter()
            .find_map(|outcome| match outcome {
                Some(LookupOutcome::Failed(reason)) => Some(reason),
                _ => None,
            })
            .unwrap_or_else(|| "lookup did not complete".to_string());
        Err(ResolveError::Lookup(reason))
    }
}
