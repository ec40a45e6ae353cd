//! Routing of extracted fact candidates: auto-commit or confirmation queue.
//!
//! The two-tier policy keeps a single misheard or hallucinated value from
//! silently corrupting a profile. A candidate is queued for confirmation
//! when the extractor flagged it, or when it would change a committed
//! value — any overwrite is treated as risky regardless of the new
//! confidence score. Only brand-new kinds auto-commit; unchanged
//! duplicates are skipped.

use super::store::{ConfirmationParams, ProfileStore};
use super::types::{FactCandidate, RoutingReport};
use crate::error::Result;

/// Route one batch of candidates against the user's committed facts.
///
/// Candidates are processed in extractor order, so a later candidate in
/// the same batch sees the facts an earlier one committed.
pub fn route_candidates(
    store: &ProfileStore,
    user_id: &str,
    candidates: &[FactCandidate],
    source: &str,
    turn_text: &str,
) -> Result<RoutingReport> {
    let mut report = RoutingReport::default();

    for candidate in candidates {
        let existing = store.active_fact(user_id, candidate.kind)?;
        let is_change = existing
            .as_ref()
            .is_some_and(|fact| fact.value != candidate.value);

        if candidate.requires_confirmation || is_change {
            store.queue_confirmation(&ConfirmationParams {
                user_id,
                kind: candidate.kind,
                old_value: existing.as_ref().map(|f| f.value.as_str()),
                new_value: &candidate.value,
                source,
                confidence: candidate.confidence,
                turn_text,
            })?;
            report.queued.push(candidate.kind);
        } else if existing.is_none() {
            store.commit_fact(user_id, candidate, source)?;
            report.committed.push(candidate.kind);
        } else {
            tracing::debug!(
                user_id,
                kind = %candidate.kind,
                "duplicate fact skipped"
            );
            report.skipped.push(candidate.kind);
        }
    }

    Ok(report)
}
