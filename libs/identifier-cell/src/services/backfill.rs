use std::sync::Arc;

use tracing::{debug, info, warn};

use shared_config::BackfillPolicy;

use crate::error::SequenceError;
use crate::models::{Assignment, IdentifierKind};
use crate::services::allocator::SequenceAllocator;
use crate::services::entity_store::EntityStore;

/// Retrofits public identifiers onto rows created without one.
///
/// Only rows whose identifier is still missing are selected, so a run after
/// a successful run is a no-op and a run after a failed one only touches
/// what is left. Identifiers come from the allocator one row at a time, so
/// backfills and live entity creation for the same kind interleave safely.
pub struct BackfillRunner {
    allocator: Arc<SequenceAllocator>,
    entities: Arc<dyn EntityStore>,
    policy: BackfillPolicy,
}

impl BackfillRunner {
    pub fn new(
        allocator: Arc<SequenceAllocator>,
        entities: Arc<dyn EntityStore>,
        policy: BackfillPolicy,
    ) -> Self {
        Self {
            allocator,
            entities,
            policy,
        }
    }

    pub fn policy(&self) -> BackfillPolicy {
        self.policy
    }

    /// Assigns identifiers to every unassigned row of `kind` and returns how
    /// many rows received one.
    pub async fn backfill(&self, kind: IdentifierKind) -> Result<usize, SequenceError> {
        let pending = self
            .entities
            .find_unassigned(kind)
            .await
            .map_err(|e| partial_failure(kind, 0, e))?;

        if pending.is_empty() {
            debug!("No {} rows need an identifier", kind);
            return Ok(0);
        }

        info!(
            "Backfilling {} {} identifiers ({:?})",
            pending.len(),
            kind,
            self.policy
        );

        let assigned = match self.policy {
            BackfillPolicy::AllOrNothing => {
                let mut assignments = Vec::with_capacity(pending.len());
                for record in &pending {
                    let public_id = self
                        .allocator
                        .issue(kind)
                        .await
                        .map_err(|e| partial_failure(kind, 0, e))?;
                    assignments.push(Assignment {
                        id: record.id.clone(),
                        public_id,
                    });
                }

                self.entities
                    .assign_batch(kind, &assignments)
                    .await
                    .map_err(|e| partial_failure(kind, 0, e))?
            }
            BackfillPolicy::PerRow => {
                let mut assigned = 0;
                for record in &pending {
                    let public_id = self
                        .allocator
                        .issue(kind)
                        .await
                        .map_err(|e| partial_failure(kind, assigned, e))?;

                    let written = self
                        .entities
                        .assign(kind, &record.id, &public_id)
                        .await
                        .map_err(|e| partial_failure(kind, assigned, e))?;

                    if written {
                        assigned += 1;
                    } else {
                        // Someone else assigned it meanwhile; the number we took stays unused.
                        warn!("{} {} was assigned concurrently, discarding {}", kind, record.id, public_id);
                    }
                }
                assigned
            }
        };

        info!("Assigned {} {} identifiers", assigned, kind);
        Ok(assigned)
    }

    /// Runs [`backfill`](Self::backfill) for every identifier kind in turn,
    /// stopping at the first failure.
    pub async fn backfill_all(&self) -> Result<Vec<(IdentifierKind, usize)>, SequenceError> {
        let mut report = Vec::with_capacity(IdentifierKind::ALL.len());
        for kind in IdentifierKind::ALL {
            let assigned = self.backfill(kind).await?;
            report.push((kind, assigned));
        }
        Ok(report)
    }
}

fn partial_failure(kind: IdentifierKind, assigned: usize, source: SequenceError) -> SequenceError {
    SequenceError::PartialBackfillFailure {
        kind,
        assigned,
        reason: source.to_string(),
    }
}
