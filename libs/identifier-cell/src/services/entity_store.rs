use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SequenceError;
use crate::models::{Assignment, EntityRecord, IdentifierKind};

/// Owner of the entity rows that receive public identifiers.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Rows of `kind` whose identifier is null or blank, in primary-key order.
    async fn find_unassigned(&self, kind: IdentifierKind) -> Result<Vec<EntityRecord>, SequenceError>;

    /// Writes `public_id` only if the row is still unassigned.
    ///
    /// Returns `false` when the row already carries an identifier, which
    /// happens when another backfill or a creation flow got there first.
    async fn assign(
        &self,
        kind: IdentifierKind,
        entity_id: &str,
        public_id: &str,
    ) -> Result<bool, SequenceError>;

    /// Applies every assignment or none; returns how many rows were written.
    async fn assign_batch(
        &self,
        kind: IdentifierKind,
        assignments: &[Assignment],
    ) -> Result<usize, SequenceError>;
}

/// Entity rows kept in memory. Selection is ordered by id compared as text,
/// like `order=id.asc` on a text key.
#[derive(Default)]
pub struct MemoryEntityStore {
    rows: RwLock<HashMap<IdentifierKind, Vec<EntityRecord>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, kind: IdentifierKind, record: EntityRecord) {
        self.rows.write().await.entry(kind).or_default().push(record);
    }

    /// Seeds `count` rows without identifiers, ids `<kind>-1`, `<kind>-2`, ...
    pub async fn seed_unassigned(&self, kind: IdentifierKind, count: usize) {
        let mut rows = self.rows.write().await;
        let table = rows.entry(kind).or_default();
        let start = table.len();
        for n in 1..=count {
            table.push(EntityRecord::unassigned(format!("{}-{}", kind, start + n)));
        }
    }

    pub async fn records(&self, kind: IdentifierKind) -> Vec<EntityRecord> {
        self.rows.read().await.get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn find_unassigned(&self, kind: IdentifierKind) -> Result<Vec<EntityRecord>, SequenceError> {
        let mut pending: Vec<EntityRecord> = self
            .rows
            .read()
            .await
            .get(&kind)
            .map(|table| table.iter().filter(|r| !r.has_identifier()).cloned().collect())
            .unwrap_or_default();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pending)
    }

    async fn assign(
        &self,
        kind: IdentifierKind,
        entity_id: &str,
        public_id: &str,
    ) -> Result<bool, SequenceError> {
        let mut rows = self.rows.write().await;
        let record = rows
            .get_mut(&kind)
            .and_then(|table| table.iter_mut().find(|r| r.id == entity_id))
            .ok_or_else(|| {
                SequenceError::EntityStore(format!("{} {} does not exist", kind, entity_id))
            })?;

        if record.has_identifier() {
            return Ok(false);
        }
        record.public_id = Some(public_id.to_string());
        Ok(true)
    }

    async fn assign_batch(
        &self,
        kind: IdentifierKind,
        assignments: &[Assignment],
    ) -> Result<usize, SequenceError> {
        let mut rows = self.rows.write().await;
        let table = rows.entry(kind).or_default();

        // Validate the whole batch before touching any row.
        let mut targets = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let index = table
                .iter()
                .position(|r| r.id == assignment.id)
                .ok_or_else(|| {
                    SequenceError::EntityStore(format!("{} {} does not exist", kind, assignment.id))
                })?;
            targets.push((index, assignment));
        }

        let mut written = 0;
        for (index, assignment) in targets {
            let record = &mut table[index];
            if !record.has_identifier() {
                record.public_id = Some(assignment.public_id.clone());
                written += 1;
            }
        }
        Ok(written)
    }
}
