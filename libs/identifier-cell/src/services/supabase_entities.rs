use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::SequenceError;
use crate::models::{Assignment, EntityRecord, IdentifierKind};
use crate::services::entity_store::EntityStore;

const ASSIGN_BATCH_RPC: &str = "/rest/v1/rpc/assign_public_identifiers";
/// PostgREST's default `max-rows`; a shorter page is the last one.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Entity rows living in the Supabase database, reached through PostgREST.
pub struct SupabaseEntityStore {
    supabase: SupabaseClient,
    page_size: usize,
}

impl SupabaseEntityStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Must not exceed the server's `max-rows`, or pages come back short.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn unassigned_filter(kind: IdentifierKind) -> String {
        let column = kind.column();
        format!("or=({}.is.null,{}.eq.)", column, column)
    }
}

fn entity_store_error(err: anyhow::Error) -> SequenceError {
    SequenceError::EntityStore(err.to_string())
}

// PostgREST returns uuid and bigint keys alike; keep them as text.
fn id_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl EntityStore for SupabaseEntityStore {
    async fn find_unassigned(&self, kind: IdentifierKind) -> Result<Vec<EntityRecord>, SequenceError> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let path = format!(
                "/rest/v1/{}?select=id,{}&{}&order=id.asc&limit={}&offset={}",
                kind.table(),
                kind.column(),
                Self::unassigned_filter(kind),
                self.page_size,
                offset
            );

            let rows: Vec<Value> = self
                .supabase
                .request(Method::GET, &path, None)
                .await
                .map_err(entity_store_error)?;

            for row in &rows {
                let id = id_as_string(&row["id"]).ok_or_else(|| {
                    SequenceError::EntityStore(format!("{} row without usable id: {}", kind, row))
                })?;
                records.push(EntityRecord {
                    id,
                    public_id: row[kind.column()].as_str().map(str::to_string),
                });
            }

            if rows.len() < self.page_size {
                break;
            }
            offset += rows.len();
        }

        debug!("Found {} {} rows without identifiers", records.len(), kind);
        Ok(records)
    }

    async fn assign(
        &self,
        kind: IdentifierKind,
        entity_id: &str,
        public_id: &str,
    ) -> Result<bool, SequenceError> {
        // The unassigned filter turns the PATCH into a conditional write.
        let path = format!(
            "/rest/v1/{}?id=eq.{}&{}",
            kind.table(),
            urlencoding::encode(entity_id),
            Self::unassigned_filter(kind)
        );

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let updated: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(json!({ kind.column(): public_id })),
                Some(headers),
            )
            .await
            .map_err(entity_store_error)?;

        Ok(!updated.is_empty())
    }

    async fn assign_batch(
        &self,
        kind: IdentifierKind,
        assignments: &[Assignment],
    ) -> Result<usize, SequenceError> {
        if assignments.is_empty() {
            return Ok(0);
        }

        let body = json!({
            "target_table": kind.table(),
            "target_column": kind.column(),
            "assignments": assignments,
        });

        let written: i64 = self
            .supabase
            .request(Method::POST, ASSIGN_BATCH_RPC, Some(body))
            .await
            .map_err(entity_store_error)?;

        usize::try_from(written).map_err(|_| {
            SequenceError::EntityStore(format!("batch assignment reported {} rows", written))
        })
    }
}
