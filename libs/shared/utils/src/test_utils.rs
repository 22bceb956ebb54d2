use std::sync::Arc;
use serde_json::json;

use shared_config::{AppConfig, BackfillPolicy, CounterBackend};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub admin_api_token: String,
    pub backfill_policy: BackfillPolicy,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            admin_api_token: "test-admin-token".to_string(),
            backfill_policy: BackfillPolicy::AllOrNothing,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            database_url: None,
            redis_url: None,
            counter_backend: CounterBackend::Memory,
            lock_timeout_ms: 1_000,
            max_conflict_retries: 5,
            backfill_policy: self.backfill_policy,
            admin_api_token: self.admin_api_token.clone(),
            server_port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.admin_api_token)
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    /// Rows as PostgREST returns them for `select=id,<column>`.
    pub fn unassigned_rows(column: &str, ids: &[&str]) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| json!({ "id": id, column: null }))
            .collect();
        json!(rows)
    }

    pub fn assigned_row(id: &str, column: &str, value: &str) -> serde_json::Value {
        json!([{ "id": id, column: value }])
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
