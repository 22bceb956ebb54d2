use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which durable store backs the identifier counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    Postgres,
    Redis,
    Memory,
}

impl FromStr for CounterBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(CounterBackend::Postgres),
            "redis" => Ok(CounterBackend::Redis),
            "memory" => Ok(CounterBackend::Memory),
            other => Err(format!("unknown counter backend '{}'", other)),
        }
    }
}

/// How a backfill run commits the identifiers it assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackfillPolicy {
    /// Every selected row is assigned in one atomic batch or none is.
    #[default]
    AllOrNothing,
    /// Rows are assigned one at a time; progress survives a mid-run failure.
    PerRow,
}

impl FromStr for BackfillPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all_or_nothing" | "all-or-nothing" | "batch" => Ok(BackfillPolicy::AllOrNothing),
            "per_row" | "per-row" | "row" => Ok(BackfillPolicy::PerRow),
            other => Err(format!("unknown backfill policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub counter_backend: CounterBackend,
    pub lock_timeout_ms: u64,
    pub max_conflict_retries: u32,
    pub backfill_policy: BackfillPolicy,
    pub admin_api_token: String,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            counter_backend: parse_or_default("COUNTER_BACKEND", CounterBackend::Memory),
            lock_timeout_ms: parse_or_default("COUNTER_LOCK_TIMEOUT_MS", 5_000),
            max_conflict_retries: parse_or_default("COUNTER_MAX_CONFLICT_RETRIES", 5),
            backfill_policy: parse_or_default("BACKFILL_POLICY", BackfillPolicy::AllOrNothing),
            admin_api_token: env::var("ADMIN_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("ADMIN_API_TOKEN not set, admin routes will reject every request");
                    String::new()
                }),
            server_port: parse_or_default("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let backend_ready = match self.counter_backend {
            CounterBackend::Postgres => self.database_url.is_some(),
            CounterBackend::Redis => self.redis_url.is_some(),
            CounterBackend::Memory => true,
        };

        backend_ready && self.is_entity_store_configured()
    }

    pub fn is_entity_store_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}

fn parse_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("{} has invalid value ({}), using default {:?}", name, e, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {:?}", name, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_backend_parsing() {
        assert_eq!("Postgres".parse::<CounterBackend>(), Ok(CounterBackend::Postgres));
        assert_eq!(" redis ".parse::<CounterBackend>(), Ok(CounterBackend::Redis));
        assert_eq!("memory".parse::<CounterBackend>(), Ok(CounterBackend::Memory));
        assert!("sqlite".parse::<CounterBackend>().is_err());
    }

    #[test]
    fn test_backfill_policy_parsing() {
        assert_eq!("all_or_nothing".parse::<BackfillPolicy>(), Ok(BackfillPolicy::AllOrNothing));
        assert_eq!("per-row".parse::<BackfillPolicy>(), Ok(BackfillPolicy::PerRow));
        assert!("sometimes".parse::<BackfillPolicy>().is_err());
    }

    #[test]
    fn test_is_configured_depends_on_backend() {
        let mut config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "service-key".to_string(),
            database_url: None,
            redis_url: None,
            counter_backend: CounterBackend::Postgres,
            lock_timeout_ms: 5_000,
            max_conflict_retries: 5,
            backfill_policy: BackfillPolicy::AllOrNothing,
            admin_api_token: "admin".to_string(),
            server_port: 3000,
        };
        assert!(!config.is_configured());

        config.database_url = Some("postgres://localhost/identifiers".to_string());
        assert!(config.is_configured());

        config.counter_backend = CounterBackend::Memory;
        config.supabase_service_key.clear();
        assert!(!config.is_configured());
    }
}
