//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use datachat_core::{BackendConfig, BackendKind, PipelineConfig};

/// Runtime configuration for datachat-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.  Unparseable values fall back to
/// the default.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite database URL (default: `"sqlite://datachat.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Serve the OpenAPI document and Swagger UI.
    pub enable_swagger: bool,

    /// Comma-separated CORS allow-list; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Worker pool, queue, stage policies and long-poll settings.
    pub pipeline: PipelineConfig,

    /// Execution backend selection and LLM connection.
    pub backend: BackendConfig,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(&lookup);

        let mut pipeline = PipelineConfig::default();
        pipeline.workers = env.parse("DATACHAT_WORKERS", pipeline.workers);
        pipeline.queue_capacity = env.parse("DATACHAT_QUEUE_CAPACITY", pipeline.queue_capacity);
        pipeline.row_cap = env.parse("DATACHAT_ROW_CAP", pipeline.row_cap);
        pipeline.history_window = env.parse("DATACHAT_HISTORY_WINDOW", pipeline.history_window);
        pipeline.translate.deadline = env.secs("DATACHAT_TRANSLATE_TIMEOUT_SECS", pipeline.translate.deadline);
        pipeline.translate.backoff = env.secs("DATACHAT_TRANSLATE_BACKOFF_SECS", pipeline.translate.backoff);
        pipeline.execute.deadline = env.secs("DATACHAT_EXECUTE_TIMEOUT_SECS", pipeline.execute.deadline);
        pipeline.persist.deadline = env.secs("DATACHAT_PERSIST_TIMEOUT_SECS", pipeline.persist.deadline);
        pipeline.shutdown_grace = env.secs("DATACHAT_SHUTDOWN_GRACE_SECS", pipeline.shutdown_grace);
        pipeline.poll.interval = Duration::from_millis(env.parse(
            "DATACHAT_POLL_INTERVAL_MS",
            pipeline.poll.interval.as_millis() as u64,
        ));
        pipeline.poll.max_wait = env.secs("DATACHAT_POLL_MAX_WAIT_SECS", pipeline.poll.max_wait);
        pipeline.poll.enabled = env.flag("DATACHAT_POLL_ENABLED", pipeline.poll.enabled);

        let defaults = BackendConfig::default();
        let backend = BackendConfig {
            kind: env.parse::<BackendKind>("COMPUTE_BACKEND", defaults.kind),
            base_url: env.or("OPENAI_BASE_URL", &defaults.base_url),
            api_key: env.get("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: env.or("OPENAI_MODEL", &defaults.model),
            http_timeout: env.secs("DATACHAT_LLM_TIMEOUT_SECS", defaults.http_timeout),
        };

        Self {
            bind_address: env.or("DATACHAT_BIND", "0.0.0.0:3000"),
            database_url: env.or("DATACHAT_DATABASE_URL", "sqlite://datachat.db"),
            log_level: env.or("DATACHAT_LOG", "info"),
            log_json: env.flag("DATACHAT_LOG_JSON", false),
            enable_swagger: env.flag("DATACHAT_ENABLE_SWAGGER", true),
            cors_allowed_origins: env.get("DATACHAT_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            pipeline,
            backend,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        Duration::from_secs(self.parse(key, default.as_secs()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(cfg.pipeline.workers, 4);
        assert_eq!(cfg.pipeline.poll.max_wait, Duration::from_secs(20));
        assert_eq!(cfg.backend.kind, BackendKind::Sql);
        assert!(cfg.backend.api_key.is_none());
        assert!(cfg.enable_swagger);
        assert!(!cfg.log_json);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("COMPUTE_BACKEND", "getting_started"),
            ("OPENAI_API_KEY", "sk-test"),
            ("DATACHAT_WORKERS", "8"),
            ("DATACHAT_POLL_INTERVAL_MS", "250"),
            ("DATACHAT_POLL_ENABLED", "false"),
            ("DATACHAT_LOG_JSON", "1"),
            ("DATACHAT_SHUTDOWN_GRACE_SECS", "5"),
        ]);
        assert_eq!(cfg.backend.kind, BackendKind::Profile);
        assert_eq!(cfg.backend.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.pipeline.workers, 8);
        assert_eq!(cfg.pipeline.poll.interval, Duration::from_millis(250));
        assert!(!cfg.pipeline.poll.enabled);
        assert!(cfg.log_json);
        assert_eq!(cfg.pipeline.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("DATACHAT_WORKERS", "many"),
            ("COMPUTE_BACKEND", "pandas"),
            ("OPENAI_API_KEY", "  "),
        ]);
        assert_eq!(cfg.pipeline.workers, 4);
        assert_eq!(cfg.backend.kind, BackendKind::Sql);
        assert!(cfg.backend.api_key.is_none());
    }
}
