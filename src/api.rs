//! Public core surface for host applications
//!
//! A host embeds the core by supplying the collaborator callbacks at init
//! time; everything else (cycles, balancers, caches) runs behind this
//! facade.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::callbacks::Callbacks;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::settings::Settings;

/// Install the tracing subscriber, tolerant of one already being set
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prospector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Embeddable core handle
pub struct Prospector {
    settings: Arc<Settings>,
    orchestrator: Arc<Orchestrator>,
}

impl Prospector {
    /// Initialize the core.
    ///
    /// `files_dir` roots all runtime artifacts; `secrets_path` optionally
    /// names a `KEY=VALUE` file layered over the defaults; `callbacks`
    /// supplies the engine, HTTP, messaging, and event collaborators.
    pub fn init(files_dir: &str, secrets_path: Option<&str>, callbacks: Callbacks) -> Result<Self> {
        init_tracing();

        let settings = Arc::new(Settings::new());
        settings.set_files_dir(files_dir);
        if let Some(path) = secrets_path {
            let applied = settings.load_env_file(path);
            info!("Loaded {} settings from secrets file", applied);
        }
        std::fs::create_dir_all(settings.runtime_dir())?;

        let orchestrator = Orchestrator::new(settings.clone(), callbacks);
        info!("Core initialized (files_dir: {})", files_dir);
        Ok(Prospector {
            settings,
            orchestrator,
        })
    }

    /// Start the balancers and the autonomous cycle loop
    pub async fn start(&self) {
        self.orchestrator.clone().start().await;
    }

    /// Stop all loops and engine instances
    pub async fn stop(&self) {
        self.orchestrator.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Run one hunt cycle now; concurrent calls queue
    pub async fn run_cycle(&self) -> Result<()> {
        self.orchestrator.run_cycle().await
    }

    /// Full status snapshot as JSON
    pub fn status(&self) -> Value {
        self.orchestrator.status()
    }

    /// Validate settings, returning human-readable problems in order
    pub fn validate_config(&self) -> Vec<String> {
        self.settings.validate()
    }

    /// Cached configs for display: persisted seed, else the gold file
    pub fn cached_configs(&self) -> Value {
        self.orchestrator.cached_configs()
    }

    /// Set a config value from its string form; false if uncoercible
    pub fn set_config(&self, key: &str, value: &str) -> bool {
        self.settings.set_from_str(key, value)
    }

    /// Render a config value as a string
    pub fn get_config(&self, key: &str) -> Option<String> {
        self.settings.get_rendered(key)
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Tear the core down, stopping everything first
    pub async fn destroy(self) {
        self.stop().await;
        info!("Core destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::test_support::{MockEngine, MockHttp, MockMessaging};
    use std::io::Write;

    fn core(dir: &tempfile::TempDir) -> Prospector {
        let callbacks = Callbacks::new(
            Arc::new(MockEngine::new((204, 100.0))),
            Arc::new(MockHttp::default()),
            Arc::new(MockMessaging::default()),
        );
        Prospector::init(dir.path().to_str().unwrap(), None, callbacks).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_creates_runtime_dir() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir);
        assert!(dir.path().join("runtime").is_dir());
        assert!(!core.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_loads_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "API_ID=777").unwrap();
        writeln!(file, "PROSPECTOR_SLEEP=120").unwrap();
        file.flush().unwrap();

        let callbacks = Callbacks::new(
            Arc::new(MockEngine::new((204, 100.0))),
            Arc::new(MockHttp::default()),
            Arc::new(MockMessaging::default()),
        );
        let core = Prospector::init(
            dir.path().to_str().unwrap(),
            file.path().to_str(),
            callbacks,
        )
        .unwrap();

        assert_eq!(core.get_config("api_id").as_deref(), Some("777"));
        assert_eq!(core.get_config("sleep_seconds").as_deref(), Some("120"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir);

        assert!(core.set_config("max_total", "500"));
        assert_eq!(core.get_config("max_total").as_deref(), Some("500"));
        assert!(!core.set_config("max_total", "oops"));
        assert!(core.get_config("no_such_key").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_config_reports_problems() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir);

        let errors = core.validate_config();
        // Credentials are unset in a fresh core
        assert!(errors.iter().any(|e| e.contains("api_id")));

        core.set_config("timeout_seconds", "0");
        let errors = core.validate_config();
        assert!(errors
            .iter()
            .any(|e| e == "timeout_seconds must be between 1 and 60"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_shape() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir);

        let status = core.status();
        assert_eq!(status["running"], false);
        assert_eq!(status["cycle_count"], 0);
        assert!(status["balancer"].is_object());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_configs_empty_initially() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir);
        assert_eq!(core.cached_configs(), serde_json::json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(&dir);
        core.start().await;
        assert!(core.is_running());
        core.destroy().await;
    }
}
