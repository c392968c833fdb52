use crate::api;
use crate::bootstrap::{self, BootstrapResources};
use crate::config::TraplistConfig;
use crate::database::Database;
use crate::utils::{system_clock, SharedClock};
use anyhow::Result;

/// Bootstraps the backend once and hands out cloned handles for whichever
/// entrypoint needs them.
pub struct TraplistNode {
    config: TraplistConfig,
    bootstrap: BootstrapResources,
    clock: SharedClock,
}

impl TraplistNode {
    /// Creates directories and opens the migrated database.
    pub fn start(config: TraplistConfig) -> Result<Self> {
        Self::start_with_clock(config, system_clock())
    }

    pub fn start_with_clock(config: TraplistConfig, clock: SharedClock) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config)?;

        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            database_initialized = bootstrap.database_initialized,
            db_path = %config.paths.db_path.display(),
            "traplist node initialized"
        );

        Ok(Self {
            config,
            bootstrap,
            clock,
        })
    }

    /// Runs the REST API server until shutdown.
    pub async fn run_http_server(&self) -> Result<()> {
        api::serve_http(self.config.clone(), self.database(), self.clock.clone()).await
    }

    pub fn config(&self) -> &TraplistConfig {
        &self.config
    }

    /// Returns a clone of the database handle.
    pub fn database(&self) -> Database {
        self.bootstrap.database.clone()
    }
}
