use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use haio_core::config::{AgentConfig, DEFAULT_DB_PATH};
use haio_core::demo::{self, DemoParams};
use haio_core::ledger::{Ledger, RpcLedger};
use haio_core::store::StatusDb;
use haio_core::Orchestrator;

/// Where configuration, the status database and the ledger come from.
///
/// Priority for the database path:
/// 1. `--db` flag / `HAIO_DB` env var
/// 2. `DB_PATH` from the loaded configuration
/// 3. [`DEFAULT_DB_PATH`] in simulation mode
pub struct Source<'a> {
    pub config: Option<&'a Path>,
    pub db: Option<&'a Path>,
    /// Use the in-process demo ledger instead of the RPC gateway.
    pub simulate: bool,
}

impl Source<'_> {
    pub fn load_config(&self) -> anyhow::Result<AgentConfig> {
        let mut config = if self.simulate {
            demo::config(&DemoParams::default(), PathBuf::from(DEFAULT_DB_PATH))
        } else {
            AgentConfig::load(self.config).context("failed to load agent configuration")?
        };
        if let Some(db) = self.db {
            config.db_path = db.to_path_buf();
        }
        Ok(config)
    }

    /// Open the status database without requiring a full configuration when
    /// `--db` is given.
    pub fn open_store(&self) -> anyhow::Result<StatusDb> {
        let path = match self.db {
            Some(db) => db.to_path_buf(),
            None => self.load_config()?.db_path,
        };
        StatusDb::open(&path).with_context(|| format!("failed to open {}", path.display()))
    }

    pub fn ledger(&self, config: &AgentConfig) -> anyhow::Result<Arc<dyn Ledger>> {
        if self.simulate {
            return Ok(Arc::new(demo::ledger(&config.cycle, &DemoParams::default())));
        }
        let ledger = RpcLedger::new(config.rpc_url.clone(), config.commitment)
            .with_context(|| format!("failed to connect to {}", config.rpc_url))?;
        Ok(Arc::new(ledger))
    }

    pub fn orchestrator(&self) -> anyhow::Result<(AgentConfig, Arc<Orchestrator>)> {
        let config = self.load_config()?;
        let store = StatusDb::open(&config.db_path)
            .with_context(|| format!("failed to open {}", config.db_path.display()))?;
        let ledger = self.ledger(&config)?;
        let orchestrator = Orchestrator::new(ledger, Arc::new(store), config.cycle.clone());
        Ok((config, Arc::new(orchestrator)))
    }
}
