//! Per-invocation wiring of config, installation paths and stores
//!
//! Nothing here is global: every command builds its own [`Context`], and
//! tests build one over a temp directory.

use ckpt_core::{config, CheckpointHome, ConfigStore, LockPolicy};
use journal::MetadataStore;
use shadow::{ShadowOptions, ShadowRepository};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Context {
    pub home: CheckpointHome,
    pub config: ConfigStore,
    pub metadata: MetadataStore,
    options: ShadowOptions,
}

impl Context {
    pub fn new(home: CheckpointHome, config: ConfigStore) -> Self {
        let (options, errors) = ShadowOptions::from_config(&config);
        for error in errors {
            tracing::warn!("{}", error);
        }
        let metadata = MetadataStore::open(&home, LockPolicy::with_timeout(config.lock_timeout()));

        Self {
            home,
            config,
            metadata,
            options,
        }
    }

    /// Load the config (`--config` wins over `CKPT_CONFIG`) for a known home
    pub fn load(home: CheckpointHome, config_override: Option<&Path>) -> Self {
        let config = match config_override {
            Some(path) => ConfigStore::load(path),
            None => ConfigStore::load_default(),
        };
        Self::new(home, config)
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.options.lock_policy
    }

    pub fn options(&self) -> &ShadowOptions {
        &self.options
    }

    /// Shadow repository handle for a project directory
    pub fn shadow(&self, project: &Path) -> ckpt_core::Result<ShadowRepository> {
        ShadowRepository::open(&self.home, project, self.options.clone())
    }

    /// Run a metadata operation off the async runtime
    ///
    /// The metadata lock is a blocking flock wait.
    pub async fn metadata<T, F>(&self, f: F) -> ckpt_core::Result<T>
    where
        F: FnOnce(&MetadataStore) -> ckpt_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.metadata.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ckpt_core::CheckpointError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    /// Where the effective config came from, for display
    pub fn config_location(&self) -> Option<std::path::PathBuf> {
        self.config
            .source()
            .map(Path::to_path_buf)
            .or_else(config::default_path)
    }
}
