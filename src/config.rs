use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logic::FillDepth;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,

    /// Directory of the config file this was loaded from, if any
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Location of the store document. Relative paths are taken relative to
    /// the config file's directory.
    pub path: PathBuf,
    /// Create an empty store when none exists at `path`
    pub initialize: bool,
    /// How far tree reads fill references: a level count or "full"
    pub fill_depth: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            config_dir: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cfgmgr.json"),
            initialize: true,
            fill_depth: "1".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `cfgmgr.{toml,yaml,json}` in the
    /// working directory, and `CFGMGR_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], reading `config_file` instead of the default file
    pub fn load_from(config_file: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = match config_file {
            Some(path) => config.add_source(config::File::from(path).required(true)),
            None => config.add_source(config::File::with_name("cfgmgr").required(false)),
        };

        // Add environment variables with prefix "CFGMGR_", e.g. CFGMGR_STORE__FILL_DEPTH
        config = config.add_source(
            config::Environment::with_prefix("CFGMGR")
                .separator("__")
                .prefix_separator("_"),
        );

        let mut app_config: AppConfig = config.build()?.try_deserialize()?;
        app_config.config_dir = config_file
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);

        Ok(app_config)
    }

    /// Store path, resolved against the config file's directory when relative
    pub fn document_path(&self) -> PathBuf {
        match &self.config_dir {
            Some(dir) if self.store.path.is_relative() => dir.join(&self.store.path),
            _ => self.store.path.clone(),
        }
    }

    pub fn fill_depth(&self) -> anyhow::Result<FillDepth> {
        self.store
            .fill_depth
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid store.fill_depth {:?}: {}", self.store.fill_depth, err))
    }
}
