//! Locating and loading the portfolio.
//!
//! Lookup order for the portfolio directory:
//! 1. `CLAWPM_PORTFOLIO`, if it holds a `portfolio.toml`
//! 2. `~/clawpm`

use super::types::{PORTFOLIO_FILE, PortfolioConfig, expand_tilde};
use crate::error::PmError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment override for the portfolio directory.
pub const PORTFOLIO_ENV: &str = "CLAWPM_PORTFOLIO";
/// Environment override for the context file.
pub const CONTEXT_FILE_ENV: &str = "CLAWPM_CONTEXT_FILE";
/// Default context file name in the home directory.
pub const CONTEXT_FILE_NAME: &str = ".clawpm-context";

/// Where configuration lives on this machine.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Portfolio directory candidates, highest priority first.
    pub portfolio_dirs: Vec<PathBuf>,
    /// File holding the `use`d project id.
    pub context_file: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover paths from the environment and the home directory.
    pub fn discover() -> Self {
        let mut portfolio_dirs = Vec::new();
        if let Ok(dir) = std::env::var(PORTFOLIO_ENV)
            && !dir.trim().is_empty()
        {
            portfolio_dirs.push(expand_tilde(dir));
        }
        if let Some(home) = dirs::home_dir() {
            portfolio_dirs.push(home.join("clawpm"));
        }

        let context_file = std::env::var(CONTEXT_FILE_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(expand_tilde)
            .or_else(|| dirs::home_dir().map(|h| h.join(CONTEXT_FILE_NAME)));

        Self {
            portfolio_dirs,
            context_file,
        }
    }

    /// Create paths with explicit locations.
    pub fn with_dirs(portfolio_dir: Option<PathBuf>, context_file: Option<PathBuf>) -> Self {
        Self {
            portfolio_dirs: portfolio_dir.into_iter().collect(),
            context_file,
        }
    }

    /// First candidate directory that holds a `portfolio.toml`.
    pub fn portfolio_dir(&self) -> Option<&Path> {
        self.portfolio_dirs
            .iter()
            .find(|dir| dir.join(PORTFOLIO_FILE).is_file())
            .map(PathBuf::as_path)
    }
}

/// Loaded portfolio plus the paths it was found through.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    portfolio: PortfolioConfig,
    portfolio_file: PathBuf,
}

impl ConfigLoader {
    /// Discover and load the portfolio.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load the portfolio through explicit paths. Fails with
    /// `PORTFOLIO_NOT_FOUND` when no candidate holds a `portfolio.toml`.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let dir = paths
            .portfolio_dir()
            .ok_or_else(PmError::portfolio_not_found)?
            .to_path_buf();
        let portfolio_file = dir.join(PORTFOLIO_FILE);
        let portfolio = PortfolioConfig::load(&portfolio_file)?;
        debug!(
            file = %portfolio_file.display(),
            roots = portfolio.project_roots.len(),
            "Loaded portfolio"
        );
        Ok(Self {
            paths,
            portfolio,
            portfolio_file,
        })
    }

    pub fn portfolio(&self) -> &PortfolioConfig {
        &self.portfolio
    }

    pub fn portfolio_file(&self) -> &Path {
        &self.portfolio_file
    }

    pub fn context_file(&self) -> Option<&Path> {
        self.paths.context_file.as_deref()
    }
}
