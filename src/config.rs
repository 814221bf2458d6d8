//! Configuration loading from clocktune.toml and pyproject.toml.
//!
//! - Standalone `clocktune.toml` in the working directory
//! - `[tool.clocktune]` section in pyproject.toml, found by walking up
//!
//! Every key has a default, so a missing file is fine. A file that exists but
//! does not parse is an error. CLI flags override whatever is loaded here.
//!
//! ## Example
//!
//! ```toml
//! [dataset]
//! dir = "dataset"
//! clock-types = ["analog"]
//!
//! [model]
//! model = "gpt-4o"
//! timeout-secs = 60
//!
//! [optimizer]
//! num-iterations = 5
//! samples-per-iteration = 15
//! on-rewrite-failure = "continue"
//!
//! [output]
//! dir = "results"
//! plots = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reader::openai::ModelConfig;
use crate::training::optimizer::OptimizerConfig;
use crate::types::ClockType;

pub const CONFIG_FILE: &str = "clocktune.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DatasetConfig {
    /// Directory holding metadata.json and the images
    pub dir: PathBuf,
    /// Restrict to these clock types; empty means all
    pub clock_types: Vec<ClockType>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dataset"),
            clock_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Where reports, history and the optimized prompt are written
    pub dir: PathBuf,
    /// Write PNG charts (needs the `plotters` feature)
    pub plots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            plots: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// File this config came from (for display)
    #[serde(skip)]
    pub source: Option<PathBuf>,
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    pub output: OutputConfig,
}

/// Wrapper for pyproject.toml structure.
#[derive(Debug, Deserialize)]
struct PyProject {
    tool: Option<PyProjectTool>,
}

#[derive(Debug, Deserialize)]
struct PyProjectTool {
    clocktune: Option<Config>,
}

impl Config {
    /// Load configuration for `directory`.
    ///
    /// Search order:
    /// 1. clocktune.toml in directory
    /// 2. pyproject.toml `[tool.clocktune]`, in directory then its ancestors
    /// 3. defaults
    pub fn load(directory: &Path) -> Result<Self> {
        let standalone = directory.join(CONFIG_FILE);
        if standalone.exists() {
            return Self::from_file(&standalone);
        }

        for dir in directory.ancestors() {
            let pyproject = dir.join("pyproject.toml");
            if pyproject.exists() {
                if let Some(config) = Self::from_pyproject(&pyproject)? {
                    return Ok(config);
                }
            }
        }

        Ok(Self::default())
    }

    /// Load a standalone config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.source = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// `[tool.clocktune]` from a pyproject.toml, if it has one.
    fn from_pyproject(path: &Path) -> Result<Option<Self>> {
        let content = std::fs::read_to_string(path)?;
        let pyproject: PyProject = toml::from_str(&content)?;
        let Some(mut config) = pyproject.tool.and_then(|t| t.clocktune) else {
            return Ok(None);
        };
        config.source = Some(path.to_path_buf());
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<()> {
        self.optimizer.validate()?;
        if self.model.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".into()));
        }
        Ok(())
    }

    /// Format config for verbose display.
    pub fn display_summary(&self) -> String {
        let mut lines = Vec::new();

        match &self.source {
            Some(source) => lines.push(format!("   Config: {}", source.display())),
            None => lines.push("   Config: (defaults)".to_string()),
        }
        lines.push(format!("   Dataset: {}", self.dataset.dir.display()));
        if !self.dataset.clock_types.is_empty() {
            let types: Vec<_> = self.dataset.clock_types.iter().map(|t| t.as_str()).collect();
            lines.push(format!("   Clock types: {}", types.join(", ")));
        }
        lines.push(format!("   Model: {}", self.model.model));
        lines.push(format!(
            "   Optimizer: {} iterations x {} samples, on rewrite failure: {:?}",
            self.optimizer.num_iterations, self.optimizer.samples_per_iteration, self.optimizer.on_rewrite_failure
        ));
        lines.push(format!("   Output: {}", self.output.dir.display()));

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::optimizer::FailurePolicy;

    #[test]
    fn test_defaults_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.optimizer.seed_eval_samples, 10);
        assert_eq!(config.optimizer.validation_samples, 15);
        assert_eq!(config.model.model, "gpt-4o");
    }

    #[test]
    fn test_standalone_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[dataset]
clock-types = ["analog", "word"]

[optimizer]
num-iterations = 7
on-rewrite-failure = "stop"

[output]
plots = true
"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.dataset.clock_types, vec![ClockType::Analog, ClockType::Word]);
        assert_eq!(config.optimizer.num_iterations, 7);
        assert_eq!(config.optimizer.samples_per_iteration, 15);
        assert_eq!(config.optimizer.on_rewrite_failure, FailurePolicy::Stop);
        assert!(config.output.plots);
        assert_eq!(config.source.as_deref(), Some(dir.path().join(CONFIG_FILE).as_path()));
    }

    #[test]
    fn test_pyproject_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"clocks\"\n\n[tool.clocktune.model]\nmodel = \"gpt-4o-mini\"\n",
        )
        .unwrap();
        let nested = dir.path().join("experiments");
        std::fs::create_dir(&nested).unwrap();

        let config = Config::load(&nested).unwrap();
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.max_tokens, 300);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[optimizer]\ntrain-ratio = 1.5\n").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::Config(_))));

        std::fs::write(dir.path().join(CONFIG_FILE), "[optimizer\n").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }
}
