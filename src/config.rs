//! Configuration for batchq.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (BATCHQ_HOME, BATCHQ_WORKDIR)
//! 2. Config file (.batchq/config.yaml)
//! 3. Defaults (~/.batchq)
//!
//! Config file discovery:
//! - Searches current directory and parents for .batchq/config.yaml
//! - Paths in config file are relative to the project root (parent of .batchq/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::{CodecDefaults, ConflictPolicy, DecodeDefaults, PngCompression, RunSettings};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: Option<RunConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory
    pub home: Option<String>,
    /// Directory holding workflow YAML files
    pub workflows: Option<String>,
    /// Default directory receiving outputs
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    pub conflict: Option<ConflictPolicy>,
    pub multiple_workers: Option<bool>,
    pub worker_limit: Option<usize>,
    pub jpeg_quality: Option<u8>,
    pub png_compression: Option<PngCompression>,
    pub half_size: Option<bool>,
}

/// Run defaults before a working directory is known
#[derive(Debug, Clone)]
pub struct RunDefaults {
    pub conflict_policy: ConflictPolicy,
    pub use_multiple_workers: bool,
    pub worker_limit: Option<usize>,
    pub codec: CodecDefaults,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            use_multiple_workers: true,
            worker_limit: None,
            codec: CodecDefaults::default(),
        }
    }
}

impl RunDefaults {
    fn from_config(run: Option<&RunConfig>) -> Self {
        let defaults = Self::default();
        let Some(run) = run else {
            return defaults;
        };

        Self {
            conflict_policy: run.conflict.unwrap_or(defaults.conflict_policy),
            use_multiple_workers: run.multiple_workers.unwrap_or(defaults.use_multiple_workers),
            worker_limit: run.worker_limit,
            codec: CodecDefaults {
                jpeg_quality: run.jpeg_quality.unwrap_or(defaults.codec.jpeg_quality),
                png_compression: run.png_compression.unwrap_or(defaults.codec.png_compression),
                decode: DecodeDefaults {
                    half_size: run.half_size.unwrap_or(false),
                },
            },
        }
    }

    /// Run settings targeting `working_directory`
    pub fn settings(&self, working_directory: impl Into<PathBuf>) -> RunSettings {
        RunSettings {
            working_directory: working_directory.into(),
            conflict_policy: self.conflict_policy,
            use_multiple_workers: self.use_multiple_workers,
            worker_limit: self.worker_limit,
            codec: self.codec.clone(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to batchq home
    pub home: PathBuf,
    /// Directory searched for workflows by name
    pub workflows: PathBuf,
    /// Default output directory, if configured
    pub working_directory: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Defaults for new runs
    pub run: RunDefaults,
}

impl ResolvedConfig {
    /// Path of a workflow stored under the workflows directory
    pub fn workflow_path(&self, name: &str) -> PathBuf {
        self.workflows.join(format!("{}.yaml", name))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".batchq").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".batchq");

    let config_file = find_config_file();
    let config = config_file.as_deref().map(load_config_file).transpose()?;

    resolve(
        config.as_ref(),
        config_file,
        default_home,
        std::env::var("BATCHQ_HOME").ok(),
        std::env::var("BATCHQ_WORKDIR").ok(),
    )
}

fn resolve(
    config: Option<&ConfigFile>,
    config_file: Option<PathBuf>,
    default_home: PathBuf,
    env_home: Option<String>,
    env_workdir: Option<String>,
) -> Result<ResolvedConfig> {
    let batchq_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));
    // Base directory is the parent of .batchq/
    let base_dir = batchq_dir.parent().unwrap_or(Path::new("."));

    let paths = config.map(|c| c.paths.clone()).unwrap_or_default();

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let Some(ref home) = paths.home {
        resolve_path(base_dir, home)
    } else {
        default_home
    };

    let workflows = match paths.workflows {
        Some(ref dir) => resolve_path(base_dir, dir),
        None => home.join("workflows"),
    };

    let working_directory = match env_workdir {
        Some(dir) => Some(PathBuf::from(dir)),
        None => paths
            .working_directory
            .as_deref()
            .map(|dir| resolve_path(base_dir, dir)),
    };

    let run = RunDefaults::from_config(config.and_then(|c| c.run.as_ref()));

    Ok(ResolvedConfig {
        home,
        workflows,
        working_directory,
        config_file,
        run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, None, PathBuf::from("/home/u/.batchq"), None, None).unwrap();

        assert_eq!(config.home, PathBuf::from("/home/u/.batchq"));
        assert_eq!(config.workflows, PathBuf::from("/home/u/.batchq/workflows"));
        assert!(config.working_directory.is_none());
        assert!(config.config_file.is_none());
        assert_eq!(config.run.conflict_policy, ConflictPolicy::GenerateUniqueName);
    }

    #[test]
    fn test_env_overrides() {
        let config = resolve(
            None,
            None,
            PathBuf::from("/home/u/.batchq"),
            Some("/srv/batchq".to_string()),
            Some("/srv/out".to_string()),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/batchq"));
        assert_eq!(config.working_directory, Some(PathBuf::from("/srv/out")));
        assert_eq!(
            config.workflow_path("web"),
            PathBuf::from("/srv/batchq/workflows/web.yaml")
        );
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let batchq_dir = temp.path().join(".batchq");
        std::fs::create_dir_all(&batchq_dir).unwrap();

        let config_path = batchq_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  workflows: workflows
  working_directory: out
run:
  conflict: overwrite
  multiple_workers: false
  jpeg_quality: 70
  png_compression: best
  half_size: true
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");

        let config = resolve(
            Some(&parsed),
            Some(config_path),
            PathBuf::from("/unused"),
            None,
            None,
        )
        .unwrap();

        assert_eq!(config.workflows, temp.path().join("workflows"));
        assert_eq!(config.working_directory, Some(temp.path().join("out")));

        let settings = config.run.settings("/tmp/out");
        assert_eq!(settings.conflict_policy, ConflictPolicy::Overwrite);
        assert!(!settings.use_multiple_workers);
        assert_eq!(settings.codec.jpeg_quality, 70);
        assert_eq!(settings.codec.png_compression, PngCompression::Best);
        assert!(settings.codec.decode.half_size);
    }

    #[test]
    fn test_all_file_paths_relative_to_project_root() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".batchq").join("config.yaml");
        let parsed: ConfigFile =
            serde_yaml::from_str("version: \"1.0\"\npaths:\n  home: state\n").unwrap();

        let config = resolve(
            Some(&parsed),
            Some(config_path),
            PathBuf::from("/unused"),
            None,
            None,
        )
        .unwrap();

        assert_eq!(config.home, temp.path().join("state"));
        assert_eq!(config.workflows, temp.path().join("state").join("workflows"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
