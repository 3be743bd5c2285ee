use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::DecisionPolicy;
use crate::errors::{InstrumentError, Result};

pub const CONFIG_FILE_NAME: &str = ".coveron.toml";
const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Contents of `.coveron.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoveronFileConfig {
    pub output_dir: Option<PathBuf>,
    pub compiler: Option<String>,
    pub compiler_args: Option<Vec<String>>,
    pub parallel: Option<bool>,
    pub jobs: Option<usize>,
    pub decision_policy: Option<DecisionPolicy>,
    pub runtime_header: Option<PathBuf>,
    pub runtime_source: Option<PathBuf>,
    pub compress_cid: Option<bool>,
    pub probes: Option<ProbeSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSection {
    pub checkpoint: Option<String>,
    pub evaluation: Option<String>,
}

pub(crate) fn read_config_file(path: &Path) -> std::result::Result<String, std::io::Error> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Parse a TOML document into a file configuration.
pub fn parse_config(contents: &str) -> std::result::Result<CoveronFileConfig, String> {
    let config = toml::from_str::<CoveronFileConfig>(contents)
        .map_err(|e| format!("Failed to parse {CONFIG_FILE_NAME}: {e}"))?;
    if let Some(probes) = &config.probes {
        for name in [&probes.checkpoint, &probes.evaluation].into_iter().flatten() {
            if !is_identifier(name) {
                return Err(format!("probe name `{name}` is not a C identifier"));
            }
        }
    }
    Ok(config)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Directories from `start` upwards, at most `max_depth` of them.
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// First `.coveron.toml` in `start` or one of its ancestors.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    directory_ancestors(start.to_path_buf(), MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
}

/// Load the configuration file.
///
/// An explicit path must exist and parse. A discovered file that fails to
/// parse is also an error, since silently ignoring it would change where
/// outputs go; no file at all yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<CoveronFileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let current = match std::env::current_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    log::warn!("Failed to get current directory: {e}. Using default config.");
                    return Ok(CoveronFileConfig::default());
                }
            };
            match find_config_file(&current) {
                Some(path) => path,
                None => {
                    log::debug!(
                        "No {CONFIG_FILE_NAME} found after checking {MAX_TRAVERSAL_DEPTH} directories. Using default config."
                    );
                    return Ok(CoveronFileConfig::default());
                }
            }
        }
    };

    let contents = read_config_file(&path).map_err(|e| InstrumentError::Config {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let config = parse_config(&contents).map_err(|message| InstrumentError::Config {
        path: path.clone(),
        message,
    })?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}
