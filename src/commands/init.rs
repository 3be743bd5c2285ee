use crate::config::CONFIG_FILE_NAME;
use crate::io::write_atomically;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = r#"# Coveron configuration

# Where instrumented sources and CID files are written
output_dir = ".coveron"

# Which decision nodes get evaluation markers: "leaves" or "all-nodes"
decision_policy = "leaves"

# Header included by every instrumented file
runtime_header = "coveron_helper.h"

# Runtime helper compiled together with the instrumented sources
runtime_source = "coveron_helper.c"

# Write CID files gzip-compressed
compress_cid = false

# Instrument files on all cores; set jobs to limit the worker count
parallel = true
# jobs = 4

# Compiler run after instrumentation, with these arguments
# compiler = "cc"
# compiler_args = ["-O0", "-g"]

[probes]
checkpoint = "__coveron_checkpoint"
evaluation = "__coveron_evaluation"
"#;

/// Write the default configuration into `dir`.
pub fn init_config_in(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!("Configuration file already exists. Use --force to overwrite.");
    }

    write_atomically(&config_path, DEFAULT_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(config_path)
}

pub fn init_config(force: bool) -> Result<()> {
    let path = init_config_in(Path::new("."), force)?;
    println!("Created {} configuration file", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, DecisionPolicy};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_parses() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from(".coveron")));
        assert_eq!(config.decision_policy, Some(DecisionPolicy::Leaves));
        assert_eq!(
            config.probes.and_then(|p| p.checkpoint).as_deref(),
            Some("__coveron_checkpoint")
        );
    }

    #[test]
    fn test_existing_file_needs_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "parallel = false\n").unwrap();

        assert!(init_config_in(dir.path(), false).is_err());
        let path = init_config_in(dir.path(), true).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), DEFAULT_CONFIG);
    }
}
