use crate::config::{load_config, InstrumenterConfig};
use crate::instrument::{strip_probes, ProbeSet};
use crate::io::{read_source, write_atomically};
use crate::syntax::Dialect;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StripConfig {
    pub file: PathBuf,
    pub output: Option<PathBuf>,
    pub cpp: bool,
    pub config: Option<PathBuf>,
}

/// Restored text of one instrumented file.
pub fn strip_file(path: &Path, probes: &ProbeSet) -> Result<String> {
    let source = read_source(path)?;
    strip_probes(&source.text, probes).with_context(|| format!("Failed to strip {}", path.display()))
}

pub fn handle_strip(config: StripConfig) -> Result<()> {
    let file_config = load_config(config.config.as_deref())?;
    let names = InstrumenterConfig::default().merge_file(file_config).probes;
    let dialect = if config.cpp {
        Dialect::Cpp
    } else {
        Dialect::from_path(&config.file)
    };
    let restored = strip_file(&config.file, &ProbeSet::new(names, dialect))?;

    match config.output {
        Some(output) => write_atomically(&output, restored.as_bytes())
            .with_context(|| format!("Failed to write {}", output.display()))?,
        None => print!("{restored}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeNames;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_strip_file_restores_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main_0badf00d.cpp");
        fs::write(
            &path,
            "#include \"coveron_helper.h\"\n#line 1 \"main.cpp\"\n\
             bool f(bool a) { return __coveron_evaluation(1, (a) ? true : false); }\n",
        )
        .unwrap();

        let probes = ProbeSet::new(ProbeNames::default(), Dialect::from_path(&path));
        assert_eq!(
            strip_file(&path, &probes).unwrap(),
            "bool f(bool a) { return a; }\n"
        );
    }

    #[test]
    fn test_handle_strip_writes_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("main_0badf00d.c");
        let output = dir.path().join("restored.c");
        fs::write(&input, "int x; __coveron_checkpoint(1); \n").unwrap();

        handle_strip(StripConfig {
            file: input,
            output: Some(output.clone()),
            cpp: false,
            config: Some(dir.path().join("missing.toml")),
        })
        .unwrap_err();

        let config_path = dir.path().join("probes.toml");
        fs::write(&config_path, "[probes]\ncheckpoint = \"__coveron_checkpoint\"\n").unwrap();
        handle_strip(StripConfig {
            file: dir.path().join("main_0badf00d.c"),
            output: Some(output.clone()),
            cpp: false,
            config: Some(config_path),
        })
        .unwrap();
        assert_eq!(fs::read_to_string(output).unwrap(), "int x; \n");
    }
}
