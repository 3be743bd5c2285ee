pub mod atomic;

pub use atomic::{remove_if_exists, write_atomically, StagedFile};

use crate::errors::{InstrumentError, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Source text together with the exact bytes it was decoded from.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub bytes: Vec<u8>,
    pub text: String,
}

pub fn read_source(path: &Path) -> Result<SourceText> {
    let bytes = fs::read(path).map_err(|e| InstrumentError::input_io(path, e))?;
    let text = String::from_utf8(bytes.clone()).map_err(|e| {
        InstrumentError::input_io(path, io::Error::new(io::ErrorKind::InvalidData, e))
    })?;
    Ok(SourceText { bytes, text })
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| InstrumentError::output_write(path, e))?;
    }
    Ok(())
}
