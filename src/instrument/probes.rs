//! Probe text inserted by the rewriter and recognised by the stripper.

use crate::config::ProbeNames;
use crate::core::MarkerId;
use crate::syntax::Dialect;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSet {
    pub names: ProbeNames,
    pub dialect: Dialect,
}

impl ProbeSet {
    pub fn new(names: ProbeNames, dialect: Dialect) -> Self {
        Self { names, dialect }
    }

    /// `__coveron_checkpoint(ID); `
    pub fn checkpoint(&self, id: MarkerId) -> String {
        format!("{}({id}); ", self.names.checkpoint)
    }

    /// `{ __coveron_checkpoint(IDu); `
    ///
    /// The `u` suffix tells a braced checkpoint apart from a plain one that
    /// follows a `{ ` of the original text.
    pub fn scope_open(&self, id: MarkerId) -> String {
        format!("{{ {}({id}u); ", self.names.checkpoint)
    }

    pub fn scope_close(&self) -> &'static str {
        " }"
    }

    /// `__coveron_evaluation(ID, (`
    pub fn evaluation_open(&self, id: MarkerId) -> String {
        format!("{}({id}, (", self.names.evaluation)
    }

    /// `) ? 1 : 0)` in C, `) ? true : false)` in C++.
    pub fn evaluation_close(&self) -> &'static str {
        match self.dialect {
            Dialect::C => ") ? 1 : 0)",
            Dialect::Cpp => ") ? true : false)",
        }
    }
}

/// `#include "<header>"` and `#line 1 "<input>"`, each ending in a newline.
pub fn prelude(runtime_header: &Path, input: &Path) -> String {
    format!(
        "#include \"{}\"\n#line 1 \"{}\"\n",
        escape_string(&runtime_header.to_string_lossy()),
        escape_string(&input.to_string_lossy())
    )
}

fn escape_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(c),
        }
    }
    escaped
}
