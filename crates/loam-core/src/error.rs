use std::fmt;

/// Source position attached to reader diagnostics: the offending port's
/// name plus 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub name: String,
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(name: impl Into<String>, line: u32, col: u32) -> Self {
        SourcePos {
            name: name.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.line, self.col)
    }
}

/// Host-facing error. Inside the language everything is a pending-exception
/// cell; this enum exists only at the interpreter boundary, where an
/// exception that reached the top of the dump stack is rendered for the
/// embedder or the CLI.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoamError {
    #[error("{class}: {message}")]
    Uncaught { class: String, message: String },

    #[error("reader error at {pos}: {message}")]
    Reader { message: String, pos: SourcePos },

    #[error("io error: {0}")]
    Io(String),
}

impl LoamError {
    pub fn io(e: std::io::Error) -> Self {
        LoamError::Io(e.to_string())
    }
}
