use std::fmt;

use thiserror::Error;

/// Line and column a collaborator pointed at in the module text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

fn at(position: &Option<SourcePosition>) -> String {
    position
        .map(|position| format!(" at {position}"))
        .unwrap_or_default()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("assembler failed{}: {message}", at(.position))]
    Assembler {
        message: String,
        position: Option<SourcePosition>,
    },
    #[error("validation failed{}: {message}", at(.position))]
    Validator {
        message: String,
        position: Option<SourcePosition>,
    },
    #[error("optimizer failed{}: {message}", at(.position))]
    Optimizer {
        message: String,
        position: Option<SourcePosition>,
    },
    #[error("decompiler failed{}: {message}", at(.position))]
    Decompiler {
        message: String,
        position: Option<SourcePosition>,
    },
    #[error("invalid SPIR-V binary: {0}")]
    InvalidBinary(String),
}
