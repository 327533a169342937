//! Compilation errors

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Unsupported syntax: {what}")]
    UnsupportedSyntax { what: String },

    #[error("Variable was never allocated a memory slot: {name}")]
    UnallocatedVariable { name: String },

    #[error("Call resolves to unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("String missing from pool: {value:?}")]
    MissingString { value: String },

    #[error("Invalid state reference: {id}")]
    InvalidStateReference { id: u32 },

    #[error("Illegal {kind} outside of a loop or switch")]
    IllegalJump { kind: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl CompileError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        CompileError::UnsupportedSyntax { what: what.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            message: message.into(),
        }
    }
}
