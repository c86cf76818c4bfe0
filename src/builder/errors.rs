use thiserror::Error;

use crate::backend::errors::CollaboratorError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("component count mismatch, found {found}, needs {needs}")]
    ComponentCountMismatch { found: usize, needs: usize },
    #[error("literal {literal} of type {ty} is not finite")]
    NonFiniteLiteral { literal: String, ty: String },
    #[error("uniform {uniform:?} has no member {index}")]
    MemberOutOfRange { uniform: String, index: usize },
    #[error("no function is being recorded")]
    NoActiveFunction,
    #[error("function {name:?} is already finished")]
    FunctionFinished { name: String },
    #[error("function {name:?} calls itself while being recorded")]
    RecursiveCall { name: String },
    #[error("value {value} is local to function {function:?}")]
    ForeignValue { value: String, function: String },
    #[error("recording of function {name:?} failed earlier")]
    AbortedFunction { name: String },
    #[error("entry point {name:?} references a function that is not finished")]
    EntryPointNotFinished { name: String },
    #[error("function {name:?} was not declared in this module")]
    UnknownFunction { name: String },
    #[error("function {name:?} is already an entry point")]
    DuplicateEntryPoint { name: String },
    #[error("uniform {name:?} is already declared")]
    DuplicateUniform { name: String },
    #[error("uniform {name:?} has no members")]
    EmptyUniform { name: String },
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}
