//! Error types for IR construction, compilation and invocation.

use thiserror::Error;

use crate::ir::{IrType, ValueId};

/// What went wrong while building or verifying an IR function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrErrorKind {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("variable `{0}` is already declared in an enclosing scope")]
    DuplicateVariable(String),

    #[error("{0} is not visible from this scope")]
    OutOfScope(ValueId),

    #[error("variable `{0}` is not visible from this scope")]
    VariableOutOfScope(String),

    #[error("{0} is not defined")]
    UndefinedValue(ValueId),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: IrType, found: IrType },

    #[error("{0} cannot be indexed")]
    NotAnArray(IrType),

    #[error("{0} does not support equality")]
    NotComparable(IrType),

    #[error("loop step must be a positive constant, found {0}")]
    NonPositiveStep(i32),

    #[error("loop step {0} is not a constant")]
    NonConstantStep(ValueId),

    #[error("parameters must be declared before the body is emitted")]
    ParameterAfterBody,

    #[error("instruction follows a terminator in the same scope")]
    AfterTerminator,

    #[error("not every control path ends in a return")]
    MissingReturn,

    #[error("string constant contains an interior NUL byte")]
    InteriorNul,
}

/// A structured IR construction failure naming the offending builder step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("IR error in `{op}` (step {step}): {kind}")]
pub struct IrError {
    /// Builder operation that failed (`indexed_load`, `store`, ...).
    pub op: &'static str,
    /// Ordinal of the builder call within the function, starting at 0.
    pub step: usize,
    pub kind: IrErrorKind,
}

impl IrError {
    pub(crate) fn new(op: &'static str, step: usize, kind: IrErrorKind) -> Self {
        Self { op, step, kind }
    }
}

/// Errors while reading a delimited table or extracting a column from it.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("row {row} has no column {column}")]
    MissingField { row: usize, column: usize },

    #[error("field at row {row} contains an interior NUL byte")]
    InteriorNul { row: usize },
}

/// Errors from the compilation backend and the invocation harness.
#[derive(Debug, Error)]
pub enum JitError {
    /// The backend could not be brought up (ISA lookup, flag setup).
    #[error("backend initialization failed: {0}")]
    Init(String),

    /// The IR graph is malformed.
    #[error(transparent)]
    Ir(#[from] IrError),

    /// Cranelift rejected or failed to lower the function.
    #[error("codegen error: {0}")]
    Codegen(String),

    /// Module declaration/linking error.
    #[error("module error: {0}")]
    Module(String),

    /// The function does not have the join entry-point signature.
    #[error("signature mismatch: {0}")]
    Signature(String),

    /// Invalid configuration value.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// An operation was attempted in the wrong backend lifecycle state.
    #[error("backend is {found}, expected {expected}")]
    State {
        expected: &'static str,
        found: &'static str,
    },

    /// Left and right arrays differ in length.
    #[error("left array has {left} slots but right array has {right}")]
    ShapeMismatch { left: usize, right: usize },

    #[error(transparent)]
    Table(#[from] TableError),
}

impl JitError {
    /// Backend status code for compilation failures; 0 for everything else.
    pub fn status_code(&self) -> i32 {
        match self {
            JitError::Ir(_) => 1,
            JitError::Codegen(_) => 2,
            JitError::Module(_) => 3,
            JitError::Signature(_) => 4,
            _ => 0,
        }
    }

    /// Process exit status for a run aborted by this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            JitError::Init(_) => -1,
            JitError::Ir(_) | JitError::Codegen(_) | JitError::Module(_) | JitError::Signature(_) => {
                -2
            }
            JitError::InvalidParams(_) | JitError::ShapeMismatch { .. } | JitError::Table(_) => -3,
            JitError::State { .. } => -4,
        }
    }
}
