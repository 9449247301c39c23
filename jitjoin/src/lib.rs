//! # jitjoin: nested-loop string join compiled at runtime via Cranelift
//!
//! `jitjoin` builds a small structured IR for a nested-loop join over two
//! string columns, lowers it to native code and calls it on data loaded
//! from comma-delimited tables. The "not found" marker is baked into the
//! generated code as a pointer immediate.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jitjoin::{build_join_ir, run_join, CompilationBackend, JitEngine, JoinParams, StringColumn};
//!
//! let mut engine = JitEngine::default();
//! engine.initialize()?;
//! let entry = engine.compile(&build_join_ir(&JoinParams::default())?)?;
//!
//! let left = StringColumn::from_values(["x", "y"])?;
//! let right = StringColumn::from_values(["y", "z"])?;
//! let output = run_join(&entry, &left, &right)?;
//! assert_eq!(output.matches, 1);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! IrBuilder (scoped, checked per op)
//!       │
//!       ▼
//! join_ir::build_join_ir  →  IrFunction
//!       │
//!       ▼
//! CompilationBackend::compile
//!       ├── JitEngine:     lower → CLIF → native code
//!       └── InterpBackend: evaluate the IR directly
//!       │
//!       ▼
//! JoinEntry  →  harness::run_join(left, right)  →  JoinOutput
//! ```
//!
//! Arrays are 1-indexed: slot 0 of every column is reserved.

pub mod backend;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod harness;
pub mod interp;
pub mod ir;
pub mod join_ir;
pub mod lower;
pub mod report;
pub mod runtime;
pub mod table;

// Re-exports
pub use backend::{BackendState, CompilationBackend, JoinEntry};
pub use builder::{IrBuilder, ScopeBuilder};
pub use config::{BackendConfig, JitjoinConfig, JoinParams, OptLevel};
pub use engine::{JitEngine, NativeJoinFn};
pub use error::{IrError, IrErrorKind, JitError, TableError};
pub use harness::{run_join, JoinOutput, StringColumn};
pub use interp::{InterpBackend, InterpJoinFn};
pub use ir::{IrFunction, IrType, ValueId};
pub use join_ir::build_join_ir;
pub use report::{ConsoleReport, ReportSink};
pub use table::Table;
