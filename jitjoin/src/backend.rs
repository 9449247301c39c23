//! Compilation backend contract.
//!
//! A backend turns an [`IrFunction`] with the join signature into an entry
//! point the harness can invoke. [`crate::engine::JitEngine`] emits native
//! code with Cranelift; [`crate::interp::InterpBackend`] evaluates the IR
//! directly and serves as the reference in tests.

use std::ffi::c_char;
use std::fmt;

use crate::error::JitError;
use crate::ir::IrFunction;

/// Lifecycle of a compilation backend.
///
/// ```text
/// Uninitialized → Initialized → MethodRegistered → Compiled → Invokable
///                      ↑                │ (failure)               │
///                      └────────────────┘                        ▼
///                                                             Shutdown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Uninitialized,
    Initialized,
    MethodRegistered,
    Compiled,
    Invokable,
    Shutdown,
}

impl BackendState {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendState::Uninitialized => "uninitialized",
            BackendState::Initialized => "initialized",
            BackendState::MethodRegistered => "method-registered",
            BackendState::Compiled => "compiled",
            BackendState::Invokable => "invokable",
            BackendState::Shutdown => "shutdown",
        }
    }

    /// True when a new function may be compiled.
    pub fn accepts_compile(self) -> bool {
        matches!(self, BackendState::Initialized | BackendState::Invokable)
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled join entry point:
/// `fn(left, right, out, size, legacy) -> matches`.
pub trait JoinEntry {
    /// False once the owning backend has shut down.
    fn is_live(&self) -> bool;

    /// Invoke the join.
    ///
    /// # Safety
    ///
    /// - `left` and `right` must point to `size` readable string pointers;
    ///   slots `1..size` must be valid NUL-terminated strings.
    /// - `out` must point to `size` writable string pointers.
    /// - The owning backend must not have shut down.
    unsafe fn call(
        &self,
        left: *const *const c_char,
        right: *const *const c_char,
        out: *mut *const c_char,
        size: i32,
        legacy: i32,
    ) -> i32;
}

/// A backend with an explicit lifecycle.
pub trait CompilationBackend {
    type Entry: JoinEntry;

    fn state(&self) -> BackendState;

    /// Bring the backend up. Valid only when `Uninitialized`.
    fn initialize(&mut self) -> Result<(), JitError>;

    /// Verify, lower and emit `func`, which must have the join signature.
    fn compile(&mut self, func: &IrFunction) -> Result<Self::Entry, JitError>;

    /// Release compiled code. Entries report `is_live() == false` afterwards.
    fn shutdown(&mut self);
}

/// Error for an operation attempted in the wrong lifecycle state.
pub(crate) fn state_error(expected: &'static str, found: BackendState) -> JitError {
    JitError::State {
        expected,
        found: found.as_str(),
    }
}
