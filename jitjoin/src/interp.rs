//! Reference backend: evaluates the IR directly instead of emitting code.
//!
//! Follows the same lifecycle and calling contract as the Cranelift
//! engine, so tests can run the harness against either one and compare.
//! Every value lives in a 64-bit slot: `i32` sign-extended, `bool` as 0/1,
//! pointers as addresses.

use std::ffi::c_char;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::backend::{state_error, BackendState, CompilationBackend, JoinEntry};
use crate::error::JitError;
use crate::ir::{Constant, Inst, IrFunction, IrType, ScopeId, ValueId};
use crate::join_ir::has_join_signature;
use crate::runtime;

/// Interpreting backend.
pub struct InterpBackend {
    state: BackendState,
    live: Arc<AtomicBool>,
}

impl InterpBackend {
    pub fn new() -> Self {
        Self {
            state: BackendState::Uninitialized,
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_state(&mut self, next: BackendState) {
        debug!("interp backend: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl Default for InterpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilationBackend for InterpBackend {
    type Entry = InterpJoinFn;

    fn state(&self) -> BackendState {
        self.state
    }

    fn initialize(&mut self) -> Result<(), JitError> {
        if self.state != BackendState::Uninitialized {
            return Err(state_error("uninitialized", self.state));
        }
        self.live.store(true, Ordering::Release);
        self.set_state(BackendState::Initialized);
        Ok(())
    }

    fn compile(&mut self, func: &IrFunction) -> Result<InterpJoinFn, JitError> {
        if !self.state.accepts_compile() {
            return Err(state_error("initialized", self.state));
        }
        func.verify()?;
        if !has_join_signature(func) {
            return Err(JitError::Signature(format!(
                "`{}` has parameters {:?} -> {}",
                func.name(),
                func.param_types(),
                func.return_type()
            )));
        }
        self.set_state(BackendState::MethodRegistered);
        let func = Arc::new(func.clone());
        self.set_state(BackendState::Compiled);
        self.set_state(BackendState::Invokable);
        Ok(InterpJoinFn {
            func,
            live: Arc::clone(&self.live),
        })
    }

    fn shutdown(&mut self) {
        self.live.store(false, Ordering::Release);
        self.set_state(BackendState::Shutdown);
    }
}

/// An IR function bound to the join calling contract.
pub struct InterpJoinFn {
    func: Arc<IrFunction>,
    live: Arc<AtomicBool>,
}

impl JoinEntry for InterpJoinFn {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    unsafe fn call(
        &self,
        left: *const *const c_char,
        right: *const *const c_char,
        out: *mut *const c_char,
        size: i32,
        legacy: i32,
    ) -> i32 {
        let args = [
            left as u64,
            right as u64,
            out as u64,
            size as i64 as u64,
            legacy as i64 as u64,
        ];
        let mut frame = Frame::new(&self.func, &args);
        match frame.exec(ScopeId::ROOT) {
            Flow::Return(v) => v,
            // `verify` guarantees every path returns.
            Flow::Next => 0,
        }
    }
}

enum Flow {
    Next,
    Return(i32),
}

struct Frame<'f> {
    func: &'f IrFunction,
    vars: Vec<u64>,
    values: Vec<u64>,
}

impl<'f> Frame<'f> {
    fn new(func: &'f IrFunction, args: &[u64]) -> Self {
        let mut vars = vec![0; func.vars().len()];
        for ((id, _), &arg) in func.params().zip(args) {
            vars[id.index()] = arg;
        }
        Self {
            func,
            vars,
            values: vec![0; func.value_count()],
        }
    }

    fn int(&self, v: ValueId) -> i32 {
        self.values[v.index()] as i32
    }

    fn ptr(&self, v: ValueId) -> u64 {
        self.values[v.index()]
    }

    unsafe fn exec(&mut self, scope: ScopeId) -> Flow {
        let func = self.func;
        for inst in &func.scope(scope).insts {
            match *inst {
                Inst::Const { dst, value } => {
                    self.values[dst.index()] = match value {
                        Constant::I32(n) => n as i64 as u64,
                        Constant::Str(id) => func.string(id).as_ptr() as u64,
                    };
                }
                Inst::Load { dst, var } => self.values[dst.index()] = self.vars[var.index()],
                Inst::Store { var, value } => self.vars[var.index()] = self.values[value.index()],
                Inst::IndexedLoad {
                    dst, base, index, ..
                } => {
                    let slot = (self.ptr(base) as *const *const c_char)
                        .offset(self.int(index) as isize);
                    self.values[dst.index()] = *slot as u64;
                }
                Inst::IndexedStore {
                    base, index, value, ..
                } => {
                    let slot = (self.ptr(base) as *mut *const c_char)
                        .offset(self.int(index) as isize);
                    *slot = self.ptr(value) as *const c_char;
                }
                Inst::Equal { dst, lhs, rhs } => {
                    let eq = match func.value_type(lhs) {
                        IrType::Str => {
                            runtime::str_eq(
                                self.ptr(lhs) as *const c_char,
                                self.ptr(rhs) as *const c_char,
                            ) != 0
                        }
                        _ => self.int(lhs) == self.int(rhs),
                    };
                    self.values[dst.index()] = eq as u64;
                }
                Inst::Add { dst, lhs, rhs } => {
                    let sum = self.int(lhs).wrapping_add(self.int(rhs));
                    self.values[dst.index()] = sum as i64 as u64;
                }
                Inst::ForLoop {
                    var,
                    start,
                    end,
                    step,
                    body,
                } => {
                    let end = self.int(end);
                    let step = self.int(step);
                    self.vars[var.index()] = self.values[start.index()];
                    while (self.vars[var.index()] as i32) < end {
                        if let Flow::Return(v) = self.exec(body) {
                            return Flow::Return(v);
                        }
                        let next = (self.vars[var.index()] as i32).wrapping_add(step);
                        self.vars[var.index()] = next as i64 as u64;
                    }
                }
                Inst::IfThenElse {
                    cond,
                    then_scope,
                    else_scope,
                } => {
                    let arm = if self.values[cond.index()] != 0 {
                        then_scope
                    } else {
                        else_scope
                    };
                    if let Flow::Return(v) = self.exec(arm) {
                        return Flow::Return(v);
                    }
                }
                Inst::Return { value } => return Flow::Return(self.int(value)),
            }
        }
        Flow::Next
    }
}
