//! Scoped construction API for [`IrFunction`].
//!
//! `IrBuilder` owns the function under construction. Straight-line code is
//! emitted through a [`ScopeBuilder`]; loops and conditionals open child
//! scopes that are filled by closures, and a child scope is closed as soon
//! as its closure returns. Every call is checked on the spot, so a malformed
//! call fails with an [`IrError`] naming the operation and its step number.
//!
//! ```rust,ignore
//! let mut b = IrBuilder::new("sum_to", IrType::I32);
//! b.declare_parameter("n", IrType::I32)?;
//! b.declare_local("acc", IrType::I32)?;
//! let mut body = b.body();
//! let zero = body.const_i32(0)?;
//! body.store("acc", zero)?;
//! let one = body.const_i32(1)?;
//! let n = body.load("n")?;
//! body.for_loop_ascending("i", zero, n, one, |lp| {
//!     let acc = lp.load("acc")?;
//!     let i = lp.load("i")?;
//!     let next = lp.add(acc, i)?;
//!     lp.store("acc", next)
//! })?;
//! let acc = body.load("acc")?;
//! body.return_value(acc)?;
//! let func = b.finish()?;
//! ```

use std::ffi::CString;

use crate::error::{IrError, IrErrorKind};
use crate::ir::{
    Constant, Inst, IrFunction, IrType, Scope, ScopeId, StrId, ValueDecl, ValueId, VarDecl, VarId,
    VarKind,
};

/// Builds one [`IrFunction`].
pub struct IrBuilder {
    func: IrFunction,
    step: usize,
}

impl IrBuilder {
    pub fn new(name: &str, return_type: IrType) -> Self {
        Self {
            func: IrFunction::new(name, return_type),
            step: 0,
        }
    }

    fn next_step(&mut self) -> usize {
        let step = self.step;
        self.step += 1;
        step
    }

    /// Append a parameter to the signature. Must precede any body code.
    pub fn declare_parameter(&mut self, name: &str, ty: IrType) -> Result<VarId, IrError> {
        let step = self.next_step();
        let fail = |kind| IrError::new("declare_parameter", step, kind);
        if !self.func.values.is_empty() || !self.func.body().insts.is_empty() {
            return Err(fail(IrErrorKind::ParameterAfterBody));
        }
        let id = self
            .declare_var(name, ty, VarKind::Param, ScopeId::ROOT)
            .map_err(fail)?;
        self.func.params.push(id);
        Ok(id)
    }

    /// Declare a function-wide mutable local.
    pub fn declare_local(&mut self, name: &str, ty: IrType) -> Result<VarId, IrError> {
        let step = self.next_step();
        self.declare_var(name, ty, VarKind::Local, ScopeId::ROOT)
            .map_err(|kind| IrError::new("declare_local", step, kind))
    }

    fn declare_var(
        &mut self,
        name: &str,
        ty: IrType,
        kind: VarKind,
        scope: ScopeId,
    ) -> Result<VarId, IrErrorKind> {
        if self.func.lookup_var(scope, name).is_some() {
            return Err(IrErrorKind::DuplicateVariable(name.to_string()));
        }
        let id = VarId(self.func.vars.len() as u32);
        self.func.vars.push(VarDecl {
            name: name.to_string(),
            ty,
            kind,
            scope,
        });
        Ok(id)
    }

    /// Builder for the function body (the root scope).
    pub fn body(&mut self) -> ScopeBuilder<'_> {
        ScopeBuilder {
            b: self,
            scope: ScopeId::ROOT,
        }
    }

    /// The function built so far.
    pub fn function(&self) -> &IrFunction {
        &self.func
    }

    /// Close the function; every control path must end in a return.
    pub fn finish(self) -> Result<IrFunction, IrError> {
        if !self.func.terminates(ScopeId::ROOT) {
            return Err(IrError::new(
                "finish",
                self.step,
                IrErrorKind::MissingReturn,
            ));
        }
        Ok(self.func)
    }
}

/// Emits instructions into one scope of the function under construction.
pub struct ScopeBuilder<'b> {
    b: &'b mut IrBuilder,
    scope: ScopeId,
}

impl<'b> ScopeBuilder<'b> {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    fn open(&mut self, op: &'static str) -> Result<usize, IrError> {
        let step = self.b.next_step();
        if self.b.func.terminates(self.scope) {
            return Err(IrError::new(op, step, IrErrorKind::AfterTerminator));
        }
        Ok(step)
    }

    fn fresh_value(&self) -> ValueId {
        ValueId(self.b.func.values.len() as u32)
    }

    /// Type-check `inst` and append it to this scope.
    fn emit(&mut self, step: usize, inst: Inst) -> Result<(), IrError> {
        let scope = self.scope;
        let func = &mut self.b.func;
        let ty = func
            .check_inst(scope, &inst)
            .map_err(|kind| IrError::new(inst.op_name(), step, kind))?;
        if let (Some(_), Some(ty)) = (inst.dst(), ty) {
            func.values.push(ValueDecl { ty, scope });
        }
        func.scopes[scope.index()].insts.push(inst);
        Ok(())
    }

    fn emit_value(&mut self, op: &'static str, make: impl FnOnce(ValueId) -> Inst) -> Result<ValueId, IrError> {
        let step = self.open(op)?;
        let dst = self.fresh_value();
        self.emit(step, make(dst))?;
        Ok(dst)
    }

    fn resolve(&self, op: &'static str, step: usize, name: &str) -> Result<VarId, IrError> {
        self.b
            .func
            .lookup_var(self.scope, name)
            .ok_or_else(|| IrError::new(op, step, IrErrorKind::UnknownVariable(name.to_string())))
    }

    fn new_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.b.func.scopes.len() as u32);
        self.b.func.scopes.push(Scope {
            parent: Some(self.scope),
            insts: Vec::new(),
        });
        id
    }

    fn child(&mut self, scope: ScopeId) -> ScopeBuilder<'_> {
        ScopeBuilder {
            b: &mut *self.b,
            scope,
        }
    }

    pub fn const_i32(&mut self, value: i32) -> Result<ValueId, IrError> {
        self.emit_value("const", |dst| Inst::Const {
            dst,
            value: Constant::I32(value),
        })
    }

    /// String constant; identical texts share one interned copy.
    pub fn const_str(&mut self, value: &str) -> Result<ValueId, IrError> {
        let step = self.open("const")?;
        let text = CString::new(value)
            .map_err(|_| IrError::new("const", step, IrErrorKind::InteriorNul))?;
        let strings = &mut self.b.func.strings;
        let id = match strings.iter().position(|s| *s == text) {
            Some(pos) => StrId(pos as u32),
            None => {
                strings.push(text);
                StrId((strings.len() - 1) as u32)
            }
        };
        let dst = self.fresh_value();
        self.emit(
            step,
            Inst::Const {
                dst,
                value: Constant::Str(id),
            },
        )?;
        Ok(dst)
    }

    /// Read the current value of a variable.
    pub fn load(&mut self, name: &str) -> Result<ValueId, IrError> {
        let step = self.open("load")?;
        let var = self.resolve("load", step, name)?;
        let dst = self.fresh_value();
        self.emit(step, Inst::Load { dst, var })?;
        Ok(dst)
    }

    pub fn store(&mut self, name: &str, value: ValueId) -> Result<(), IrError> {
        let step = self.open("store")?;
        let var = self.resolve("store", step, name)?;
        self.emit(step, Inst::Store { var, value })
    }

    /// `base[index]`, where `base` points to an array of `elem`.
    pub fn indexed_load(
        &mut self,
        base: ValueId,
        index: ValueId,
        elem: IrType,
    ) -> Result<ValueId, IrError> {
        self.emit_value("indexed_load", |dst| Inst::IndexedLoad {
            dst,
            base,
            index,
            elem,
        })
    }

    /// `base[index] = value`.
    pub fn indexed_store(
        &mut self,
        base: ValueId,
        index: ValueId,
        value: ValueId,
        elem: IrType,
    ) -> Result<(), IrError> {
        let step = self.open("indexed_store")?;
        self.emit(
            step,
            Inst::IndexedStore {
                base,
                index,
                value,
                elem,
            },
        )
    }

    /// Integer equality, or string-content equality for `str` operands.
    pub fn equal(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId, IrError> {
        self.emit_value("equal", |dst| Inst::Equal { dst, lhs, rhs })
    }

    /// Wrapping 32-bit addition.
    pub fn add(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId, IrError> {
        self.emit_value("add", |dst| Inst::Add { dst, lhs, rhs })
    }

    /// `for var in [start, end) step step { body }`.
    ///
    /// `var` is a fresh `i32` induction variable visible only inside the body.
    pub fn for_loop_ascending<F>(
        &mut self,
        var: &str,
        start: ValueId,
        end: ValueId,
        step_by: ValueId,
        body: F,
    ) -> Result<(), IrError>
    where
        F: FnOnce(&mut ScopeBuilder<'_>) -> Result<(), IrError>,
    {
        const OP: &str = "for_loop_ascending";
        let step = self.open(OP)?;
        let body_scope = self.new_scope();
        let induction = self
            .b
            .declare_var(var, IrType::I32, VarKind::Induction, body_scope)
            .map_err(|kind| IrError::new(OP, step, kind))?;
        let inst = Inst::ForLoop {
            var: induction,
            start,
            end,
            step: step_by,
            body: body_scope,
        };
        if let Err(kind) = self.b.func.check_inst(self.scope, &inst) {
            return Err(IrError::new(OP, step, kind));
        }

        body(&mut self.child(body_scope))?;

        self.emit(step, inst)
    }

    /// Two-armed conditional on a `bool` value.
    pub fn if_then_else<T, E>(
        &mut self,
        cond: ValueId,
        then_arm: T,
        else_arm: E,
    ) -> Result<(), IrError>
    where
        T: FnOnce(&mut ScopeBuilder<'_>) -> Result<(), IrError>,
        E: FnOnce(&mut ScopeBuilder<'_>) -> Result<(), IrError>,
    {
        const OP: &str = "if_then_else";
        let step = self.open(OP)?;
        let then_scope = self.new_scope();
        let else_scope = self.new_scope();
        let inst = Inst::IfThenElse {
            cond,
            then_scope,
            else_scope,
        };
        if let Err(kind) = self.b.func.check_inst(self.scope, &inst) {
            return Err(IrError::new(OP, step, kind));
        }

        then_arm(&mut self.child(then_scope))?;
        else_arm(&mut self.child(else_scope))?;

        self.emit(step, inst)
    }

    pub fn return_value(&mut self, value: ValueId) -> Result<(), IrError> {
        let step = self.open("return_value")?;
        self.emit(step, Inst::Return { value })
    }
}
