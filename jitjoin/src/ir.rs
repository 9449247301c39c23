//! Target-independent IR for generated join functions.
//!
//! A function is a tree of scopes. The root scope is the function body;
//! `ForLoop` and `IfThenElse` instructions own child scopes (loop body, then
//! arm, else arm). Values are SSA handles tagged with the scope that defined
//! them, and may only be used from that scope or scopes nested inside it.
//! Variables (parameters, locals, loop induction variables) are mutable
//! named slots accessed through `Load` / `Store`.
//!
//! The graph is built with [`crate::builder::IrBuilder`] and lowered to
//! machine code by [`crate::lower`].

use std::ffi::{CStr, CString};
use std::fmt;

use crate::error::{IrError, IrErrorKind};

/// Scalar types carried by IR values and variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Signed 32-bit integer.
    I32,
    /// Result of a comparison.
    Bool,
    /// Pointer to a NUL-terminated string.
    Str,
    /// Pointer to an array of `Str`.
    StrArray,
}

impl IrType {
    /// Element type when this type is an array pointer.
    pub fn element(self) -> Option<IrType> {
        match self {
            IrType::StrArray => Some(IrType::Str),
            _ => None,
        }
    }

    /// Array-pointer type whose elements are `self`.
    pub fn array_of(self) -> Option<IrType> {
        match self {
            IrType::Str => Some(IrType::StrArray),
            _ => None,
        }
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, IrType::Str | IrType::StrArray)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IrType::I32 => "i32",
            IrType::Bool => "bool",
            IrType::Str => "str",
            IrType::StrArray => "str[]",
        })
    }
}

/// Handle to an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle to a named variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a scope (function body, loop body or branch arm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) u32);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an interned string constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub(crate) u32);

impl StrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    I32(i32),
    Str(StrId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Param,
    Local,
    Induction,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: IrType,
    pub kind: VarKind,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, Copy)]
pub struct ValueDecl {
    pub ty: IrType,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Const {
        dst: ValueId,
        value: Constant,
    },
    Load {
        dst: ValueId,
        var: VarId,
    },
    Store {
        var: VarId,
        value: ValueId,
    },
    IndexedLoad {
        dst: ValueId,
        base: ValueId,
        index: ValueId,
        elem: IrType,
    },
    IndexedStore {
        base: ValueId,
        index: ValueId,
        value: ValueId,
        elem: IrType,
    },
    Equal {
        dst: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    Add {
        dst: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// `for var in [start, end) step step { body }`, bounds evaluated once.
    ForLoop {
        var: VarId,
        start: ValueId,
        end: ValueId,
        step: ValueId,
        body: ScopeId,
    },
    IfThenElse {
        cond: ValueId,
        then_scope: ScopeId,
        else_scope: ScopeId,
    },
    Return {
        value: ValueId,
    },
}

impl Inst {
    pub fn op_name(&self) -> &'static str {
        match self {
            Inst::Const { .. } => "const",
            Inst::Load { .. } => "load",
            Inst::Store { .. } => "store",
            Inst::IndexedLoad { .. } => "indexed_load",
            Inst::IndexedStore { .. } => "indexed_store",
            Inst::Equal { .. } => "equal",
            Inst::Add { .. } => "add",
            Inst::ForLoop { .. } => "for_loop_ascending",
            Inst::IfThenElse { .. } => "if_then_else",
            Inst::Return { .. } => "return_value",
        }
    }

    /// Value defined by this instruction, if any.
    pub fn dst(&self) -> Option<ValueId> {
        match *self {
            Inst::Const { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::IndexedLoad { dst, .. }
            | Inst::Equal { dst, .. }
            | Inst::Add { dst, .. } => Some(dst),
            _ => None,
        }
    }

    /// Values read by this instruction.
    pub fn operands(&self) -> Vec<ValueId> {
        match *self {
            Inst::Const { .. } | Inst::Load { .. } => vec![],
            Inst::Store { value, .. } => vec![value],
            Inst::IndexedLoad { base, index, .. } => vec![base, index],
            Inst::IndexedStore {
                base, index, value, ..
            } => vec![base, index, value],
            Inst::Equal { lhs, rhs, .. } | Inst::Add { lhs, rhs, .. } => vec![lhs, rhs],
            Inst::ForLoop {
                start, end, step, ..
            } => vec![start, end, step],
            Inst::IfThenElse { cond, .. } => vec![cond],
            Inst::Return { value } => vec![value],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub insts: Vec<Inst>,
}

/// One function of the IR graph.
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub(crate) name: String,
    pub(crate) return_type: IrType,
    pub(crate) params: Vec<VarId>,
    pub(crate) vars: Vec<VarDecl>,
    pub(crate) values: Vec<ValueDecl>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) strings: Vec<CString>,
}

impl IrFunction {
    pub(crate) fn new(name: &str, return_type: IrType) -> Self {
        Self {
            name: name.to_string(),
            return_type,
            params: Vec::new(),
            vars: Vec::new(),
            values: Vec::new(),
            scopes: vec![Scope::default()],
            strings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> IrType {
        self.return_type
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> impl Iterator<Item = (VarId, &VarDecl)> + '_ {
        self.params.iter().map(move |&id| (id, &self.vars[id.index()]))
    }

    pub fn param_types(&self) -> Vec<IrType> {
        self.params().map(|(_, decl)| decl.ty).collect()
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.index()]
    }

    pub fn vars(&self) -> &[VarDecl] {
        &self.vars
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value_type(&self, id: ValueId) -> IrType {
        self.values[id.index()].ty
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn body(&self) -> &Scope {
        self.scope(ScopeId::ROOT)
    }

    pub fn strings(&self) -> &[CString] {
        &self.strings
    }

    pub fn string(&self, id: StrId) -> &CStr {
        &self.strings[id.index()]
    }

    /// True when `from` is `def` or nested inside it.
    pub fn is_visible(&self, from: ScopeId, def: ScopeId) -> bool {
        let mut cur = Some(from);
        while let Some(scope) = cur {
            if scope == def {
                return true;
            }
            cur = self.scopes[scope.index()].parent;
        }
        false
    }

    /// Innermost variable named `name` visible from `from`.
    pub fn lookup_var(&self, from: ScopeId, name: &str) -> Option<VarId> {
        self.vars
            .iter()
            .enumerate()
            .rev()
            .find(|(_, decl)| decl.name == name && self.is_visible(from, decl.scope))
            .map(|(i, _)| VarId(i as u32))
    }

    /// True when control cannot fall off the end of `scope`.
    pub fn terminates(&self, scope: ScopeId) -> bool {
        match self.scope(scope).insts.last() {
            Some(Inst::Return { .. }) => true,
            Some(Inst::IfThenElse {
                then_scope,
                else_scope,
                ..
            }) => self.terminates(*then_scope) && self.terminates(*else_scope),
            _ => false,
        }
    }

    fn operand_type(&self, from: ScopeId, value: ValueId) -> Result<IrType, IrErrorKind> {
        let decl = self
            .values
            .get(value.index())
            .ok_or(IrErrorKind::UndefinedValue(value))?;
        if !self.is_visible(from, decl.scope) {
            return Err(IrErrorKind::OutOfScope(value));
        }
        Ok(decl.ty)
    }

    fn expect_type(&self, from: ScopeId, value: ValueId, ty: IrType) -> Result<(), IrErrorKind> {
        let found = self.operand_type(from, value)?;
        if found != ty {
            return Err(IrErrorKind::TypeMismatch { expected: ty, found });
        }
        Ok(())
    }

    fn expect_array_of(
        &self,
        from: ScopeId,
        base: ValueId,
        elem: IrType,
    ) -> Result<(), IrErrorKind> {
        let found = self.operand_type(from, base)?;
        match (found.element(), elem.array_of()) {
            (Some(actual), _) if actual == elem => Ok(()),
            (None, _) => Err(IrErrorKind::NotAnArray(found)),
            (Some(_), Some(expected)) => Err(IrErrorKind::TypeMismatch { expected, found }),
            (Some(_), None) => Err(IrErrorKind::NotAnArray(elem)),
        }
    }

    fn expect_var(&self, from: ScopeId, var: VarId) -> Result<&VarDecl, IrErrorKind> {
        let decl = self.var(var);
        if self.is_visible(from, decl.scope) {
            Ok(decl)
        } else {
            Err(IrErrorKind::VariableOutOfScope(decl.name.clone()))
        }
    }

    /// Value of `v` when it is defined by an `i32` constant.
    fn const_i32(&self, v: ValueId) -> Option<i32> {
        self.scopes
            .iter()
            .flat_map(|scope| &scope.insts)
            .find_map(|inst| match *inst {
                Inst::Const {
                    dst,
                    value: Constant::I32(n),
                } if dst == v => Some(n),
                _ => None,
            })
    }

    /// Type of the value `inst` defines, after checking its operands from `scope`.
    pub(crate) fn check_inst(
        &self,
        scope: ScopeId,
        inst: &Inst,
    ) -> Result<Option<IrType>, IrErrorKind> {
        match *inst {
            Inst::Const { value, .. } => Ok(Some(match value {
                Constant::I32(_) => IrType::I32,
                Constant::Str(_) => IrType::Str,
            })),
            Inst::Load { var, .. } => Ok(Some(self.expect_var(scope, var)?.ty)),
            Inst::Store { var, value } => {
                let ty = self.expect_var(scope, var)?.ty;
                self.expect_type(scope, value, ty)?;
                Ok(None)
            }
            Inst::IndexedLoad {
                base, index, elem, ..
            } => {
                self.expect_array_of(scope, base, elem)?;
                self.expect_type(scope, index, IrType::I32)?;
                Ok(Some(elem))
            }
            Inst::IndexedStore {
                base,
                index,
                value,
                elem,
            } => {
                self.expect_array_of(scope, base, elem)?;
                self.expect_type(scope, index, IrType::I32)?;
                self.expect_type(scope, value, elem)?;
                Ok(None)
            }
            Inst::Equal { lhs, rhs, .. } => {
                let ty = self.operand_type(scope, lhs)?;
                if !matches!(ty, IrType::I32 | IrType::Str) {
                    return Err(IrErrorKind::NotComparable(ty));
                }
                self.expect_type(scope, rhs, ty)?;
                Ok(Some(IrType::Bool))
            }
            Inst::Add { lhs, rhs, .. } => {
                self.expect_type(scope, lhs, IrType::I32)?;
                self.expect_type(scope, rhs, IrType::I32)?;
                Ok(Some(IrType::I32))
            }
            Inst::ForLoop {
                var,
                start,
                end,
                step,
                ..
            } => {
                let decl = self.var(var);
                if decl.ty != IrType::I32 {
                    return Err(IrErrorKind::TypeMismatch {
                        expected: IrType::I32,
                        found: decl.ty,
                    });
                }
                self.expect_type(scope, start, IrType::I32)?;
                self.expect_type(scope, end, IrType::I32)?;
                self.expect_type(scope, step, IrType::I32)?;
                match self.const_i32(step) {
                    Some(n) if n > 0 => Ok(None),
                    Some(n) => Err(IrErrorKind::NonPositiveStep(n)),
                    None => Err(IrErrorKind::NonConstantStep(step)),
                }
            }
            Inst::IfThenElse { cond, .. } => {
                self.expect_type(scope, cond, IrType::Bool)?;
                Ok(None)
            }
            Inst::Return { value } => {
                self.expect_type(scope, value, self.return_type)?;
                Ok(None)
            }
        }
    }

    /// Re-check a finished graph: operand visibility and definition order,
    /// types, terminator placement and return coverage.
    pub fn verify(&self) -> Result<(), IrError> {
        let mut defined = vec![false; self.values.len()];
        let mut step = 0;
        self.verify_scope(ScopeId::ROOT, &mut defined, &mut step)?;
        if !self.terminates(ScopeId::ROOT) {
            return Err(IrError::new("finish", step, IrErrorKind::MissingReturn));
        }
        Ok(())
    }

    fn verify_scope(
        &self,
        scope: ScopeId,
        defined: &mut [bool],
        step: &mut usize,
    ) -> Result<(), IrError> {
        let insts = &self.scope(scope).insts;
        for (i, inst) in insts.iter().enumerate() {
            let at = *step;
            *step += 1;
            let fail = |kind| IrError::new(inst.op_name(), at, kind);

            if i + 1 < insts.len() && self.ends_control(inst) {
                return Err(fail(IrErrorKind::AfterTerminator));
            }
            for operand in inst.operands() {
                if !defined.get(operand.index()).copied().unwrap_or(false) {
                    return Err(fail(IrErrorKind::UndefinedValue(operand)));
                }
            }
            let ty = self.check_inst(scope, inst).map_err(fail)?;
            if let Some(dst) = inst.dst() {
                let decl = self
                    .values
                    .get(dst.index())
                    .ok_or_else(|| fail(IrErrorKind::UndefinedValue(dst)))?;
                if Some(decl.ty) != ty || decl.scope != scope {
                    return Err(fail(IrErrorKind::OutOfScope(dst)));
                }
                defined[dst.index()] = true;
            }
            match *inst {
                Inst::ForLoop { body, .. } => self.verify_scope(body, defined, step)?,
                Inst::IfThenElse {
                    then_scope,
                    else_scope,
                    ..
                } => {
                    self.verify_scope(then_scope, defined, step)?;
                    self.verify_scope(else_scope, defined, step)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn ends_control(&self, inst: &Inst) -> bool {
        match *inst {
            Inst::Return { .. } => true,
            Inst::IfThenElse {
                then_scope,
                else_scope,
                ..
            } => self.terminates(then_scope) && self.terminates(else_scope),
            _ => false,
        }
    }

    fn fmt_scope(&self, f: &mut fmt::Formatter<'_>, scope: ScopeId, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        for inst in &self.scope(scope).insts {
            match *inst {
                Inst::Const { dst, value } => match value {
                    Constant::I32(n) => writeln!(f, "{pad}{dst} = const {n}")?,
                    Constant::Str(id) => {
                        writeln!(f, "{pad}{dst} = const {:?}", self.string(id))?
                    }
                },
                Inst::Load { dst, var } => {
                    writeln!(f, "{pad}{dst} = load {}", self.var(var).name)?
                }
                Inst::Store { var, value } => {
                    writeln!(f, "{pad}store {}, {value}", self.var(var).name)?
                }
                Inst::IndexedLoad {
                    dst,
                    base,
                    index,
                    elem,
                } => writeln!(f, "{pad}{dst} = load.{elem} {base}[{index}]")?,
                Inst::IndexedStore {
                    base,
                    index,
                    value,
                    elem,
                } => writeln!(f, "{pad}store.{elem} {base}[{index}], {value}")?,
                Inst::Equal { dst, lhs, rhs } => writeln!(f, "{pad}{dst} = eq {lhs}, {rhs}")?,
                Inst::Add { dst, lhs, rhs } => writeln!(f, "{pad}{dst} = add {lhs}, {rhs}")?,
                Inst::ForLoop {
                    var,
                    start,
                    end,
                    step,
                    body,
                } => {
                    writeln!(
                        f,
                        "{pad}for {} in {start}..{end} step {step} {{",
                        self.var(var).name
                    )?;
                    self.fmt_scope(f, body, depth + 1)?;
                    writeln!(f, "{pad}}}")?;
                }
                Inst::IfThenElse {
                    cond,
                    then_scope,
                    else_scope,
                } => {
                    writeln!(f, "{pad}if {cond} {{")?;
                    self.fmt_scope(f, then_scope, depth + 1)?;
                    writeln!(f, "{pad}}} else {{")?;
                    self.fmt_scope(f, else_scope, depth + 1)?;
                    writeln!(f, "{pad}}}")?;
                }
                Inst::Return { value } => writeln!(f, "{pad}return {value}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params()
            .map(|(_, decl)| format!("{}: {}", decl.name, decl.ty))
            .collect();
        writeln!(
            f,
            "fn {}({}) -> {} {{",
            self.name,
            params.join(", "),
            self.return_type
        )?;
        for decl in self.vars.iter().filter(|d| d.kind == VarKind::Local) {
            writeln!(f, "    local {}: {}", decl.name, decl.ty)?;
        }
        self.fmt_scope(f, ScopeId::ROOT, 1)?;
        writeln!(f, "}}")
    }
}
