//! Lowering of [`IrFunction`] to Cranelift IR.
//!
//! Each IR variable becomes a Cranelift `Variable`; SSA values map one to
//! one onto Cranelift values. Control flow is lowered structurally:
//!
//! ```text
//! for v in [start, end) step s { body }     if c { then } else { else }
//!
//!     v = start                                 brif c, then, else
//!     jump header                           then:
//! header:                                       ...
//!     brif v < end, body, exit                  jump merge
//! body:                                     else:
//!     ...                                       ...
//!     v = v + s                                 jump merge
//!     jump header                           merge:
//! exit:
//! ```
//!
//! Arms and bodies that end in `return` get no outgoing jump, and a merge
//! block is only created when at least one arm falls through.
//!
//! String constants are baked as pointer immediates; the caller supplies
//! their addresses and keeps the bytes alive for the lifetime of the code.
//! `str` equality calls the runtime `jitjoin_str_eq` helper.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::types;
use cranelift_codegen::ir::{FuncRef, Function, InstBuilder, MemFlags, Type, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};

use crate::error::JitError;
use crate::ir::{Constant, Inst, IrFunction, IrType, ScopeId, ValueId, VarId, VarKind};

/// Cranelift type carrying an IR type.
pub fn clif_type(ty: IrType, ptr_type: Type) -> Type {
    match ty {
        IrType::I32 => types::I32,
        IrType::Bool => types::I8,
        IrType::Str | IrType::StrArray => ptr_type,
    }
}

/// Symbols and addresses the lowered body refers to.
pub struct LowerEnv<'a> {
    pub ptr_type: Type,
    /// Imported `jitjoin_str_eq(a, b) -> i32`.
    pub str_eq: FuncRef,
    /// Address of each interned string constant, indexed by `StrId`.
    pub string_addrs: &'a [i64],
}

/// Fill `func` (whose signature is already set) with the body of `ir`.
pub fn build_function_ir(
    func: &mut Function,
    ir: &IrFunction,
    env: &LowerEnv<'_>,
) -> Result<(), JitError> {
    let mut fbc = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(func, &mut fbc);

    let vars: Vec<Variable> = ir
        .vars()
        .iter()
        .enumerate()
        .map(|(i, decl)| {
            let var = Variable::from_u32(i as u32);
            builder.declare_var(var, clif_type(decl.ty, env.ptr_type));
            var
        })
        .collect();

    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);

    for (position, (id, _)) in ir.params().enumerate() {
        let param = builder.block_params(entry)[position];
        builder.def_var(vars[id.index()], param);
    }
    for (i, decl) in ir.vars().iter().enumerate() {
        if decl.kind == VarKind::Local {
            let zero = builder
                .ins()
                .iconst(clif_type(decl.ty, env.ptr_type), 0);
            builder.def_var(vars[i], zero);
        }
    }

    let mut lowerer = Lowerer {
        builder,
        ir,
        env,
        vars,
        values: vec![None; ir.value_count()],
    };
    let terminated = lowerer.lower_scope(ScopeId::ROOT)?;
    if !terminated {
        return Err(JitError::Codegen(format!(
            "function `{}` falls off the end without a return",
            ir.name()
        )));
    }

    lowerer.builder.finalize();
    Ok(())
}

struct Lowerer<'a, 'f> {
    builder: FunctionBuilder<'f>,
    ir: &'a IrFunction,
    env: &'a LowerEnv<'a>,
    vars: Vec<Variable>,
    values: Vec<Option<Value>>,
}

impl Lowerer<'_, '_> {
    fn value(&self, id: ValueId) -> Result<Value, JitError> {
        self.values
            .get(id.index())
            .copied()
            .flatten()
            .ok_or_else(|| JitError::Codegen(format!("{id} used before definition")))
    }

    fn var(&self, id: VarId) -> Variable {
        self.vars[id.index()]
    }

    fn define(&mut self, id: ValueId, value: Value) {
        self.values[id.index()] = Some(value);
    }

    /// Address of `base[index]` for pointer-sized elements.
    fn element_addr(&mut self, base: ValueId, index: ValueId) -> Result<Value, JitError> {
        let ptr_type = self.env.ptr_type;
        let base = self.value(base)?;
        let index = self.value(index)?;
        let index = if ptr_type == types::I32 {
            index
        } else {
            self.builder.ins().sextend(ptr_type, index)
        };
        let offset = self
            .builder
            .ins()
            .imul_imm(index, i64::from(ptr_type.bytes()));
        Ok(self.builder.ins().iadd(base, offset))
    }

    /// Lower one scope into the current block. Returns true when control
    /// cannot fall through past its end.
    fn lower_scope(&mut self, scope: ScopeId) -> Result<bool, JitError> {
        let ir = self.ir;
        for inst in &ir.scope(scope).insts {
            match *inst {
                Inst::Const { dst, value } => {
                    let v = match value {
                        Constant::I32(n) => self.builder.ins().iconst(types::I32, i64::from(n)),
                        Constant::Str(id) => {
                            let addr = *self.env.string_addrs.get(id.index()).ok_or_else(|| {
                                JitError::Codegen(format!(
                                    "no address for string constant {}",
                                    id.index()
                                ))
                            })?;
                            let ptr_type = self.env.ptr_type;
                            self.builder.ins().iconst(ptr_type, addr)
                        }
                    };
                    self.define(dst, v);
                }
                Inst::Load { dst, var } => {
                    let var = self.var(var);
                    let v = self.builder.use_var(var);
                    self.define(dst, v);
                }
                Inst::Store { var, value } => {
                    let var = self.var(var);
                    let v = self.value(value)?;
                    self.builder.def_var(var, v);
                }
                Inst::IndexedLoad {
                    dst,
                    base,
                    index,
                    elem,
                } => {
                    let addr = self.element_addr(base, index)?;
                    let ty = clif_type(elem, self.env.ptr_type);
                    let v = self.builder.ins().load(ty, MemFlags::trusted(), addr, 0);
                    self.define(dst, v);
                }
                Inst::IndexedStore {
                    base, index, value, ..
                } => {
                    let addr = self.element_addr(base, index)?;
                    let v = self.value(value)?;
                    self.builder.ins().store(MemFlags::trusted(), v, addr, 0);
                }
                Inst::Equal { dst, lhs, rhs } => {
                    let a = self.value(lhs)?;
                    let b = self.value(rhs)?;
                    let v = match ir.value_type(lhs) {
                        IrType::Str => {
                            let str_eq = self.env.str_eq;
                            let call = self.builder.ins().call(str_eq, &[a, b]);
                            let eq = self.builder.inst_results(call)[0];
                            self.builder.ins().icmp_imm(IntCC::NotEqual, eq, 0)
                        }
                        _ => self.builder.ins().icmp(IntCC::Equal, a, b),
                    };
                    self.define(dst, v);
                }
                Inst::Add { dst, lhs, rhs } => {
                    let a = self.value(lhs)?;
                    let b = self.value(rhs)?;
                    let v = self.builder.ins().iadd(a, b);
                    self.define(dst, v);
                }
                Inst::ForLoop {
                    var,
                    start,
                    end,
                    step,
                    body,
                } => self.lower_loop(var, start, end, step, body)?,
                Inst::IfThenElse {
                    cond,
                    then_scope,
                    else_scope,
                } => {
                    if self.lower_if(cond, then_scope, else_scope)? {
                        return Ok(true);
                    }
                }
                Inst::Return { value } => {
                    let v = self.value(value)?;
                    self.builder.ins().return_(&[v]);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn lower_loop(
        &mut self,
        var: VarId,
        start: ValueId,
        end: ValueId,
        step: ValueId,
        body: ScopeId,
    ) -> Result<(), JitError> {
        let var = self.var(var);
        let start = self.value(start)?;
        let end = self.value(end)?;
        let step = self.value(step)?;

        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.def_var(var, start);
        self.builder.ins().jump(header, &[]);

        // ── header: v < end ──
        self.builder.switch_to_block(header);
        let i = self.builder.use_var(var);
        let in_range = self.builder.ins().icmp(IntCC::SignedLessThan, i, end);
        self.builder
            .ins()
            .brif(in_range, body_block, &[], exit, &[]);

        // ── body ──
        self.builder.switch_to_block(body_block);
        self.builder.seal_block(body_block);
        if !self.lower_scope(body)? {
            let i = self.builder.use_var(var);
            let next = self.builder.ins().iadd(i, step);
            self.builder.def_var(var, next);
            self.builder.ins().jump(header, &[]);
        }
        self.builder.seal_block(header);

        // ── exit ──
        self.builder.switch_to_block(exit);
        self.builder.seal_block(exit);
        Ok(())
    }

    /// Returns true when both arms end in a return.
    fn lower_if(
        &mut self,
        cond: ValueId,
        then_scope: ScopeId,
        else_scope: ScopeId,
    ) -> Result<bool, JitError> {
        let cond = self.value(cond)?;
        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        self.builder
            .ins()
            .brif(cond, then_block, &[], else_block, &[]);

        let mut merge = None;

        self.builder.switch_to_block(then_block);
        self.builder.seal_block(then_block);
        if !self.lower_scope(then_scope)? {
            let block = self.builder.create_block();
            self.builder.ins().jump(block, &[]);
            merge = Some(block);
        }

        self.builder.switch_to_block(else_block);
        self.builder.seal_block(else_block);
        if !self.lower_scope(else_scope)? {
            let block = match merge {
                Some(block) => block,
                None => self.builder.create_block(),
            };
            self.builder.ins().jump(block, &[]);
            merge = Some(block);
        }

        match merge {
            Some(block) => {
                self.builder.switch_to_block(block);
                self.builder.seal_block(block);
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
