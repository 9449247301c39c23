//! IR for the nested-loop string join.
//!
//! Generated pseudo-code:
//! ```text
//! fn join(A: str[], B: str[], R: str[], N: i32, res: i32) -> i32:
//!     result = 0
//!     for a in 1..N:
//!         for b in 1..N:
//!             if A[a] == B[b]:          // string contents
//!                 R[a] = A[a]
//!                 result = result + 1
//!             else:
//!                 R[a] = NOT_FOUND      // baked string constant
//!     return result
//! ```
//!
//! Slot 0 of every array is reserved. The inner loop never exits early, so
//! `R[a]` reflects the comparison against `B[N-1]` only, while `result`
//! counts every equal pair seen. The two can disagree; callers that want
//! first-match semantics must not rely on this kernel.

use crate::builder::IrBuilder;
use crate::config::JoinParams;
use crate::error::IrError;
use crate::ir::{IrFunction, IrType};

/// Parameter types of the join entry point, in order.
pub const JOIN_PARAMS: [IrType; 5] = [
    IrType::StrArray, // A: left
    IrType::StrArray, // B: right
    IrType::StrArray, // R: output
    IrType::I32,      // N: array length including slot 0
    IrType::I32,      // res: legacy, never read
];

pub const JOIN_RETURN: IrType = IrType::I32;

/// True when `func` can be bound to the join entry-point signature.
pub fn has_join_signature(func: &IrFunction) -> bool {
    func.param_types() == JOIN_PARAMS && func.return_type() == JOIN_RETURN
}

/// Assemble the join function.
pub fn build_join_ir(params: &JoinParams) -> Result<IrFunction, IrError> {
    let mut b = IrBuilder::new(&params.function_name, JOIN_RETURN);
    for (name, ty) in ["A", "B", "R", "N", "res"].into_iter().zip(JOIN_PARAMS) {
        b.declare_parameter(name, ty)?;
    }
    b.declare_local("result", IrType::I32)?;

    let mut body = b.body();
    let not_found = body.const_str(&params.not_found)?;
    let left = body.load("A")?;
    let right = body.load("B")?;
    let out = body.load("R")?;
    let n = body.load("N")?;
    let zero = body.const_i32(0)?;
    let one = body.const_i32(1)?;
    body.store("result", zero)?;

    body.for_loop_ascending("a", one, n, one, |outer| {
        outer.for_loop_ascending("b", one, n, one, |inner| {
            let a = inner.load("a")?;
            let b = inner.load("b")?;
            let lhs = inner.indexed_load(left, a, IrType::Str)?;
            let rhs = inner.indexed_load(right, b, IrType::Str)?;
            let matched = inner.equal(lhs, rhs)?;
            inner.if_then_else(
                matched,
                |hit| {
                    let a = hit.load("a")?;
                    let value = hit.indexed_load(left, a, IrType::Str)?;
                    hit.indexed_store(out, a, value, IrType::Str)?;
                    let result = hit.load("result")?;
                    let bumped = hit.add(result, one)?;
                    hit.store("result", bumped)
                },
                |miss| {
                    let a = miss.load("a")?;
                    miss.indexed_store(out, a, not_found, IrType::Str)
                },
            )
        })
    })?;

    let result = body.load("result")?;
    body.return_value(result)?;
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Inst, ScopeId};

    #[test]
    fn test_join_ir_verifies() {
        let func = build_join_ir(&JoinParams::default()).unwrap();
        func.verify().unwrap();
        assert!(has_join_signature(&func));
        assert_eq!(func.name(), "nested_loop_join");
        assert_eq!(func.strings().len(), 1);
        assert_eq!(func.strings()[0].to_str().unwrap(), "Not Found");
    }

    #[test]
    fn test_loops_start_at_one_and_nest() {
        let func = build_join_ir(&JoinParams::default()).unwrap();
        let outer = func
            .body()
            .insts
            .iter()
            .find_map(|inst| match *inst {
                Inst::ForLoop { start, body, .. } => Some((start, body)),
                _ => None,
            })
            .unwrap();
        let start_is_one = func.body().insts.iter().any(|inst| {
            matches!(inst, Inst::Const { dst, value: crate::ir::Constant::I32(1) } if *dst == outer.0)
        });
        assert!(start_is_one, "outer loop must start at index 1");

        let inner = func.scope(outer.1);
        assert!(matches!(inner.insts.as_slice(), [Inst::ForLoop { .. }]));
        assert!(func.terminates(ScopeId::ROOT));
    }

    #[test]
    fn test_legacy_param_is_never_read() {
        let func = build_join_ir(&JoinParams::default()).unwrap();
        assert!(!func.to_string().contains("load res"));
    }

    #[test]
    fn test_custom_marker_and_name() {
        let params = JoinParams {
            function_name: "probe".into(),
            not_found: "<none>".into(),
        };
        let func = build_join_ir(&params).unwrap();
        let text = func.to_string();
        assert!(text.starts_with("fn probe(A: str[], B: str[], R: str[], N: i32, res: i32) -> i32 {"));
        assert!(text.contains("\"<none>\""));
    }
}
