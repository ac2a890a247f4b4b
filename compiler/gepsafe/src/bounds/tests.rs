use gepsafe_ir::{FunctionBuilder, Module, TypeId};
use pretty_assertions::assert_eq;

use crate::alloc_size::{track_allocations, ElementCount};
use crate::config::GepSafeConfig;
use crate::test_helpers::{do_list, do_struct, do_stuff, heap_ints, single, struct_types};

use super::*;

/// Synthesize a plan for every address computation of the module's first
/// function.
fn plans(module: &Module) -> Vec<Result<BoundsPlan, ContractViolation>> {
    let func = &module.functions[0];
    let allocs = track_allocations(func, &module.types, &GepSafeConfig::default());
    collect_address_computations(func)
        .pending
        .iter()
        .map(|site| synthesize(func, &module.types, site, &allocs))
        .collect()
}

fn plan_ok(result: &Result<BoundsPlan, ContractViolation>) -> &BoundsPlan {
    result
        .as_ref()
        .unwrap_or_else(|e| panic!("unexpected contract violation: {e}"))
}

#[test]
fn constant_array_gets_pointer_and_range_checks() {
    let module = single(do_stuff);
    let plans = plans(&module);
    assert_eq!(plans.len(), 2);
    for result in &plans {
        let plan = plan_ok(result);
        assert_eq!(plan.checked, 2);
        assert_eq!(plan.skipped, 0);
        let condition = plan
            .condition
            .as_ref()
            .unwrap_or_else(|| panic!("array access needs a condition"));
        let checks = condition.checks();
        assert_eq!(checks[0].step, 0);
        assert_eq!(
            checks[0].upper,
            UpperBound::Allocation(ElementCount::Value(Operand::i32(1)))
        );
        assert_eq!(checks[1].step, 1);
        assert_eq!(checks[1].upper, UpperBound::Static(10));
    }
}

#[test]
fn struct_field_with_array_member() {
    let module = single(|pool| {
        let types = struct_types(pool);
        do_struct(pool, &types)
    });
    let plans = plans(&module);

    // n.c2[1]: unknown base, constant field, array element.
    let c2 = plan_ok(&plans[0]);
    assert_eq!((c2.checked, c2.skipped), (1, 1));
    let checks = c2
        .condition
        .as_ref()
        .map(Condition::checks)
        .unwrap_or_default();
    assert_eq!(
        checks,
        &[RangeCheck {
            step: 2,
            index: Operand::i64(1),
            upper: UpperBound::Static(2),
        }]
    );

    // n.c1: unknown base, constant field; nothing to check.
    let c1 = plan_ok(&plans[1]);
    assert_eq!((c1.checked, c1.skipped), (0, 1));
    assert_eq!(c1.condition, None);
}

#[test]
fn linked_list_accesses_need_no_guard() {
    let module = single(|pool| {
        let types = struct_types(pool);
        do_list(pool, &types)
    });
    for result in &plans(&module) {
        let plan = plan_ok(result);
        assert_eq!(plan.condition, None);
        assert_eq!((plan.checked, plan.skipped), (0, 1));
    }
}

#[test]
fn heap_pointer_checked_against_rescaled_count() {
    let module = single(|pool| heap_ints(pool, 40));
    let plans = plans(&module);
    let plan = plan_ok(&plans[0]);
    assert_eq!((plan.checked, plan.skipped), (1, 0));
    let checks = plan
        .condition
        .as_ref()
        .map(Condition::checks)
        .unwrap_or_default();
    match &checks[0].upper {
        UpperBound::Allocation(count) => assert_eq!(count.fold(&module.types), Some(10)),
        other => panic!("expected allocation bound, got {other:?}"),
    }
}

#[test]
fn non_constant_field_index_is_a_violation() {
    let module = single(|pool| {
        let types = struct_types(pool);
        let example_ptr = pool.pointer(types.example);
        let mut b = FunctionBuilder::new(pool, "f", &[example_ptr, TypeId::I32], TypeId::VOID);
        let n = b.param(0);
        let field = b.param(1);
        b.gep(n, &[Operand::i32(0), Operand::Value(field)], TypeId::I32);
        b.ret(None);
        b.finish()
    });
    assert_eq!(
        plans(&module)[0],
        Err(ContractViolation::NonConstantFieldIndex {
            gep: ValueId::new(2),
            step: 1
        })
    );
}

#[test]
fn out_of_range_field_is_a_violation() {
    let module = single(|pool| {
        let types = struct_types(pool);
        let example_ptr = pool.pointer(types.example);
        let mut b = FunctionBuilder::new(pool, "f", &[example_ptr], TypeId::VOID);
        let n = b.param(0);
        b.gep(n, &[Operand::i32(0), Operand::i32(4)], TypeId::I32);
        b.ret(None);
        b.finish()
    });
    assert_eq!(
        plans(&module)[0],
        Err(ContractViolation::FieldIndexOutOfRange {
            gep: ValueId::new(1),
            step: 1,
            field: 4,
            field_count: 4,
        })
    );
}

#[test]
fn pointer_after_first_index_is_a_violation() {
    let module = single(|pool| {
        let i32_ptr = pool.pointer(TypeId::I32);
        let holder = pool.literal_struct(&[i32_ptr]);
        let holder_ptr = pool.pointer(holder);
        let mut b = FunctionBuilder::new(pool, "f", &[holder_ptr], TypeId::VOID);
        let h = b.param(0);
        b.gep(
            h,
            &[Operand::i32(0), Operand::i32(0), Operand::i64(3)],
            TypeId::I32,
        );
        b.ret(None);
        b.finish()
    });
    assert_eq!(
        plans(&module)[0],
        Err(ContractViolation::PointerAfterFirstIndex {
            gep: ValueId::new(1),
            step: 2
        })
    );
}

#[test]
fn vector_index_is_a_violation() {
    let module = single(|pool| {
        let v4 = pool.vector(TypeId::F32, 4);
        let v4_ptr = pool.pointer(v4);
        let mut b = FunctionBuilder::new(pool, "f", &[v4_ptr], TypeId::VOID);
        let v = b.param(0);
        b.gep(v, &[Operand::i64(0), Operand::i64(2)], TypeId::F32);
        b.ret(None);
        b.finish()
    });
    assert_eq!(
        plans(&module)[0],
        Err(ContractViolation::VectorIndex {
            gep: ValueId::new(1),
            step: 1
        })
    );
}

#[test]
fn scalar_index_is_a_violation() {
    let module = single(|pool| {
        let i32_ptr = pool.pointer(TypeId::I32);
        let mut b = FunctionBuilder::new(pool, "f", &[i32_ptr], TypeId::VOID);
        let p = b.param(0);
        b.gep(p, &[Operand::i64(0), Operand::i64(0)], TypeId::I32);
        b.ret(None);
        b.finish()
    });
    let result = &plans(&module)[0];
    assert_eq!(
        result,
        &Err(ContractViolation::UnindexableType {
            gep: ValueId::new(1),
            step: 1,
            ty: "i32".to_owned(),
        })
    );
}

#[test]
fn collection_skips_guarded_computations() {
    let mut module = single(do_stuff);
    let func = &mut module.functions[0];
    if let Some(Instr::Gep { flags, .. }) = func.blocks[0]
        .body
        .iter_mut()
        .find(|i| i.is_address_computation())
    {
        flags.insert(GepFlags::GUARDED);
    }
    let sites = collect_address_computations(func);
    assert_eq!(sites.already_guarded, 1);
    assert_eq!(sites.pending.len(), 1);
    assert_eq!(sites.pending[0].indices.len(), 2);
    assert_eq!(
        sites.pending[0].location,
        gepsafe_ir::InstrLocation {
            block: gepsafe_ir::BlockId::new(0),
            index: 5,
        }
    );
}
