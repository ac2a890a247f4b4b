//! End-to-end tests: instrument a module, then run it in the reference
//! evaluator and compare against the uninstrumented run.

use gepsafe_eval::{EvalError, Interpreter, Outcome, RuntimeValue};
use gepsafe_ir::{BlockId, Function, FunctionBuilder, Module, Operand, TypeId, TypePool};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::test_helpers::{do_stuff, getelem_module, heap_ints, single, vla};
use crate::{run_on_module, GepSafeConfig};

fn instrumented(mut module: Module) -> Module {
    crate::init_tracing();
    run_on_module(&mut module, &GepSafeConfig::default())
        .unwrap_or_else(|e| panic!("pass failed: {e}"));
    module
}

fn eval(module: &Module, name: &str, args: &[RuntimeValue]) -> Result<Outcome, EvalError> {
    Interpreter::new(module).run(name, args)
}

fn i32_arg(value: i32) -> RuntimeValue {
    RuntimeValue::int(32, i64::from(value))
}

fn trapped_in(function: &str, block: u32) -> Outcome {
    Outcome::Trapped {
        function: function.to_owned(),
        block: BlockId::new(block),
    }
}

#[test]
fn in_bounds_behaviour_is_unchanged() {
    let plain = single(do_stuff);
    let guarded = instrumented(single(do_stuff));
    for n in 0..10 {
        let expected = eval(&plain, "doStuff", &[i32_arg(n)]);
        assert_eq!(eval(&guarded, "doStuff", &[i32_arg(n)]), expected);
        assert_eq!(expected, Ok(Outcome::Returned(Some(i32_arg(3)))));
    }
}

#[test]
fn out_of_bounds_store_traps_instead_of_faulting() {
    let plain = single(do_stuff);
    assert!(matches!(
        eval(&plain, "doStuff", &[i32_arg(10)]),
        Err(EvalError::OutOfBounds { .. })
    ));

    let guarded = instrumented(single(do_stuff));
    assert_eq!(
        eval(&guarded, "doStuff", &[i32_arg(10)]),
        Ok(trapped_in("doStuff", 2))
    );
}

#[test]
fn negative_index_traps() {
    let guarded = instrumented(single(do_stuff));
    assert_eq!(
        eval(&guarded, "doStuff", &[i32_arg(-1)]),
        Ok(trapped_in("doStuff", 2))
    );
}

#[test]
fn getelem_main_traps_in_do_stuff() {
    let plain = getelem_module();
    assert!(matches!(
        eval(&plain, "main", &[]),
        Err(EvalError::OutOfBounds { .. })
    ));

    let guarded = instrumented(getelem_module());
    assert_eq!(eval(&guarded, "main", &[]), Ok(trapped_in("doStuff", 2)));
}

#[test]
fn heap_array_bound_comes_from_malloc_size() {
    let guarded = instrumented(single(|pool| heap_ints(pool, 40)));
    let i = |v: i64| RuntimeValue::int(64, v);
    assert_eq!(
        eval(&guarded, "heap", &[i(9)]),
        Ok(Outcome::Returned(Some(i32_arg(7))))
    );
    assert_eq!(eval(&guarded, "heap", &[i(10)]), Ok(trapped_in("heap", 2)));

    let plain = single(|pool| heap_ints(pool, 40));
    assert!(matches!(
        eval(&plain, "heap", &[i(10)]),
        Err(EvalError::OutOfBounds { .. })
    ));
}

#[test]
fn variable_length_array_bound_is_runtime_length() {
    let guarded = instrumented(single(vla));
    assert_eq!(
        eval(&guarded, "vla", &[i32_arg(4), i32_arg(3)]),
        Ok(Outcome::Returned(Some(i32_arg(3))))
    );
    assert_eq!(
        eval(&guarded, "vla", &[i32_arg(4), i32_arg(4)]),
        Ok(trapped_in("vla", 2))
    );
    assert_eq!(
        eval(&guarded, "vla", &[i32_arg(0), i32_arg(0)]),
        Ok(trapped_in("vla", 2))
    );
}

/// ```c
/// char bytes(long len, signed char i) { char a[len]; a[i] = 5; return a[i]; }
/// ```
fn byte_vla(pool: &mut TypePool) -> Function {
    let mut b = FunctionBuilder::new(pool, "bytes", &[TypeId::I64, TypeId::I8], TypeId::I8);
    let len = b.param(0);
    let i = b.param(1);
    let a = b.alloca(TypeId::I8, Operand::Value(len));
    let slot = b.inbounds_gep(a, &[Operand::Value(i)], TypeId::I8);
    b.store(Operand::int(TypeId::I8, 5), slot);
    let v = b.load(TypeId::I8, slot);
    b.ret(Some(Operand::Value(v)));
    b.finish()
}

/// ```c
/// char table(signed char i) { char t[200]; t[i] = 5; return t[i]; }
/// ```
fn byte_table(pool: &mut TypePool) -> Function {
    let arr = pool.array(TypeId::I8, 200);
    let mut b = FunctionBuilder::new(pool, "table", &[TypeId::I8], TypeId::I8);
    let i = b.param(0);
    let t = b.alloca_one(arr);
    let slot = b.inbounds_gep(t, &[Operand::i64(0), Operand::Value(i)], TypeId::I8);
    b.store(Operand::int(TypeId::I8, 5), slot);
    let v = b.load(TypeId::I8, slot);
    b.ret(Some(Operand::Value(v)));
    b.finish()
}

fn i8_arg(value: i8) -> RuntimeValue {
    RuntimeValue::int(8, i64::from(value))
}

#[test]
fn runtime_count_wider_than_index_is_not_truncated() {
    let guarded = instrumented(single(byte_vla));
    let len = |v: i64| RuntimeValue::int(64, v);
    // 300 truncated to i8 would be 44.
    assert_eq!(
        eval(&guarded, "bytes", &[len(300), i8_arg(50)]),
        Ok(Outcome::Returned(Some(i8_arg(5))))
    );
    assert_eq!(
        eval(&guarded, "bytes", &[len(300), i8_arg(-1)]),
        Ok(trapped_in("bytes", 2))
    );
    assert_eq!(
        eval(&guarded, "bytes", &[len(40), i8_arg(50)]),
        Ok(trapped_in("bytes", 2))
    );

    let plain = single(byte_vla);
    assert!(matches!(
        eval(&plain, "bytes", &[len(40), i8_arg(50)]),
        Err(EvalError::OutOfBounds { .. })
    ));
}

#[test]
fn static_length_wider_than_index_is_not_wrapped() {
    let guarded = instrumented(single(byte_table));
    // 200 as an i8 would be -56.
    for i in [0, 50, 127] {
        assert_eq!(
            eval(&guarded, "table", &[i8_arg(i)]),
            Ok(Outcome::Returned(Some(i8_arg(5))))
        );
    }
    assert_eq!(eval(&guarded, "table", &[i8_arg(-1)]), Ok(trapped_in("table", 2)));

    let plain = single(byte_table);
    assert!(matches!(
        eval(&plain, "table", &[i8_arg(-1)]),
        Err(EvalError::OutOfBounds { .. })
    ));
}

proptest! {
    #[test]
    fn array_index_traps_exactly_when_out_of_range(n in -64i32..64) {
        let guarded = instrumented(single(do_stuff));
        let outcome = eval(&guarded, "doStuff", &[i32_arg(n)]);
        if (0..10).contains(&n) {
            prop_assert_eq!(outcome, Ok(Outcome::Returned(Some(i32_arg(3)))));
        } else {
            prop_assert_eq!(outcome, Ok(trapped_in("doStuff", 2)));
        }
    }
}
