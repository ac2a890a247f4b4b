use pretty_assertions::assert_eq;

use crate::builder::FunctionBuilder;
use crate::ir::{Operand, Terminator};
use crate::test_helpers::{b, block, make_func};
use crate::types::{TypeId, TypePool};
use crate::verify::verify_function;

use super::*;

#[test]
fn successors_per_terminator() {
    assert!(successors(&Terminator::Return { value: None }).is_empty());
    assert!(successors(&Terminator::Trap).is_empty());
    assert!(successors(&Terminator::Unreachable).is_empty());
    assert_eq!(
        successors(&Terminator::Jump {
            target: b(3),
            args: vec![]
        })
        .as_slice(),
        &[b(3)]
    );
    assert_eq!(
        successors(&Terminator::Branch {
            cond: Operand::bool(true),
            then_block: b(1),
            else_block: b(2),
        })
        .as_slice(),
        &[b(1), b(2)]
    );
}

/// Diamond: B0 → {B1, B2} → B3. Both arms of a branch to the same block
/// record the predecessor once.
#[test]
fn predecessors_diamond() {
    let func = make_func(
        vec![],
        TypeId::VOID,
        vec![
            block(
                0,
                Terminator::Branch {
                    cond: Operand::bool(true),
                    then_block: b(1),
                    else_block: b(2),
                },
            ),
            block(
                1,
                Terminator::Jump {
                    target: b(3),
                    args: vec![],
                },
            ),
            block(
                2,
                Terminator::Branch {
                    cond: Operand::bool(false),
                    then_block: b(3),
                    else_block: b(3),
                },
            ),
            block(3, Terminator::Return { value: None }),
        ],
        vec![],
    );
    let preds = predecessors(&func);
    assert_eq!(preds[0], vec![]);
    assert_eq!(preds[1], vec![b(0)]);
    assert_eq!(preds[2], vec![b(0)]);
    assert_eq!(preds[3], vec![b(1), b(2)]);
}

#[test]
fn split_moves_tail_and_terminator() {
    let mut pool = TypePool::new();
    let mut builder = FunctionBuilder::new(&mut pool, "f", &[TypeId::I64], TypeId::I64);
    let x = builder.param(0);
    let a = builder.binary(crate::ir::BinOp::Add, x, Operand::i64(1));
    let c = builder.binary(crate::ir::BinOp::Mul, a, Operand::i64(2));
    builder.ret(Some(Operand::Value(c)));
    let mut func = builder.finish();

    let cont = split_block_before(
        &mut func,
        InstrLocation {
            block: b(0),
            index: 1,
        },
    );

    assert_eq!(cont, b(1));
    let head = func.block(b(0));
    assert_eq!(head.body.len(), 1);
    assert_eq!(head.body[0].defined_value(), Some(a));
    assert_eq!(
        head.terminator,
        Terminator::Jump {
            target: cont,
            args: vec![]
        }
    );
    let tail = func.block(cont);
    assert_eq!(tail.body.len(), 1);
    assert_eq!(tail.body[0].defined_value(), Some(c));
    assert_eq!(
        tail.terminator,
        Terminator::Return {
            value: Some(Operand::Value(c))
        }
    );
    assert_eq!(verify_function(&func), Ok(()));
}

/// Splitting a block that branches elsewhere moves the outgoing edges to
/// the continuation; the head's incoming edges stay where they were.
#[test]
fn split_preserves_edges() {
    let mut pool = TypePool::new();
    let mut builder = FunctionBuilder::new(&mut pool, "f", &[TypeId::I64], TypeId::VOID);
    let body_bb = builder.new_block();
    let exit = builder.new_block();
    builder.jump(body_bb, &[]);

    builder.position_at(body_bb);
    let x = builder.param(0);
    let cond = builder.icmp(crate::ir::IntPredicate::Eq, x, Operand::i64(0));
    builder.branch(cond, exit, body_bb);

    builder.position_at(exit);
    builder.ret(None);
    let mut func = builder.finish();

    let cont = split_block_before(
        &mut func,
        InstrLocation {
            block: body_bb,
            index: 0,
        },
    );
    let preds = predecessors(&func);
    assert_eq!(preds[body_bb.index()], vec![b(0), cont]);
    assert_eq!(preds[cont.index()], vec![body_bb]);
    assert_eq!(preds[exit.index()], vec![cont]);
    assert!(func.block(body_bb).body.is_empty());
    assert_eq!(verify_function(&func), Ok(()));
}

#[test]
fn trap_block_is_appended() {
    let mut func = make_func(
        vec![],
        TypeId::VOID,
        vec![block(0, Terminator::Return { value: None })],
        vec![],
    );
    let trap = push_trap_block(&mut func);
    assert_eq!(trap, b(1));
    assert_eq!(func.block(trap).terminator, Terminator::Trap);
    assert!(predecessors(&func)[1].is_empty());
}
