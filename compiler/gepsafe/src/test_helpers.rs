//! Shared fixtures for pass tests.
//!
//! Each fixture builds the IR a C compiler emits for a small function, at
//! `-O0` with typed pointers. Only compiled in test builds.

use gepsafe_ir::{CastOp, Function, FunctionBuilder, Module, Operand, TypeId, TypePool};

/// Types of the `example` and `lnode` structs:
///
/// ```c
/// typedef struct example { int f1; int *f2; char c1; char c2[2]; } example;
/// typedef struct lnode { int val; struct lnode *next; } lnode;
/// ```
pub(crate) struct StructTypes {
    pub example: TypeId,
    pub lnode: TypeId,
}

pub(crate) fn struct_types(pool: &mut TypePool) -> StructTypes {
    let i32_ptr = pool.pointer(TypeId::I32);
    let c2 = pool.array(TypeId::I8, 2);
    let example = pool.literal_struct(&[TypeId::I32, i32_ptr, TypeId::I8, c2]);
    let lnode = pool.named_struct("lnode");
    let lnode_ptr = pool.pointer(lnode);
    pool.set_struct_body(lnode, &[TypeId::I32, lnode_ptr]);
    StructTypes { example, lnode }
}

/// ```c
/// int doStuff(int n) { int temp[10]; temp[n] = 3; return temp[n]; }
/// ```
pub(crate) fn do_stuff(pool: &mut TypePool) -> Function {
    let arr = pool.array(TypeId::I32, 10);
    let mut b = FunctionBuilder::new(pool, "doStuff", &[TypeId::I32], TypeId::I32);
    let n = b.param(0);
    let temp = b.alloca_one(arr);
    let idx = b.cast(CastOp::SExt, n, TypeId::I64);
    let slot = b.inbounds_gep(temp, &[Operand::i64(0), Operand::Value(idx)], TypeId::I32);
    b.store(Operand::i32(3), slot);
    let idx2 = b.cast(CastOp::SExt, n, TypeId::I64);
    let slot2 = b.inbounds_gep(temp, &[Operand::i64(0), Operand::Value(idx2)], TypeId::I32);
    let v = b.load(TypeId::I32, slot2);
    b.ret(Some(Operand::Value(v)));
    b.finish()
}

/// ```c
/// char doStruct(example n) { return n.c2[1] + n.c1; }
/// ```
///
/// `n` is passed by pointer (`byval`), so its size is unknown here.
pub(crate) fn do_struct(pool: &mut TypePool, types: &StructTypes) -> Function {
    let example_ptr = pool.pointer(types.example);
    let mut b = FunctionBuilder::new(pool, "doStruct", &[example_ptr], TypeId::I8);
    let n = b.param(0);
    let c2_1 = b.inbounds_gep(
        n,
        &[Operand::i32(0), Operand::i32(3), Operand::i64(1)],
        TypeId::I8,
    );
    let a = b.load(TypeId::I8, c2_1);
    let c1 = b.inbounds_gep(n, &[Operand::i32(0), Operand::i32(2)], TypeId::I8);
    let c = b.load(TypeId::I8, c1);
    let sum = b.binary(gepsafe_ir::BinOp::Add, a, c);
    b.ret(Some(Operand::Value(sum)));
    b.finish()
}

/// ```c
/// void doList(lnode l, int v) { l.next->val = v; }
/// ```
pub(crate) fn do_list(pool: &mut TypePool, types: &StructTypes) -> Function {
    let lnode_ptr = pool.pointer(types.lnode);
    let mut b = FunctionBuilder::new(pool, "doList", &[lnode_ptr, TypeId::I32], TypeId::VOID);
    let l = b.param(0);
    let v = b.param(1);
    let next_slot = b.inbounds_gep(l, &[Operand::i32(0), Operand::i32(1)], lnode_ptr);
    let next = b.load(lnode_ptr, next_slot);
    let val = b.inbounds_gep(next, &[Operand::i32(0), Operand::i32(0)], TypeId::I32);
    b.store(v, val);
    b.ret(None);
    b.finish()
}

/// ```c
/// int main() {
///   example n; n.f1 = 3; n.f2 = &(n.f1); n.c1 = 'a'; n.c2[0] = 'b'; n.c2[1] = 'c';
///   char x = doStruct(n); x = 11;
///   int y = doStuff(x);
///   exit(0);
/// }
/// ```
pub(crate) fn main_fn(pool: &mut TypePool, types: &StructTypes) -> Function {
    let i32_ptr = pool.pointer(TypeId::I32);
    let mut b = FunctionBuilder::new(pool, "main", &[], TypeId::I32);
    let n = b.alloca_one(types.example);
    let x = b.alloca_one(TypeId::I8);
    let f1 = b.inbounds_gep(n, &[Operand::i32(0), Operand::i32(0)], TypeId::I32);
    b.store(Operand::i32(3), f1);
    let f2 = b.inbounds_gep(n, &[Operand::i32(0), Operand::i32(1)], i32_ptr);
    b.store(f1, f2);
    let c1 = b.inbounds_gep(n, &[Operand::i32(0), Operand::i32(2)], TypeId::I8);
    b.store(Operand::int(TypeId::I8, i64::from(b'a')), c1);
    let c2_0 = b.inbounds_gep(
        n,
        &[Operand::i32(0), Operand::i32(3), Operand::i64(0)],
        TypeId::I8,
    );
    b.store(Operand::int(TypeId::I8, i64::from(b'b')), c2_0);
    let c2_1 = b.inbounds_gep(
        n,
        &[Operand::i32(0), Operand::i32(3), Operand::i64(1)],
        TypeId::I8,
    );
    b.store(Operand::int(TypeId::I8, i64::from(b'c')), c2_1);
    let ch = b
        .call("doStruct", &[Operand::Value(n)], TypeId::I8)
        .unwrap_or_else(|| panic!("doStruct returns char"));
    b.store(ch, x);
    b.store(Operand::int(TypeId::I8, 11), x);
    let x_val = b.load(TypeId::I8, x);
    let arg = b.cast(CastOp::SExt, x_val, TypeId::I32);
    b.call("doStuff", &[Operand::Value(arg)], TypeId::I32);
    b.call("exit", &[Operand::i32(0)], TypeId::VOID);
    b.unreachable();
    b.finish()
}

/// The whole `getelem.c` translation unit.
pub(crate) fn getelem_module() -> Module {
    let mut module = Module::new();
    let pool = &mut module.types;
    let types = struct_types(pool);
    module.functions = vec![
        do_stuff(pool),
        do_list(pool, &types),
        do_struct(pool, &types),
        main_fn(pool, &types),
    ];
    module
}

/// ```c
/// int heap(long i) { int *p = (int *)malloc(bytes); p[i] = 7; return p[i]; }
/// ```
pub(crate) fn heap_ints(pool: &mut TypePool, bytes: i64) -> Function {
    let i8_ptr = pool.pointer(TypeId::I8);
    let i32_ptr = pool.pointer(TypeId::I32);
    let mut b = FunctionBuilder::new(pool, "heap", &[TypeId::I64], TypeId::I32);
    let i = b.param(0);
    let raw = b
        .call("malloc", &[Operand::i64(bytes)], i8_ptr)
        .unwrap_or_else(|| panic!("malloc returns a pointer"));
    let p = b.cast(CastOp::BitCast, raw, i32_ptr);
    let slot = b.inbounds_gep(p, &[Operand::Value(i)], TypeId::I32);
    b.store(Operand::i32(7), slot);
    let v = b.load(TypeId::I32, slot);
    b.ret(Some(Operand::Value(v)));
    b.finish()
}

/// ```c
/// int vla(int len, int i) { int a[len]; a[i] = i; return a[i]; }
/// ```
pub(crate) fn vla(pool: &mut TypePool) -> Function {
    let mut b = FunctionBuilder::new(pool, "vla", &[TypeId::I32, TypeId::I32], TypeId::I32);
    let len = b.param(0);
    let i = b.param(1);
    let a = b.alloca(TypeId::I32, Operand::Value(len));
    let slot = b.inbounds_gep(a, &[Operand::Value(i)], TypeId::I32);
    b.store(i, slot);
    let v = b.load(TypeId::I32, slot);
    b.ret(Some(Operand::Value(v)));
    b.finish()
}

/// Wrap a single function built against a fresh pool into a module.
pub(crate) fn single(build: impl FnOnce(&mut TypePool) -> Function) -> Module {
    let mut module = Module::new();
    let func = build(&mut module.types);
    module.functions.push(func);
    module
}
