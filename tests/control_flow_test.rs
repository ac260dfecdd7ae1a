//! Structured rendering of conditional branches and loops, plus fatal
//! error paths.

use asmjs_backend::core::{CodegenOptions, CompileError};
use asmjs_backend::ir::{
    BinOp, FunctionType, IntPredicate, ModuleBuilder, RmwOp, Type,
};
use asmjs_backend::js::emit_module;

#[test]
fn test_conditional_branch_renders_as_if() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("cf");
    let mut fb = mb.define_function(
        "max0",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::Int(32)],
        },
    );
    fb.set_param_name(0, "x");
    let entry = fb.append_block("entry");
    let pos = fb.append_block("pos");
    let neg = fb.append_block("neg");
    fb.position_at_end(entry);
    let x = fb.param(0);
    let zero = fb.const_i32(0);
    let c = fb.icmp(IntPredicate::Sgt, x, zero, "c");
    fb.cond_br(c, pos, neg);
    fb.position_at_end(pos);
    fb.ret(Some(x));
    fb.position_at_end(neg);
    let zero = fb.const_i32(0);
    fb.ret(Some(zero));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("while (1) switch (label | 0) {"),
        "dispatch loop: {}",
        text
    );
    assert!(
        text.contains("if ($c) { label = 1; break; }"),
        "true edge: {}",
        text
    );
    assert!(text.contains("label = 2; break;"), "false edge: {}", text);
}

#[test]
fn test_loop_with_phi_counter() {
    let _ = env_logger::builder().is_test(true).try_init();
    // for (i = 0; i != n; i++) ;  return i;
    let mut mb = ModuleBuilder::new("cf");
    let mut fb = mb.define_function(
        "count",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::Int(32)],
        },
    );
    fb.set_param_name(0, "n");
    let entry = fb.append_block("entry");
    let header = fb.append_block("header");
    let body = fb.append_block("body");
    let exit = fb.append_block("exit");

    fb.position_at_end(header);
    let i = fb.phi(Type::Int(32), "i");
    let n = fb.param(0);
    let done = fb.icmp(IntPredicate::Eq, i, n, "done");
    fb.cond_br(done, exit, body);

    fb.position_at_end(entry);
    let zero = fb.const_i32(0);
    fb.add_incoming(i, zero, entry);
    fb.br(header);

    fb.position_at_end(body);
    let one = fb.const_i32(1);
    let next = fb.binary(BinOp::Add, i, one, "next");
    fb.add_incoming(i, next, body);
    fb.br(header);

    fb.position_at_end(exit);
    fb.ret(Some(i));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("$i = 0;label ="), "entry edge seeds the phi: {}", text);
    assert!(
        text.contains("$i = $next;label ="),
        "back edge carries the increment: {}",
        text
    );
    assert!(text.contains("$next = (($i) + 1)|0;"), "{}", text);
    assert!(text.contains("return ($i|0);"), "{}", text);
}

#[test]
fn test_unreachable_emits_comment_only() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("cf");
    let abort = mb.declare_function(
        "abort",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.call(abort, &[], "");
    fb.unreachable();
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("// unreachable"), "{}", text);
}

#[test]
fn test_atomic_rmw_lowers_to_load_store() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("atomics");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::ptr(Type::Int(32)), Type::Int(32)],
        },
    );
    fb.set_param_name(0, "p");
    fb.set_param_name(1, "v");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let p = fb.param(0);
    let v = fb.param(1);
    let old = fb.atomic_rmw(RmwOp::Add, p, v, "old");
    fb.ret(Some(old));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("$old = HEAP32[$p>>2]|0;HEAP32[$p>>2] = (($old+$v)|0);"),
        "single-threaded rmw: {}",
        text
    );
}

#[test]
fn test_fence_is_dropped() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("atomics");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.fence();
    fb.ret(None);
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("/* fence */;"), "comment only: {}", text);
}

#[test]
fn test_wide_integer_is_fatal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("fatal");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(64),
            params: vec![Type::Int(64), Type::Int(64)],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let a = fb.param(0);
    let b = fb.param(1);
    let r = fb.binary(BinOp::Add, a, b, "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let err = emit_module(&module, &CodegenOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::UnlegalizedInteger { width: 64 }));
}

#[test]
fn test_unsupported_atomic_op_is_fatal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("fatal");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::ptr(Type::Int(32)), Type::Int(32)],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let p = fb.param(0);
    let v = fb.param(1);
    let old = fb.atomic_rmw(RmwOp::Max, p, v, "old");
    fb.ret(Some(old));
    fb.finish();
    let module = mb.finish();

    let err = emit_module(&module, &CodegenOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::InvalidAtomicOp { op: "max" }));
}
