//! Call handler registry: intrinsics, FFI calls, redirects, indirect calls.

use asmjs_backend::core::CodegenOptions;
use asmjs_backend::ir::{FunctionType, ModuleBuilder, Type};
use asmjs_backend::js::emit_module;

#[test]
fn test_memcpy_intrinsic_lowers_to_runtime_call() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("intrinsics");
    let i8p = Type::ptr(Type::Int(8));
    let memcpy = mb.declare_function(
        "llvm.memcpy.p0i8.p0i8.i32",
        FunctionType {
            ret: Type::Void,
            params: vec![i8p.clone(), i8p.clone(), Type::Int(32), Type::Int(32), Type::Int(1)],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Void,
            params: vec![i8p.clone(), i8p.clone(), Type::Int(32)],
        },
    );
    fb.set_param_name(0, "d");
    fb.set_param_name(1, "s");
    fb.set_param_name(2, "n");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let d = fb.param(0);
    let s = fb.param(1);
    let n = fb.param(2);
    let align = fb.const_i32(1);
    let not_volatile = fb.const_int(Type::Int(1), 0);
    fb.call(memcpy, &[d, s, n, align, not_volatile], "");
    fb.ret(None);
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("_memcpy($d|0,$s|0,$n|0)|0"),
        "runtime memcpy: {}",
        text
    );
    assert!(text.contains("\"memcpy\""), "declares entry: {}", text);
    assert!(
        !text.contains("\"llvm.memcpy.p0i8.p0i8.i32\""),
        "intrinsic itself not declared: {}",
        text
    );
}

#[test]
fn test_lifetime_markers_are_elided() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("intrinsics");
    let i8p = Type::ptr(Type::Int(8));
    let lifetime = mb.declare_function(
        "llvm.lifetime.start",
        FunctionType {
            ret: Type::Void,
            params: vec![Type::Int(32), i8p.clone()],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Void,
            params: vec![i8p],
        },
    );
    fb.set_param_name(0, "p");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let size = fb.const_i32(4);
    let p = fb.param(0);
    fb.call(lifetime, &[size, p], "");
    fb.ret(None);
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(!text.contains("lifetime"), "marker gone: {}", text);
}

#[test]
fn test_sqrt_intrinsic_uses_math_builtin() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("intrinsics");
    let sqrt = mb.declare_function(
        "llvm.sqrt.f64",
        FunctionType {
            ret: Type::Double,
            params: vec![Type::Double],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Double,
            params: vec![Type::Double],
        },
    );
    fb.set_param_name(0, "x");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let x = fb.param(0);
    let r = fb.call(sqrt, &[x], "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("Math_sqrt(+$x)"), "builtin call: {}", text);
}

#[test]
fn test_external_call_declares_and_coerces() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("ffi");
    let puts = mb.declare_function(
        "puts",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::ptr(Type::Int(8))],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::ptr(Type::Int(8))],
        },
    );
    fb.set_param_name(0, "s");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let s = fb.param(0);
    let r = fb.call(puts, &[s], "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("$r = _puts($s|0)|0;"), "coerced ffi call: {}", text);
    assert!(text.contains("\"declares\": [\"puts\"]"), "declares: {}", text);
}

#[test]
fn test_longjmp_redirect() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("sjlj");
    let longjmp = mb.declare_function(
        "longjmp",
        FunctionType {
            ret: Type::Void,
            params: vec![Type::ptr(Type::Int(8)), Type::Int(32)],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Void,
            params: vec![Type::ptr(Type::Int(8))],
        },
    );
    fb.set_param_name(0, "env");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let env = fb.param(0);
    let one = fb.const_i32(1);
    fb.call(longjmp, &[env, one], "");
    fb.unreachable();
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("_emscripten_longjmp($env|0,1)"),
        "lowered call: {}",
        text
    );
    assert!(
        text.contains("\"_longjmp\": \"_emscripten_longjmp\""),
        "redirect recorded: {}",
        text
    );
}

#[test]
fn test_invoke_state_machine() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("invoke");
    let pre = mb.declare_function(
        "emscripten_preinvoke",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let post = mb.declare_function(
        "emscripten_postinvoke",
        FunctionType {
            ret: Type::Int(32),
            params: vec![],
        },
    );
    let risky = mb.declare_function(
        "risky",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.call(pre, &[], "");
    fb.call(risky, &[], "");
    let threw = fb.call(post, &[], "threw");
    fb.ret(Some(threw));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("__THREW__ = 0;"), "preinvoke: {}", text);
    assert!(
        text.contains("$threw = __THREW__; __THREW__ = 0;"),
        "postinvoke: {}",
        text
    );
}

#[test]
fn test_indirect_call_goes_through_table_mask() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("indirect");
    let fn_ptr = Type::ptr(Type::func(Type::Int(32), vec![Type::Int(32)]));
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![fn_ptr],
        },
    );
    fb.set_param_name(0, "p");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let p = fb.param(0);
    let five = fb.const_i32(5);
    let r = fb.call(p, &[five], "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("$r = FUNCTION_TABLE_ii[$p & #FM_ii#](5)|0;"),
        "masked table call: {}",
        text
    );
    // The signature's table exists even though nothing was placed in it.
    assert!(text.contains("\"ii\": \"var FUNCTION_TABLE_ii = [0]"), "table: {}", text);
}
