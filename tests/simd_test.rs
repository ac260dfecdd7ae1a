//! Short-vector lowering to the SIMD builtin families.

use asmjs_backend::core::CodegenOptions;
use asmjs_backend::ir::{BinOp, FunctionType, IntPredicate, ModuleBuilder, Type};
use asmjs_backend::js::emit_module;

fn i32x4() -> Type {
    Type::vector(Type::Int(32), 4)
}

fn f32x4() -> Type {
    Type::vector(Type::Float, 4)
}

#[test]
fn test_vector_add_and_checks() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: i32x4(),
            params: vec![i32x4(), i32x4()],
        },
    );
    fb.set_param_name(0, "a");
    fb.set_param_name(1, "b");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let a = fb.param(0);
    let b = fb.param(1);
    let r = fb.binary(BinOp::Add, a, b, "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains(" $a = SIMD_int32x4_check($a);"), "arg check: {}", text);
    assert!(text.contains("$r = SIMD_int32x4_add($a,$b);"), "{}", text);
    assert!(
        text.contains("return (SIMD_int32x4_check($r));"),
        "return check: {}",
        text
    );
    assert!(text.contains("\"simd\": 1"), "simd flag: {}", text);
    assert!(
        text.contains("$r = SIMD_int32x4(0,0,0,0)"),
        "vector local initializer: {}",
        text
    );
}

#[test]
fn test_splat_idiom_recognized() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: f32x4(),
            params: vec![Type::Float],
        },
    );
    fb.set_param_name(0, "x");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let x = fb.param(0);
    let undef = fb.const_undef(f32x4());
    let zero = fb.const_i32(0);
    let seeded = fb.insert_element(undef, x, zero, "seeded");
    let undef2 = fb.const_undef(f32x4());
    let splat = fb.shuffle_vector(seeded, undef2, &[0, 0, 0, 0], "splat");
    fb.ret(Some(splat));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("$splat = SIMD_float32x4_splat(Math_fround($x));"),
        "splat recognized: {}",
        text
    );
    assert!(!text.contains("_with"), "no lane writes: {}", text);
}

#[test]
fn test_insert_chain_becomes_constructor() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: i32x4(),
            params: vec![Type::Int(32), Type::Int(32), Type::Int(32), Type::Int(32)],
        },
    );
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        fb.set_param_name(i, name);
    }
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let undef = fb.const_undef(i32x4());
    let mut vec = undef;
    for i in 0..4 {
        let lane = fb.const_i32(i);
        let value = fb.param(i as usize);
        vec = fb.insert_element(vec, value, lane, &format!("v{}", i));
    }
    fb.ret(Some(vec));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("SIMD_int32x4($a, $b, $c, $d)"),
        "constructor from a full chain: {}",
        text
    );
}

#[test]
fn test_extract_element_coerces_lane() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![i32x4()],
        },
    );
    fb.set_param_name(0, "v");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let v = fb.param(0);
    let two = fb.const_i32(2);
    let e = fb.extract_element(v, two, "e");
    fb.ret(Some(e));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("$e = $v.z|0;"), "lane access: {}", text);
}

#[test]
fn test_inverted_vector_compare_wraps_not() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: i32x4(),
            params: vec![i32x4(), i32x4()],
        },
    );
    fb.set_param_name(0, "a");
    fb.set_param_name(1, "b");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let a = fb.param(0);
    let b = fb.param(1);
    let r = fb.icmp(IntPredicate::Ne, a, b, "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("$r = SIMD_int32x4_not(SIMD_int32x4_equal($a, $b));"),
        "inverted compare: {}",
        text
    );
}

#[test]
fn test_unrolled_unsigned_division() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: i32x4(),
            params: vec![i32x4(), i32x4()],
        },
    );
    fb.set_param_name(0, "a");
    fb.set_param_name(1, "b");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let a = fb.param(0);
    let b = fb.param(1);
    let r = fb.binary(BinOp::UDiv, a, b, "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("($a.x>>>0) / ($b.x>>>0)>>>0"),
        "lane-wise division: {}",
        text
    );
    assert!(text.contains("($a.w>>>0)"), "all four lanes: {}", text);
}

#[test]
fn test_constant_vector_splat() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("simd");
    let ones: Vec<_> = (0..4).map(|_| mb.const_i32(1)).collect();
    let splat = mb.const_vector(ones);
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: i32x4(),
            params: vec![i32x4()],
        },
    );
    fb.set_param_name(0, "a");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let a = fb.param(0);
    let r = fb.binary(BinOp::Add, a, splat, "r");
    fb.ret(Some(r));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("SIMD_int32x4_add($a,SIMD_int32x4_splat(1))"),
        "constant splat operand: {}",
        text
    );
}
