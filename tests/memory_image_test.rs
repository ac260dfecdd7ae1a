//! Global memory image layout and relocations.

use asmjs_backend::core::CodegenOptions;
use asmjs_backend::ir::{FunctionType, ModuleBuilder, Type};
use asmjs_backend::js::emit_module;

/// Pull the byte list out of the memory-initializer call.
fn memory_bytes(text: &str) -> Vec<u8> {
    let start = text.find("allocate([").expect("memory initializer") + "allocate([".len();
    let end = text[start..].find(']').unwrap() + start;
    let list = &text[start..end];
    if list.is_empty() {
        return vec![];
    }
    list.split(',').map(|b| b.parse().unwrap()).collect()
}

#[test]
fn test_constant_pool_layout() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("pool");
    let one = mb.const_double(1.0);
    mb.add_global("g2", Type::Double, Some(one));
    let word = mb.const_i32(0x11223344);
    mb.add_global("g1", Type::Int(32), Some(word));
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    let bytes = memory_bytes(&text);

    // g2 sits at absolute 8: little-endian double 1.0 leads the image.
    assert_eq!(&bytes[0..8], &[0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
    // g1 follows at absolute 16, stored as 64 bits with the high half zero.
    assert_eq!(&bytes[8..12], &[0x44, 0x33, 0x22, 0x11]);
    assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
}

#[test]
fn test_global_loads_fold_to_constant_indices() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("pool");
    let one = mb.const_double(1.0);
    let g2 = mb.add_global("g2", Type::Double, Some(one));
    let word = mb.const_i32(0x11223344);
    let g1 = mb.add_global("g1", Type::Int(32), Some(word));

    let mut fb = mb.define_function(
        "read",
        FunctionType {
            ret: Type::Double,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let d = fb.load(g2, 8, "d");
    let i = fb.load(g1, 4, "i");
    let _ = i;
    fb.ret(Some(d));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    // absolute(g2) = 8 -> HEAPF64 index 1; absolute(g1) = 16 -> HEAP32 index 4
    assert!(text.contains("HEAPF64[1]"), "folded double load: {}", text);
    assert!(text.contains("HEAP32[4]"), "folded int load: {}", text);
}

#[test]
fn test_address_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("pool");
    let pi = mb.const_double(3.5);
    mb.add_global("pi", Type::Double, Some(pi));
    let word = mb.const_i32(-2);
    mb.add_global("w", Type::Int(32), Some(word));
    let module = mb.finish();

    let options = CodegenOptions::default();
    let text = emit_module(&module, &options).unwrap();
    let bytes = memory_bytes(&text);
    // Reading back from the image at (absolute - global_base) recovers the
    // initializers in little-endian order.
    let d = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
    assert_eq!(d, 3.5);
    let w = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(w, -2);
}

#[test]
fn test_external_initializer_becomes_post_set() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("postset");
    let ext = mb.add_global("ext", Type::Int(32), None);
    let reloc = mb.const_ptrtoint(ext);
    mb.add_global("slot", Type::Int(32), Some(reloc));
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    // slot sits at absolute 8; the external symbol cannot resolve at emit
    // time, so zeros stay in the image and runPostSets patches them.
    assert!(text.contains("HEAP32[2] = _ext;"), "post-set: {}", text);
    assert!(text.contains("\"externs\": [\"_ext\"]"), "externs: {}", text);
    let bytes = memory_bytes(&text);
    assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
}

#[test]
fn test_llvm_used_streams_exports_and_named_globals() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("used");
    let mut fb = mb.define_function(
        "keep",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.ret(None);
    let keep = fb.finish();

    let word = mb.const_i32(7);
    let g = mb.add_global("g", Type::Int(32), Some(word));
    let used = mb.const_array(Type::ptr(Type::Int(8)), vec![keep, g]);
    mb.add_global("llvm.used", Type::array(Type::ptr(Type::Int(8)), 2), Some(used));
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("\"exports\": [\"_keep\"]"), "kept function: {}", text);
    assert!(
        text.contains("\"namedGlobals\": {\"_g\": \"8\"}"),
        "kept global by address: {}",
        text
    );
}

#[test]
fn test_init_array_streams_constructors() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("ctors");
    let mut fb = mb.define_function(
        "ctor",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.ret(None);
    let ctor = fb.finish();

    let list = mb.const_struct(vec![ctor], true);
    mb.add_global(
        "__init_array_start",
        Type::Struct {
            fields: vec![Type::func(Type::Void, vec![])],
            packed: true,
        },
        Some(list),
    );
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("\"initializers\": [\"_ctor\"]"),
        "ctor order: {}",
        text
    );
    // The initializer list itself takes no image bytes.
    assert!(text.contains("allocate([], \"i8\""), "empty image: {}", text);
}

#[test]
fn test_function_pointer_relocation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("reloc");
    let mut fb = mb.define_function(
        "target",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.ret(None);
    let target = fb.finish();

    let reloc = mb.const_ptrtoint(target);
    let init = mb.const_struct(vec![reloc], true);
    mb.add_global("vtable", Type::Struct { fields: vec![Type::Int(32)], packed: true }, Some(init));
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    // _target lands at index 1 of the `v` table and that index is written
    // into the image.
    assert!(
        text.contains("var FUNCTION_TABLE_v = [0,_target]"),
        "table: {}",
        text
    );
    let bytes = memory_bytes(&text);
    assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
}
