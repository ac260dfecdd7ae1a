//! Function-pointer tables: stable indices, reserved slots, aliasing.

use asmjs_backend::core::CodegenOptions;
use asmjs_backend::ir::{FunctionType, ModuleBuilder, Type, ValueId};
use asmjs_backend::js::emit_module;

fn define_identity(mb: &mut ModuleBuilder, name: &str) -> ValueId {
    let mut fb = mb.define_function(
        name,
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::Int(32)],
        },
    );
    fb.set_param_name(0, "x");
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    let x = fb.param(0);
    fb.ret(Some(x));
    fb.finish()
}

/// A caller that materializes function pointers by passing them to an
/// external sink.
fn build_module_taking_pointers(options_sink: &[&str]) -> asmjs_backend::ir::Module {
    let mut mb = ModuleBuilder::new("tables");
    let sink = mb.declare_function(
        "sink",
        FunctionType {
            ret: Type::Void,
            params: vec![Type::Int(32), Type::Int(32)],
        },
    );
    let targets: Vec<ValueId> = options_sink
        .iter()
        .map(|name| define_identity(&mut mb, name))
        .collect();
    let mut fb = mb.define_function(
        "main",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    // Pass each pointer twice so index stability shows up in the text.
    for &target in &targets {
        fb.call(sink, &[target, target], "");
    }
    fb.ret(None);
    fb.finish();
    mb.finish()
}

#[test]
fn test_index_stability_within_module() {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = build_module_taking_pointers(&["a"]);
    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    // Both references to _a resolve to the same index.
    assert!(text.contains("_sink(1|0,1|0)"), "stable index: {}", text);
    assert!(
        text.contains("var FUNCTION_TABLE_ii = [0,_a]"),
        "table entry: {}",
        text
    );
}

#[test]
fn test_distinct_functions_distinct_slots() {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = build_module_taking_pointers(&["a", "b", "c"]);
    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    // Table padded to a power of two with null sentinels.
    assert!(
        text.contains("var FUNCTION_TABLE_ii = [0,_a,_b,_c]"),
        "slots in placement order: {}",
        text
    );
    assert!(text.contains("_sink(1|0,1|0)"));
    assert!(text.contains("_sink(2|0,2|0)"));
    assert!(text.contains("_sink(3|0,3|0)"));
}

#[test]
fn test_reserved_slots_shift_indices() {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = build_module_taking_pointers(&["a"]);
    let options = CodegenOptions {
        reserved_function_pointers: 2,
        ..CodegenOptions::default()
    };
    let text = emit_module(&module, &options).unwrap();
    // 2*(reserved+1) null slots lead the table.
    assert!(text.contains("_sink(6|0,6|0)"), "shifted index: {}", text);
    assert!(
        text.contains("var FUNCTION_TABLE_ii = [0,0,0,0,0,0,_a,0]"),
        "reserved slots: {}",
        text
    );
}

#[test]
fn test_no_aliasing_gives_global_indices() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("tables");
    let sink = mb.declare_function(
        "sink",
        FunctionType {
            ret: Type::Void,
            params: vec![Type::Int(32), Type::Int(32)],
        },
    );
    let a = define_identity(&mut mb, "a");
    // b has a different signature, so it lands in another table.
    let mut fb = mb.define_function(
        "b",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.ret(None);
    let b = fb.finish();

    let mut fb = mb.define_function(
        "main",
        FunctionType {
            ret: Type::Void,
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    fb.position_at_end(entry);
    fb.call(sink, &[a, b], "");
    fb.ret(None);
    fb.finish();
    let module = mb.finish();

    let options = CodegenOptions {
        no_aliasing_function_pointers: true,
        ..CodegenOptions::default()
    };
    let text = emit_module(&module, &options).unwrap();
    // Indices are unique across tables: _a takes 1, _b takes 2.
    assert!(text.contains("_sink(1|0,2|0)"), "global indices: {}", text);
    assert!(
        text.contains("var FUNCTION_TABLE_v = [0,0,_b,0]"),
        "padded second table: {}",
        text
    );
}
