//! Switch lowering: structured switch vs chained equality tests.
//!
//! The structured form is only worth it when the case set is dense enough:
//! at least 5 cases, range at most 10240, range per case at most 1024.

use asmjs_backend::core::CodegenOptions;
use asmjs_backend::ir::{BlockId, FunctionType, ModuleBuilder, Type};
use asmjs_backend::js::emit_module;

fn build_switch(values: &[i64]) -> asmjs_backend::ir::Module {
    let mut mb = ModuleBuilder::new("switch");
    let mut fb = mb.define_function(
        "pick",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::Int(32)],
        },
    );
    fb.set_param_name(0, "p");
    let entry = fb.append_block("entry");
    let default = fb.append_block("default");
    let mut cases: Vec<(i64, BlockId)> = Vec::new();
    let mut rets = Vec::new();
    for (i, &value) in values.iter().enumerate() {
        let block = fb.append_block(&format!("case.{}", value));
        cases.push((value, block));
        rets.push((block, i as i32 * 10));
    }
    fb.position_at_end(entry);
    let p = fb.param(0);
    fb.switch(p, default, &cases);
    for (block, ret) in rets {
        fb.position_at_end(block);
        let c = fb.const_i32(ret);
        fb.ret(Some(c));
    }
    fb.position_at_end(default);
    let neg = fb.const_i32(-1);
    fb.ret(Some(neg));
    fb.finish();
    mb.finish()
}

#[test]
fn test_dense_switch_uses_structured_switch() {
    let _ = env_logger::builder().is_test(true).try_init();
    // 5 cases, range 100, range/cases 20: dense enough.
    let module = build_switch(&[0, 1, 2, 3, 100]);
    let text = emit_module(&module, &CodegenOptions::default()).unwrap();

    assert!(text.contains("label = $p|0;"), "condition into label: {}", text);
    assert!(text.contains("case 100: {"), "case labels spliced: {}", text);
    assert!(!text.contains("== 100"), "no chained equalities: {}", text);
}

#[test]
fn test_sparse_switch_falls_back_to_comparisons() {
    let _ = env_logger::builder().is_test(true).try_init();
    // Only 4 cases: below the structured threshold.
    let module = build_switch(&[0, 1, 2, 3]);
    let text = emit_module(&module, &CodegenOptions::default()).unwrap();

    assert!(text.contains("(($p|0) == 3)"), "chained equality: {}", text);
    assert!(!text.contains("case 3: { label ="), "no case labels: {}", text);
}

#[test]
fn test_wide_ratio_falls_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    // 5 cases but range/cases = 2048 > 1024.
    let module = build_switch(&[0, 5000, 10000, 10200, 10240]);
    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("== 10240"), "chained: {}", text);
    assert!(!text.contains("case 10240:"), "not structured: {}", text);
}

#[test]
fn test_shared_target_disjunction() {
    let _ = env_logger::builder().is_test(true).try_init();
    // Two sparse cases share a destination; their conditions merge into
    // one edge, newest first.
    let mut mb = ModuleBuilder::new("switch");
    let mut fb = mb.define_function(
        "pick",
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::Int(32)],
        },
    );
    fb.set_param_name(0, "p");
    let entry = fb.append_block("entry");
    let both = fb.append_block("both");
    let default = fb.append_block("default");
    fb.position_at_end(entry);
    let p = fb.param(0);
    fb.switch(p, default, &[(4, both), (9, both)]);
    fb.position_at_end(both);
    let one = fb.const_i32(1);
    fb.ret(Some(one));
    fb.position_at_end(default);
    let zero = fb.const_i32(0);
    fb.ret(Some(zero));
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("(($p|0) == 9) | (($p|0) == 4)"),
        "merged disjunction: {}",
        text
    );
}
