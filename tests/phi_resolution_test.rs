//! φ carry assignments on CFG edges: ordering and cycle breaking.

use asmjs_backend::core::CodegenOptions;
use asmjs_backend::ir::{FunctionType, ModuleBuilder, Type};
use asmjs_backend::js::emit_module;

#[test]
fn test_simple_phi_assignment_on_edge() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mb = ModuleBuilder::new("phi");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    let merge = fb.append_block("merge");
    fb.position_at_end(merge);
    let x = fb.phi(Type::Int(32), "x");
    fb.ret(Some(x));
    fb.position_at_end(entry);
    let five = fb.const_i32(5);
    fb.add_incoming(x, five, entry);
    fb.br(merge);
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(text.contains("$x = 5;"), "edge carries the phi: {}", text);
    assert!(text.contains("return ($x|0);"), "phi result flows out: {}", text);
}

#[test]
fn test_phi_swap_cycle_is_broken_with_temporaries() {
    let _ = env_logger::builder().is_test(true).try_init();
    // B's φs swap each other: x <- y, y <- x on the same edge.
    let mut mb = ModuleBuilder::new("phi");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    let b = fb.append_block("b");
    fb.position_at_end(b);
    let x = fb.phi(Type::Int(32), "x");
    let y = fb.phi(Type::Int(32), "y");
    fb.add_incoming(x, y, entry);
    fb.add_incoming(y, x, entry);
    fb.ret(Some(x));
    fb.position_at_end(entry);
    fb.br(b);
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    // Every incoming value is captured before any φ is overwritten, so the
    // swap semantics survive.
    assert!(
        text.contains("$y$phi = $x;$x$phi = $y;$y = $y$phi;$x = $x$phi;"),
        "cycle-broken sequence: {}",
        text
    );
    // The temporaries become declared locals.
    assert!(text.contains("$x$phi = 0"), "temp declared: {}", text);
}

#[test]
fn test_dependent_phi_reads_old_value() {
    let _ = env_logger::builder().is_test(true).try_init();
    // a <- b (old), b <- 1: a must capture b before b is overwritten.
    let mut mb = ModuleBuilder::new("phi");
    let mut fb = mb.define_function(
        "f",
        FunctionType {
            ret: Type::Int(32),
            params: vec![],
        },
    );
    let entry = fb.append_block("entry");
    let b_block = fb.append_block("loop");
    fb.position_at_end(b_block);
    let a = fb.phi(Type::Int(32), "a");
    let b = fb.phi(Type::Int(32), "b");
    fb.add_incoming(a, b, entry);
    let one = fb.const_i32(1);
    fb.add_incoming(b, one, entry);
    fb.ret(Some(a));
    fb.position_at_end(entry);
    fb.br(b_block);
    fb.finish();
    let module = mb.finish();

    let text = emit_module(&module, &CodegenOptions::default()).unwrap();
    assert!(
        text.contains("$a$phi = $b;$b = 1;$a = $a$phi;"),
        "old value captured first: {}",
        text
    );
}
