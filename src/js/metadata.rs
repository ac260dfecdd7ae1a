//! Metadata accumulator and trailer emission.
//!
//! The downstream driver consumes a JSON-like object appended after the
//! memory initializer. Key order is fixed: declares, redirects, externs,
//! implementedFunctions, tables, initializers, exports, cantValidate,
//! simd, namedGlobals.

use super::mangle::sanitize_global;
use super::Codegen;
use crate::core::{CompileResult, OutputBuffer};
use std::collections::{BTreeMap, BTreeSet};

/// Sets and maps populated during emission, flushed by the module emitter.
#[derive(Debug, Default)]
pub struct Metadata {
    /// External variables referenced (mangled names).
    pub externals: BTreeSet<String>,
    /// Extra function declares added by call handlers (unmangled names).
    pub declares: BTreeSet<String>,
    /// Library redirects actually used: unmangled name -> replacement.
    pub redirects: BTreeMap<String, String>,
    /// Additional exports (mangled names), in discovery order.
    pub exports: Vec<String>,
    /// Static constructors (mangled names), in ctor order.
    pub initializers: Vec<String>,
    /// Globals exported by name: unmangled name -> absolute address.
    pub named_globals: BTreeMap<String, u32>,
    /// Reason the output cannot validate, when one exists.
    pub cant_validate: String,
    pub uses_simd: bool,
}

/// Intrinsics that are always no-ops or expanded into other code, so their
/// prototypes never appear in `declares`.
fn is_always_expanded_intrinsic(name: &str) -> bool {
    name.starts_with("llvm.dbg.")
        || name.starts_with("llvm.lifetime.")
        || name.starts_with("llvm.invariant.")
        || name.starts_with("llvm.prefetch")
        || name.starts_with("llvm.memcpy.")
        || name.starts_with("llvm.memset.")
        || name.starts_with("llvm.memmove.")
        || name.starts_with("llvm.expect.")
        || name == "llvm.flt.rounds"
}

impl<'m, 'a> Codegen<'m, 'a> {
    pub(crate) fn write_metadata(&mut self, out: &mut OutputBuffer) -> CompileResult<()> {
        out.push_str("\n\n// EMSCRIPTEN_METADATA\n");
        out.push_str("{\n");

        out.push_str("\"declares\": [");
        let mut first = true;
        for &func in &self.module.functions {
            let data = self.module.as_function(func).unwrap();
            if !data.is_declaration() || !self.module_used.contains(&func) {
                continue;
            }
            let name = self.module.value(func).name.clone().unwrap_or_default();
            if is_always_expanded_intrinsic(&name) {
                continue;
            }
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"{}\"", name));
        }
        for name in &self.meta.declares {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"{}\"", name));
        }
        out.push_str("],");

        out.push_str("\"redirects\": {");
        let mut first = true;
        for (from, to) in &self.meta.redirects {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"_{}\": \"{}\"", from, to));
        }
        out.push_str("},");

        out.push_str("\"externs\": [");
        let mut first = true;
        for name in &self.meta.externals {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"{}\"", name));
        }
        out.push_str("],");

        out.push_str("\"implementedFunctions\": [");
        let mut first = true;
        for &func in &self.module.functions {
            if self.module.as_function(func).unwrap().is_declaration() {
                continue;
            }
            if !first {
                out.push_str(", ");
            }
            first = false;
            let name = self.module.value(func).name.clone().unwrap_or_default();
            out.push_str(&format!("\"{}\"", sanitize_global(&name)));
        }
        out.push_str("],");

        out.push_str("\"tables\": {");
        let tables = self.tables.padded_tables();
        let mut remaining = tables.len();
        for (sig, entries) in &tables {
            out.push_str(&format!("  \"{}\": \"var FUNCTION_TABLE_{} = [", sig, sig));
            out.push_str(&entries.join(","));
            out.push_str("];\"");
            remaining -= 1;
            if remaining > 0 {
                out.push_str(",");
            }
            out.push_str("\n");
        }
        out.push_str("},");

        out.push_str("\"initializers\": [");
        let mut first = true;
        for name in &self.meta.initializers {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"{}\"", name));
        }
        out.push_str("],");

        out.push_str("\"exports\": [");
        let mut first = true;
        for name in &self.meta.exports {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"{}\"", name));
        }
        out.push_str("],");

        out.push_str(&format!("\"cantValidate\": \"{}\",", self.meta.cant_validate));

        out.push_str(&format!(
            "\"simd\": {},",
            if self.meta.uses_simd { "1" } else { "0" }
        ));

        out.push_str("\"namedGlobals\": {");
        let mut first = true;
        for (name, addr) in &self.meta.named_globals {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(&format!("\"_{}\": \"{}\"", name, addr));
        }
        out.push_str("}");

        out.push_str("\n}\n");
        Ok(())
    }
}
