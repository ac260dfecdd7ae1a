//! Module emission.
//!
//! Fixed output order: function definitions between sentinels, the
//! generated `runPostSets`, the memory-initializer call, the metadata
//! trailer. Global initializers are parsed twice: a calculate phase lays
//! out every byte, an emit phase resolves relocations now that every
//! address and function index is known.

use super::memory::MEM_ALIGN_BITS;
use super::Codegen;
use crate::core::{
    CodegenOptions, CodegenSession, CompileError, CompileResult, OutputBuffer,
};
use crate::ir::{Constant, ConstExpr, Module, Type, ValueId};
use bumpalo::Bump;
use std::collections::HashSet;

/// Lower a module to asm.js text.
pub fn emit_module(module: &Module, options: &CodegenOptions) -> CompileResult<String> {
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let mut cx = Codegen::new(module, options.clone(), &session);
    let text = cx.run()?;
    log::debug!("{}", session.stats());
    Ok(text)
}

impl<'m, 'a> Codegen<'m, 'a> {
    pub(crate) fn run(&mut self) -> CompileResult<String> {
        if self.module.target_triple != "asmjs-unknown-emscripten" {
            log::warn!(
                "incorrect target triple '{}' (did you run the full frontend pipeline?)",
                self.module.target_triple
            );
        }

        self.compute_module_used();
        self.process_constants()?;

        let mut out = OutputBuffer::with_capacity(64 * 1024);
        out.push_str("\n// EMSCRIPTEN_START_FUNCTIONS\n");
        let functions = self.module.functions.clone();
        for func in functions {
            if !self.module.as_function(func).unwrap().is_declaration() {
                self.emit_function(func, &mut out)?;
            }
        }
        out.push_str("function runPostSets() {\n");
        out.push_str(" ");
        for post_set in &self.post_sets {
            out.push_str(post_set);
        }
        out.push_str("\n}\n");
        out.push_str("// EMSCRIPTEN_END_FUNCTIONS\n\n");

        self.image.check_buckets()?;
        out.push_str("/* memory initializer */ allocate([");
        out.push_str(&self.image.comma_separated());
        out.push_str("], \"i8\", ALLOC_NONE, Runtime.GLOBAL_BASE);");

        self.write_metadata(&mut out)?;
        Ok(out.into_string())
    }

    /// Everything referenced anywhere in the module: instruction and
    /// terminator operands, global initializers, and the constants
    /// reachable from them.
    fn compute_module_used(&mut self) {
        let mut used = HashSet::new();
        let mut stack: Vec<ValueId> = Vec::new();
        for &func in &self.module.functions {
            let data = self.module.as_function(func).unwrap();
            for &block in &data.blocks {
                let block_data = self.module.block(block);
                for &inst in &block_data.insts {
                    if let Some(instruction) = self.module.as_instruction(inst) {
                        stack.extend(instruction.operands());
                    }
                }
                stack.extend(block_data.term.operands());
            }
        }
        for &global in &self.module.globals {
            if let Some(init) = self.module.as_global(global).and_then(|g| g.initializer) {
                stack.push(init);
            }
        }
        while let Some(value) = stack.pop() {
            if used.insert(value) {
                stack.extend(self.module.constant_operands(value));
            }
        }
        self.module_used = used;
    }

    fn process_constants(&mut self) -> CompileResult<()> {
        // First pass lays out every address, second pass emits the
        // relocation-bearing contents.
        let globals = self.module.globals.clone();
        for &global in &globals {
            if let Some(init) = self.module.as_global(global).and_then(|g| g.initializer) {
                let name = self.module.value(global).name.clone().unwrap_or_default();
                self.parse_constant(&name, init, true)?;
            }
        }
        for &global in &globals {
            if let Some(init) = self.module.as_global(global).and_then(|g| g.initializer) {
                let name = self.module.value(global).name.clone().unwrap_or_default();
                self.parse_constant(&name, init, false)?;
            }
        }
        Ok(())
    }

    fn parse_constant(&mut self, name: &str, value: ValueId, calculate: bool) -> CompileResult<()> {
        if self.module.as_global(value).is_some() || self.module.as_function(value).is_some() {
            return Ok(());
        }
        let ty = self.module.ty(value).clone();
        let constant = match self.module.as_constant(value) {
            Some(c) => c.clone(),
            None => {
                return Err(CompileError::InvalidValue {
                    reason: format!("global {} initializer is not a constant", name),
                })
            }
        };
        match constant {
            Constant::Str(bytes) => {
                if calculate {
                    self.image.allocate(name, MEM_ALIGN_BITS).extend_from_slice(&bytes);
                }
            }
            Constant::Float(v) => {
                if calculate {
                    self.image
                        .allocate(name, MEM_ALIGN_BITS)
                        .extend_from_slice(&v.to_le_bytes());
                }
            }
            Constant::Double(v) => {
                if calculate {
                    self.image
                        .allocate(name, MEM_ALIGN_BITS)
                        .extend_from_slice(&v.to_le_bytes());
                }
            }
            Constant::Int(v) => {
                if calculate {
                    // stored as 64 bits with the high half zero
                    let width = ty.int_width().unwrap_or(32);
                    let masked = if width >= 64 {
                        v as u64
                    } else {
                        (v as u64) & ((1u64 << width) - 1)
                    };
                    self.image
                        .allocate(name, MEM_ALIGN_BITS)
                        .extend_from_slice(&masked.to_le_bytes());
                }
            }
            Constant::AggregateZero => {
                if calculate {
                    let bytes = self.layout.store_size(&ty) as usize;
                    let bucket = self.image.allocate(name, MEM_ALIGN_BITS);
                    bucket.extend(std::iter::repeat(0).take(bytes));
                }
            }
            Constant::Array(elems) => {
                if name == "llvm.used" {
                    // export the kept-alives; functions by name, globals
                    // through the named-globals map
                    for &elem in &elems {
                        let target = self.module.strip_pointer_casts(elem);
                        if self.module.as_function(target).is_some() {
                            if calculate {
                                let mangled = self.js_name(target)?.to_string();
                                self.meta.exports.push(mangled);
                            }
                        } else if self.module.as_global(target).is_some() {
                            if !calculate {
                                let raw = self
                                    .module
                                    .value(target)
                                    .name
                                    .clone()
                                    .unwrap_or_default();
                                let addr = self.image.absolute(&raw)?;
                                self.meta.named_globals.insert(raw, addr);
                            }
                        }
                    }
                } else if name == "llvm.global.annotations" {
                    // ignorable
                } else {
                    return Err(CompileError::UnloweredConstant { kind: "array" });
                }
            }
            Constant::Struct(fields) => {
                if name == "__init_array_start" {
                    // the global static initializer list
                    if calculate {
                        for &field in &fields {
                            let target = self.module.strip_pointer_casts(field);
                            let mangled = self.js_name(target)?.to_string();
                            self.meta.initializers.push(mangled);
                        }
                    }
                } else if calculate {
                    let bytes = self.layout.store_size(&ty) as usize;
                    let bucket = self.image.allocate(name, MEM_ALIGN_BITS);
                    bucket.extend(std::iter::repeat(0).take(bytes));
                } else {
                    self.emit_packed_struct(name, &ty, &fields)?;
                }
            }
            Constant::Expr(expr) => {
                if name == "__init_array_start" {
                    if calculate {
                        let target = match expr {
                            ConstExpr::PtrToInt(v) | ConstExpr::Bitcast(v) => v,
                            _ => {
                                return Err(CompileError::UnloweredConstant {
                                    kind: "init array entry",
                                })
                            }
                        };
                        let mangled = self.js_name(target)?.to_string();
                        self.meta.initializers.push(mangled);
                    }
                } else if name == "__fini_array_start" {
                    // nothing to do
                } else if calculate {
                    // a global equal to a ptrtoint of something, so a
                    // 32-bit integer for us
                    self.image.allocate(name, MEM_ALIGN_BITS).extend_from_slice(&[0; 4]);
                } else {
                    self.emit_expr_global(name, &expr)?;
                }
            }
            Constant::Null => return Err(CompileError::UnloweredConstant { kind: "null" }),
            Constant::Vector(_) => return Err(CompileError::UnloweredConstant { kind: "vector" }),
            Constant::BlockAddress { .. } => {
                return Err(CompileError::UnloweredConstant {
                    kind: "blockaddress",
                })
            }
            Constant::Undef => return Err(CompileError::UnloweredConstant { kind: "undef" }),
            Constant::Alias { .. } => {}
        }
        Ok(())
    }

    /// Emit phase for a flattened packed struct: zeros were reserved in
    /// the calculate phase, relocations land now.
    fn emit_packed_struct(
        &mut self,
        name: &str,
        ty: &Type,
        fields: &[ValueId],
    ) -> CompileResult<()> {
        // Per the flattened-globals ABI this must be a packed struct of
        // byte strings and 32-bit relocations.
        match ty {
            Type::Struct { packed: true, .. } => {}
            _ => {
                return Err(CompileError::UnloweredConstant {
                    kind: "non-packed struct global",
                })
            }
        }
        let mut offset = self.image.relative(name)? as usize;
        let offset_start = offset;
        let absolute = self.image.absolute(name)?;
        for &field in fields {
            let field_ty = self.module.ty(field).clone();
            let constant = self.module.as_constant(field).cloned();
            match constant {
                Some(Constant::AggregateZero) => {
                    offset += self.layout.store_size(&field_ty) as usize;
                }
                Some(Constant::Str(bytes)) => {
                    for (i, byte) in bytes.iter().enumerate() {
                        self.image.data64[offset + i] = *byte;
                    }
                    offset += bytes.len();
                }
                Some(Constant::Expr(expr)) => {
                    let target_addr = absolute + (offset - offset_start) as u32;
                    let data = match expr {
                        ConstExpr::PtrToInt(v) => self.const_as_offset(v, target_addr)?,
                        ConstExpr::Add(a, b) => {
                            let inner = match self.module.as_constant(a) {
                                Some(Constant::Expr(ConstExpr::PtrToInt(v))) => *v,
                                _ => {
                                    return Err(CompileError::UnloweredConstant {
                                        kind: "constant expr addend",
                                    })
                                }
                            };
                            let base = self.const_as_offset(inner, target_addr)?;
                            let addend = self.module.const_int_value(b).unwrap_or(0);
                            base.wrapping_add(addend as u32)
                        }
                        _ => {
                            return Err(CompileError::UnloweredConstant {
                                kind: "constant expr kind",
                            })
                        }
                    };
                    self.image.patch_u32(offset, data);
                    offset += 4;
                }
                _ => {
                    return Err(CompileError::UnloweredConstant {
                        kind: "packed struct member",
                    })
                }
            }
        }
        Ok(())
    }

    /// Emit phase for a global initialized to a relocation expression.
    fn emit_expr_global(&mut self, name: &str, expr: &ConstExpr) -> CompileResult<()> {
        let mut data: u32 = 0;
        let mut current = expr.clone();

        // Deconstruct a lowered add-of-ptrtoint.
        if let ConstExpr::Add(a, b) = current {
            data = data.wrapping_add(self.module.const_int_value(b).unwrap_or(0) as u32);
            current = match self.module.as_constant(a) {
                Some(Constant::Expr(e)) => e.clone(),
                _ => {
                    return Err(CompileError::UnloweredConstant {
                        kind: "constant expr addend",
                    })
                }
            };
        }
        let mut target = match current {
            ConstExpr::PtrToInt(v) | ConstExpr::Bitcast(v) => v,
            ConstExpr::GepOffset { base, offset } => {
                data = data.wrapping_add(offset as u32);
                base
            }
            ConstExpr::Add(..) => {
                return Err(CompileError::UnloweredConstant {
                    kind: "nested add expr",
                })
            }
        };
        // Deconstruct lowered getelementptrs.
        loop {
            match self.module.as_constant(target) {
                Some(Constant::Expr(ConstExpr::GepOffset { base, offset })) => {
                    data = data.wrapping_add(*offset as u32);
                    target = *base;
                }
                Some(Constant::Expr(ConstExpr::Bitcast(v))) => target = *v,
                _ => break,
            }
        }

        let absolute = self.image.absolute(name)?;
        data = data.wrapping_add(self.const_as_offset(target, absolute)?);
        let offset = self.image.relative(name)? as usize;
        self.image.patch_u32(offset, data);
        Ok(())
    }

    fn resolve_fully(&self, mut value: ValueId) -> ValueId {
        loop {
            match self.module.as_constant(value) {
                Some(Constant::Alias { aliasee }) => value = *aliasee,
                Some(Constant::Expr(expr)) => {
                    value = match expr {
                        ConstExpr::PtrToInt(v)
                        | ConstExpr::Bitcast(v)
                        | ConstExpr::GepOffset { base: v, .. } => *v,
                        ConstExpr::Add(a, _) => *a,
                    };
                }
                _ => return value,
            }
        }
    }

    /// A constant about to be written into a global, as a numeric offset.
    /// A value not known at compile time leaves zeros behind and records a
    /// post-set to the target address instead.
    fn const_as_offset(&mut self, value: ValueId, absolute_target: u32) -> CompileResult<u32> {
        let value = self.resolve_fully(value);
        if self.module.as_function(value).is_some() {
            return self.function_index(value);
        }
        if let Some(Constant::BlockAddress { function, block }) =
            self.module.as_constant(value).cloned()
        {
            return Ok(self.block_address(function, block));
        }
        if let Some(global) = self.module.as_global(value) {
            if global.initializer.is_none() {
                // postsets are all of external values, so they are
                // pointers, hence 32-bit
                let name = self.js_name(value)?.to_string();
                self.meta.externals.insert(name.clone());
                self.post_sets
                    .push(format!("HEAP32[{}] = {};", absolute_target >> 2, name));
                return Ok(0);
            }
        }
        let raw = self
            .module
            .value(value)
            .name
            .clone()
            .ok_or_else(|| CompileError::UnknownGlobalAddress {
                name: String::from("<anonymous>"),
            })?;
        self.image.absolute(&raw)
    }

}
