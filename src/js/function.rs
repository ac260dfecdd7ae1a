//! Per-function emission driver.
//!
//! Walks a function's blocks, feeds block bodies and branch descriptors
//! (with φ carry code) to the structurer, then splices the rendered body
//! into the function template: signature, argument self-coercions, local
//! declarations, stack prologue, body, defensive trailing return.

use super::cast::Cast;
use super::frame::{AllocaColoring, FrameLayout, STACK_ALIGN};
use super::nativize::calculate_nativized_vars;
use super::Codegen;
use crate::core::{CompileResult, OptLevel, OutputBuffer};
use crate::ir::{BlockId, Terminator, Type, ValueId};
use crate::relooper::Relooper;
use std::collections::{HashMap, HashSet};

impl<'m, 'a> Codegen<'m, 'a> {
    /// Dense per-function enumeration of blocks whose address is taken.
    pub(crate) fn block_address(&mut self, func: ValueId, block: BlockId) -> u32 {
        let blocks = self.block_addresses.entry(func).or_default();
        let next = blocks.len() as u32;
        *blocks.entry(block).or_insert(next)
    }

    /// Condition value for switch-style dispatch, when the terminator
    /// warrants one: always for an indirect branch, and for a switch when
    /// the cases are dense enough.
    fn consider_condition_var(&mut self, term: &Terminator) -> CompileResult<Option<String>> {
        match term {
            Terminator::IndirectBr { address, .. } => {
                Ok(Some(self.get_value_as_cast_str(*address, Cast::SIGNED)?))
            }
            Terminator::Switch { cond, cases, .. } => {
                let num = cases.len() as i64;
                if num == 0 {
                    return Ok(None);
                }
                let min = cases.iter().map(|(v, _)| *v).min().unwrap();
                let max = cases.iter().map(|(v, _)| *v).max().unwrap();
                let range = max - min;
                // use a switch if the range is not too big or sparse
                if num < 5 || range > 10 * 1024 || range / num > 1024 {
                    Ok(None)
                } else {
                    Ok(Some(self.get_value_as_cast_str(*cond, Cast::SIGNED)?))
                }
            }
            _ => Ok(None),
        }
    }

    fn add_block(
        &mut self,
        block: BlockId,
        relooper: &mut Relooper,
        block_map: &mut HashMap<BlockId, usize>,
    ) -> CompileResult<()> {
        // Each block begins in invoke state 0; the previous block may not
        // have cleared it if it was decapitated mid-sequence.
        self.invoke_state = 0;

        let data = self.module.block(block);
        let mut code = String::new();
        for &inst in &data.insts {
            if self.module.strip_pointer_casts(inst) != inst {
                continue;
            }
            if let Some(text) = self.generate_inst(inst)? {
                code.push_str(&text);
                code.push_str(";\n");
            }
        }
        if let Some(text) = self.generate_terminator_text(&data.term)? {
            code.push_str(&text);
            code.push_str(";\n");
        }
        let cond = self.consider_condition_var(&data.term)?;
        let id = relooper.add_block(code, cond);
        block_map.insert(block, id);
        Ok(())
    }

    fn phi_code_opt(&mut self, from: BlockId, to: BlockId) -> CompileResult<Option<String>> {
        let code = self.get_phi_code(from, to)?;
        Ok(if code.is_empty() { None } else { Some(code) })
    }

    fn add_branchings(
        &mut self,
        func: ValueId,
        block: BlockId,
        relooper: &mut Relooper,
        block_map: &HashMap<BlockId, usize>,
    ) -> CompileResult<()> {
        let term = self.module.block(block).term.clone();
        let from = block_map[&block];
        match term {
            Terminator::Br { dest } => {
                let phi = self.phi_code_opt(block, dest)?;
                relooper.add_branch(from, block_map[&dest], None, phi);
            }
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                let p0 = self.phi_code_opt(block, then_dest)?;
                let p1 = self.phi_code_opt(block, else_dest)?;
                let cond_text = self.get_value_as_str(cond, Cast::SIGNED)?;
                relooper.add_branch(from, block_map[&then_dest], Some(cond_text), p0);
                relooper.add_branch(from, block_map[&else_dest], None, p1);
            }
            Terminator::IndirectBr { dests, .. } => {
                // The same block may appear several times; the first unique
                // destination becomes the default, there being no sensible
                // default otherwise.
                let mut seen = HashSet::new();
                let mut set_default = false;
                for dest in dests {
                    if !seen.insert(dest) {
                        continue;
                    }
                    let phi = self.phi_code_opt(block, dest)?;
                    let label = if set_default {
                        Some(format!("case {}: ", self.block_address(func, dest)))
                    } else {
                        set_default = true;
                        None
                    };
                    relooper.add_branch(from, block_map[&dest], label, phi);
                }
            }
            Terminator::Switch {
                cond,
                default,
                cases,
            } => {
                let use_switch = self
                    .consider_condition_var(&Terminator::Switch {
                        cond,
                        default,
                        cases: cases.clone(),
                    })?
                    .is_some();
                let phi = self.phi_code_opt(block, default)?;
                relooper.add_branch(from, block_map[&default], None, phi);

                // Accumulate the condition per target; each target keeps one
                // combined edge.
                let mut order: Vec<BlockId> = Vec::new();
                let mut conditions: HashMap<BlockId, String> = HashMap::new();
                for (value, dest) in &cases {
                    let condition = if use_switch {
                        format!("case {}: ", value)
                    } else {
                        let cond_text = self.get_value_as_cast_paren_str(cond, Cast::SIGNED)?;
                        format!("({} == {})", cond_text, value)
                    };
                    let entry = conditions.entry(*dest).or_insert_with(|| {
                        order.push(*dest);
                        String::new()
                    });
                    let joiner = if !use_switch && !entry.is_empty() {
                        " | "
                    } else {
                        ""
                    };
                    *entry = format!("{}{}{}", condition, joiner, entry);
                }
                for dest in order {
                    if dest == default {
                        // fine to drop; the default edge gets there anyhow
                        continue;
                    }
                    let phi = self.phi_code_opt(block, dest)?;
                    relooper.add_branch(
                        from,
                        block_map[&dest],
                        Some(conditions[&dest].clone()),
                        phi,
                    );
                }
            }
            Terminator::Ret(_) | Terminator::Unreachable => {}
        }
        Ok(())
    }

    /// Scan a function and record, per value, how often it is used and by
    /// whom. Drives `getAssignIfNeeded` and the insertelement chains.
    fn scan_uses(&mut self, func: ValueId) {
        self.use_counts.clear();
        self.users.clear();
        let data = self.module.as_function(func).unwrap();
        for &block in &data.blocks {
            let block_data = self.module.block(block);
            for &inst in &block_data.insts {
                if let Some(instruction) = self.module.as_instruction(inst) {
                    for op in instruction.operands() {
                        *self.use_counts.entry(op).or_insert(0) += 1;
                        self.users.entry(op).or_default().push(inst);
                    }
                }
            }
            for op in block_data.term.operands() {
                *self.use_counts.entry(op).or_insert(0) += 1;
            }
        }
    }

    fn zero_initializer(&self, ty: &Type) -> &'static str {
        match ty {
            Type::Ptr(_) | Type::Int(_) | Type::Func(_) => "0",
            Type::Float if self.options.precise_f32 => "Math_fround(0)",
            Type::Float | Type::Double => "+0",
            Type::Vector(elem, _) => {
                if elem.is_integer() {
                    "SIMD_int32x4(0,0,0,0)"
                } else {
                    "SIMD_float32x4(0,0,0,0)"
                }
            }
            _ => "0",
        }
    }

    fn undef_value_text(&self, ty: &Type) -> String {
        match ty {
            Type::Vector(elem, _) => {
                if elem.is_integer() {
                    "SIMD_int32x4_splat(0)".to_string()
                } else {
                    "SIMD_float32x4_splat(Math_fround(0))".to_string()
                }
            }
            Type::Float if self.options.precise_f32 => "Math_fround(+0)".to_string(),
            Type::Float | Type::Double => "+0".to_string(),
            _ => "0".to_string(),
        }
    }

    /// Emit one defined function.
    pub(crate) fn emit_function(&mut self, func: ValueId, out: &mut OutputBuffer) -> CompileResult<()> {
        let data = self.module.as_function(func).unwrap();
        let raw_name = self.module.value(func).name.clone().unwrap_or_default();
        log::debug!("emitting function {}", raw_name);

        // Reset per-function scratch.
        self.names.clear();
        self.used_vars.clear();
        self.unique_num = 0;
        self.stack_bumped = false;
        self.invoke_state = 0;
        self.current_function = Some(func);
        self.scan_uses(func);

        // Establish parameter names first so anonymous values number in
        // signature order.
        let params = data.params.clone();
        let mut param_names = Vec::with_capacity(params.len());
        for &param in &params {
            param_names.push(self.js_name(param)?.to_string());
        }

        // When optimizing, the regular optimizer has already taken all the
        // nativization opportunities.
        self.nativized = if self.options.opt_level == OptLevel::None {
            calculate_nativized_vars(self.module, data)
        } else {
            HashSet::new()
        };

        self.frame = FrameLayout::analyze(self.module, data, &self.layout);

        // Build the structurer input: block bodies, then branchings.
        let mut relooper = Relooper::new();
        let mut block_map = HashMap::new();
        let blocks = data.blocks.clone();
        for &block in &blocks {
            self.add_block(block, &mut relooper, &mut block_map)?;
        }
        for &block in &blocks {
            self.add_branchings(func, block, &mut relooper, &block_map)?;
        }
        relooper.calculate(block_map[&blocks[0]]);
        let body = relooper.render();

        // Locals always present: the stack save and the dispatch label.
        self.used_vars.insert("sp".to_string(), Type::Int(32));
        let max_alignment = self.frame.max_alignment();
        if max_alignment > STACK_ALIGN {
            self.used_vars.insert("sp_a".to_string(), Type::Int(32));
        }
        self.used_vars.insert("label".to_string(), Type::Int(32));

        if !self.warned_many_locals
            && self.options.opt_level.as_u32() < 2
            && self.used_vars.len() > 2000
        {
            log::warn!(
                "emitted code will contain very large numbers of local variables, \
                 which is bad for performance (build with optimization level 2 or \
                 above to avoid this)"
            );
            self.warned_many_locals = true;
        }

        // Signature.
        let name = self.js_name(func)?.to_string();
        out.push_str(&format!("function {}(", name));
        out.push_str(&param_names.join(","));
        out.line(") {");

        // Argument self-coercions.
        for (i, &param) in params.iter().enumerate() {
            let ty = self.module.ty(param).clone();
            let coerced = self.cast_text(&param_names[i], &ty, Cast::NONSPECIFIC)?;
            out.line(&format!(" {} = {};", param_names[i], coerced));
        }

        // Local variable declarations, in runs of 20 per var statement for
        // parse-time efficiency.
        if !self.used_vars.is_empty() {
            let vars: Vec<(String, Type)> = self
                .used_vars
                .iter()
                .map(|(n, t)| (n.clone(), t.clone()))
                .collect();
            let mut count = 0;
            for (var_name, ty) in &vars {
                if count == 20 {
                    out.push_str(";\n");
                    count = 0;
                }
                if count == 0 {
                    out.push_str(" var ");
                } else {
                    out.push_str(", ");
                }
                count += 1;
                out.push_str(var_name);
                out.push_str(" = ");
                out.push_str(self.zero_initializer(ty));
            }
            out.line(";");
        }

        // Stack entry and frame bump.
        let sp_assign = self.get_ad_hoc_assign("sp", &Type::Int(32));
        out.push_str(&format!(" {}STACKTOP;", sp_assign));
        let frame_size = self.frame.frame_size();
        if frame_size > 0 {
            if max_alignment > STACK_ALIGN {
                // the entire frame needs more than the default alignment
                out.push_str(&format!(
                    "\n sp_a = STACKTOP = (STACKTOP + {})&-{};",
                    max_alignment - 1,
                    max_alignment
                ));
            }
            out.push_str("\n ");
            out.push_str(&self.get_stack_bump(&frame_size.to_string()));
        }
        out.newline();

        out.push_str(&body);

        // Ensure a final return if necessary.
        let ret_ty = data.ty.ret.clone();
        if !ret_ty.is_void() {
            let tail = match body.rfind('}') {
                Some(pos) => &body[pos..],
                None => &body[..],
            };
            if !tail.contains("return ") {
                let undef = self.undef_value_text(&ret_ty);
                let coerced = self.paren_cast_text(&undef, &ret_ty, Cast::NONSPECIFIC)?;
                out.line(&format!(" return {};", coerced));
            }
        }
        out.line("}");

        self.session.record_function_emitted(&name, body.len());
        self.current_function = None;
        Ok(())
    }
}
