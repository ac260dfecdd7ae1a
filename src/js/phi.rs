//! φ carry code for CFG edges.
//!
//! For an edge `From -> To`, every leading φ of `To` gets an assignment of
//! its incoming value. The assignments have simultaneous semantics, so a
//! dependency between two φs forces ordering, and a cycle is broken by
//! materializing one incoming value into a `<name>$phi` temporary first.

use super::cast::Cast;
use super::Codegen;
use crate::core::CompileResult;
use crate::ir::{BlockId, Instruction, ValueId};
use std::collections::{BTreeMap, HashMap};

impl<'m, 'a> Codegen<'m, 'a> {
    /// The assignment sequence carrying out `to`'s φ nodes when control
    /// arrives from `from`. Empty when `to` has no φs for this edge.
    pub(crate) fn get_phi_code(&mut self, from: BlockId, to: BlockId) -> CompileResult<String> {
        let to_block = self.module.block(to);

        // Names of all φs of the target block.
        let mut phi_vars = std::collections::HashSet::new();
        for &inst in &to_block.insts {
            if !matches!(
                self.module.as_instruction(inst),
                Some(Instruction::Phi { .. })
            ) {
                break;
            }
            phi_vars.insert(self.js_name(inst)?.to_string());
        }
        if phi_vars.is_empty() {
            return Ok(String::new());
        }

        let to_insts: std::collections::HashSet<ValueId> =
            to_block.insts.iter().copied().collect();

        // variable -> assign statement / incoming value / dependency
        let mut assigns: BTreeMap<String, String> = BTreeMap::new();
        let mut values: HashMap<String, ValueId> = HashMap::new();
        let mut deps: BTreeMap<String, String> = BTreeMap::new();
        let mut undeps: BTreeMap<String, String> = BTreeMap::new();

        for &inst in &to_block.insts {
            let Some(Instruction::Phi { incoming }) = self.module.as_instruction(inst).cloned()
            else {
                break;
            };
            let Some((value, _)) = incoming.iter().find(|(_, block)| *block == from) else {
                continue;
            };
            let name = self.js_name(inst)?.to_string();
            let assign = self.get_assign(inst)?;
            assigns.insert(name.clone(), assign);
            // Strip pointer casts so the dependency check sees the same
            // value text the expression translation will produce.
            let value = self.module.strip_pointer_casts(*value);
            values.insert(name.clone(), value);
            let vname = self.get_value_as_str(value, Cast::SIGNED)?;
            if self.module.as_instruction(value).is_some()
                && to_insts.contains(&value)
                && phi_vars.contains(&vname)
            {
                deps.insert(name.clone(), vname.clone());
                undeps.insert(vname, name);
            }
        }

        // Emit assignments, honoring dependencies and breaking cycles.
        let move_count = assigns.len();
        let mut pre = String::new();
        let mut post = String::new();
        while !assigns.is_empty() {
            let mut emitted = false;
            let names: Vec<String> = assigns.keys().cloned().collect();
            for (i, curr) in names.iter().enumerate() {
                let value = values[curr];
                let mut incoming_text = self.get_value_as_str(value, Cast::SIGNED)?;
                let at_end = i + 1 == names.len();
                let dep = deps.get(curr).cloned();
                // no dependencies, or nothing else was emittable and this
                // is the end (a cycle)
                if dep.is_none() || (!emitted && at_end) {
                    if let Some(dep) = dep {
                        // break the cycle with a temporary
                        let temp = format!("{}$phi", curr);
                        let ty = self.module.ty(value).clone();
                        let temp_assign = self.get_ad_hoc_assign(&temp, &ty);
                        pre.push_str(&format!("{}{};", temp_assign, incoming_text));
                        incoming_text = temp;
                        deps.remove(curr);
                        undeps.remove(&dep);
                        log::trace!("phi cycle broken at {} via {}", curr, dep);
                    }
                    post.push_str(&format!("{}{};", assigns[curr], incoming_text));
                    assigns.remove(curr);
                    emitted = true;
                }
            }
        }
        self.session.record_phi_moves(move_count);
        Ok(format!("{}{}", pre, post))
    }
}
