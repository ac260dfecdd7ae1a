//! Alloca nativization.
//!
//! A stack slot whose address never escapes and whose only uses are loads
//! and stores *to* it can live in a plain local variable instead of the
//! heap. When optimizing, the regular optimizer has already taken these
//! opportunities; this analysis only runs at the lowest level.

use crate::ir::{FunctionData, Instruction, Module, ValueId};
use std::collections::HashSet;

/// Compute the set of nativizable allocas of one function.
pub fn calculate_nativized_vars(module: &Module, func: &FunctionData) -> HashSet<ValueId> {
    let mut nativized = HashSet::new();
    let mut candidates = Vec::new();

    for &block in &func.blocks {
        for &inst in &module.block(block).insts {
            if let Some(Instruction::Alloca { allocated, .. }) = module.as_instruction(inst) {
                // Vectors are left to the optimizer; aggregates stay in memory.
                if allocated.is_vector() || allocated.is_aggregate() {
                    continue;
                }
                candidates.push(inst);
            }
        }
    }
    if candidates.is_empty() {
        return nativized;
    }

    // One pass over all uses; an alloca fails on any use that is not a
    // load from it or a store to it.
    let mut failed: HashSet<ValueId> = HashSet::new();
    let candidate_set: HashSet<ValueId> = candidates.iter().copied().collect();
    for &block in &func.blocks {
        let data = module.block(block);
        for &inst in &data.insts {
            let instruction = match module.as_instruction(inst) {
                Some(i) => i,
                None => continue,
            };
            match instruction {
                // A load from a slot is fine.
                Instruction::Load { .. } => {}
                Instruction::Store { value, .. } => {
                    // A store *of* the address escapes it; a store *to* it
                    // is fine.
                    if candidate_set.contains(value) {
                        failed.insert(*value);
                    }
                }
                other => {
                    for op in other.operands() {
                        if candidate_set.contains(&op) {
                            failed.insert(op);
                        }
                    }
                }
            }
        }
        for op in data.term.operands() {
            if candidate_set.contains(&op) {
                failed.insert(op);
            }
        }
    }

    for candidate in candidates {
        if !failed.contains(&candidate) {
            nativized.insert(candidate);
        }
    }
    log::debug!("nativized {} allocas", nativized.len());
    nativized
}
