//! Stack frame planning for allocas.
//!
//! The emitter consumes a coloring analysis through the [`AllocaColoring`]
//! interface: per-alloca frame offsets, the frame's maximum alignment and
//! total size, and a representative for coalesced allocas. The analysis
//! behind the interface is replaceable; [`FrameLayout`] is the in-crate
//! implementation, a sequential packer without overlay coloring.

use crate::core::CodegenOptions;
use crate::ir::layout::round_up;
use crate::ir::{DataLayout, FunctionData, Instruction, Module, ValueId};
use std::collections::HashMap;

pub const STACK_ALIGN: u32 = 16;
pub const STACK_ALIGN_BITS: u32 = 128;

/// Round a byte count up to the stack alignment.
pub fn stack_align(x: u64) -> u64 {
    round_up(x, u64::from(STACK_ALIGN))
}

/// Text that rounds a dynamic byte count up to the stack alignment.
pub fn stack_align_str(x: &str) -> String {
    format!("(({}+{})&-{})", x, STACK_ALIGN - 1, STACK_ALIGN)
}

/// The prologue/inline stack bump statement.
pub fn stack_bump_text(size: &str, options: &CodegenOptions) -> String {
    let mut text = format!("STACKTOP = STACKTOP + {}|0;", size);
    if options.assertions > 0 {
        text.push_str(" if ((STACKTOP|0) >= (STACK_MAX|0)) abort();");
    }
    text
}

/// Interface of the alloca coloring analysis.
pub trait AllocaColoring {
    /// Frame offset of a static alloca, if it received a slot.
    fn frame_offset(&self, alloca: ValueId) -> Option<u64>;
    /// Largest alignment of any slot in the frame.
    fn max_alignment(&self) -> u32;
    /// Total frame size, stack-aligned.
    fn frame_size(&self) -> u64;
    /// The alloca actually holding this alloca's storage.
    fn representative(&self, alloca: ValueId) -> ValueId;
}

/// Sequential frame layout: every static alloca gets its own slot in
/// declaration order, padded to its alignment.
#[derive(Debug, Default)]
pub struct FrameLayout {
    offsets: HashMap<ValueId, u64>,
    frame_size: u64,
    max_alignment: u32,
}

impl FrameLayout {
    /// Plan the frame for one function. Static allocas are the constant
    /// sized allocas of the entry block.
    pub fn analyze(module: &Module, func: &FunctionData, layout: &DataLayout) -> Self {
        let mut offsets = HashMap::new();
        let mut offset = 0u64;
        let mut max_alignment = 1u32;

        if let Some(&entry) = func.blocks.first() {
            for &inst in &module.block(entry).insts {
                let Some(Instruction::Alloca {
                    allocated,
                    count,
                    align,
                }) = module.as_instruction(inst)
                else {
                    continue;
                };
                let Some(count) = module.const_int_value(*count) else {
                    continue;
                };
                let align = (*align).max(layout.abi_align(allocated) as u32).max(1);
                max_alignment = max_alignment.max(align);
                offset = round_up(offset, u64::from(align));
                offsets.insert(inst, offset);
                offset += layout.alloc_size(allocated) * count as u64;
            }
        }

        let frame_size = if offset > 0 { stack_align(offset) } else { 0 };
        log::debug!(
            "frame: {} static allocas, {} bytes, max align {}",
            offsets.len(),
            frame_size,
            max_alignment
        );
        FrameLayout {
            offsets,
            frame_size,
            max_alignment,
        }
    }
}

impl AllocaColoring for FrameLayout {
    fn frame_offset(&self, alloca: ValueId) -> Option<u64> {
        self.offsets.get(&alloca).copied()
    }

    fn max_alignment(&self) -> u32 {
        self.max_alignment
    }

    fn frame_size(&self) -> u64 {
        self.frame_size
    }

    fn representative(&self, alloca: ValueId) -> ValueId {
        alloca
    }
}
