//! Data layout queries for the 32-bit asm.js target.
//!
//! Sizes and alignments match the `asmjs-unknown-emscripten` data layout:
//! 32-bit pointers, naturally aligned scalars, 16-byte vectors.

use super::Type;

/// Round `x` up to a multiple of `align` (power of two).
pub fn round_up(x: u64, align: u64) -> u64 {
    (x + align - 1) & !(align - 1)
}

/// Target data layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataLayout;

impl DataLayout {
    pub fn new() -> Self {
        DataLayout
    }

    /// ABI alignment of a type, in bytes.
    pub fn abi_align(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void => 1,
            Type::Int(w) => match *w {
                0..=8 => 1,
                9..=16 => 2,
                _ => 4,
            },
            Type::Float => 4,
            Type::Double => 8,
            Type::Ptr(_) | Type::Func(_) => 4,
            Type::Vector(..) => 16,
            Type::Array(elem, _) => self.abi_align(elem),
            Type::Struct { fields, packed } => {
                if *packed {
                    1
                } else {
                    fields.iter().map(|f| self.abi_align(f)).max().unwrap_or(1)
                }
            }
        }
    }

    /// Number of bytes written when storing a value of this type.
    pub fn store_size(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void => 0,
            Type::Int(w) => u64::from((*w + 7) / 8),
            Type::Float => 4,
            Type::Double => 8,
            Type::Ptr(_) | Type::Func(_) => 4,
            Type::Vector(_, lanes) => u64::from(*lanes) * 4,
            Type::Array(elem, count) => self.alloc_size(elem) * count,
            Type::Struct { fields, packed } => self.struct_layout(fields, *packed).1,
        }
    }

    /// Bytes a value of this type occupies in memory, padding included.
    pub fn alloc_size(&self, ty: &Type) -> u64 {
        round_up(self.store_size(ty), self.abi_align(ty))
    }

    /// Field offsets and total size of a struct.
    pub fn struct_layout(&self, fields: &[Type], packed: bool) -> (Vec<u64>, u64) {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0u64;
        for field in fields {
            if !packed {
                offset = round_up(offset, self.abi_align(field));
            }
            offsets.push(offset);
            offset += self.alloc_size(field);
        }
        if !packed {
            let align = fields.iter().map(|f| self.abi_align(f)).max().unwrap_or(1);
            offset = round_up(offset, align);
        }
        (offsets, offset)
    }

    /// Byte offset of one struct field.
    pub fn struct_field_offset(&self, ty: &Type, field: usize) -> u64 {
        match ty {
            Type::Struct { fields, packed } => self.struct_layout(fields, *packed).0[field],
            _ => panic!("struct_field_offset on non-struct type {}", ty),
        }
    }
}
