//! Global memory image and address map.
//!
//! The image is partitioned into three append-only byte buffers keyed by
//! alignment (64, 32 and 8 bits). Absolute addresses are the bucket-local
//! offset plus the global base plus the sizes of all strictly
//! larger-aligned buckets. The 32-bit bucket is legacy-reserved and must
//! stay empty at emit time.

use crate::core::{CompileError, CompileResult};
use std::collections::HashMap;

pub const MEM_ALIGN_BITS: u32 = 64;

/// One alignment bucket of raw bytes.
pub type HeapData = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub offset: u32,
    pub bits: u32,
}

/// The flat byte image of all global initializers.
#[derive(Debug, Default)]
pub struct GlobalImage {
    pub data8: HeapData,
    pub data32: HeapData,
    pub data64: HeapData,
    addresses: HashMap<String, Address>,
    global_base: u32,
}

impl GlobalImage {
    pub fn new(global_base: u32) -> Self {
        Self {
            global_base,
            ..Self::default()
        }
    }

    /// Pad the bucket to the element alignment, record the symbol's
    /// address and return the bucket for appending.
    pub fn allocate(&mut self, name: &str, bits: u32) -> &mut HeapData {
        let bucket = match bits {
            8 => &mut self.data8,
            32 => &mut self.data32,
            64 => &mut self.data64,
            _ => unreachable!("unsupported data element size {}", bits),
        };
        while bucket.len() % (bits as usize / 8) != 0 {
            bucket.push(0);
        }
        let offset = bucket.len() as u32;
        self.addresses.insert(name.to_string(), Address { offset, bits });
        bucket
    }

    pub fn has_address(&self, name: &str) -> bool {
        self.addresses.contains_key(name)
    }

    /// Absolute address of a global.
    pub fn absolute(&self, name: &str) -> CompileResult<u32> {
        let a = self
            .addresses
            .get(name)
            .ok_or_else(|| CompileError::UnknownGlobalAddress {
                name: name.to_string(),
            })?;
        let addr = match a.bits {
            64 => {
                debug_assert!((a.offset + self.global_base) % 8 == 0);
                a.offset + self.global_base
            }
            32 => {
                debug_assert!((a.offset + self.global_base) % 4 == 0);
                a.offset + self.global_base + self.data64.len() as u32
            }
            8 => a.offset + self.global_base + self.data64.len() as u32 + self.data32.len() as u32,
            _ => {
                return Err(CompileError::UnknownGlobalAddress {
                    name: name.to_string(),
                })
            }
        };
        Ok(addr)
    }

    /// Offset of a global inside its bucket.
    pub fn relative(&self, name: &str) -> CompileResult<u32> {
        self.addresses
            .get(name)
            .map(|a| a.offset)
            .ok_or_else(|| CompileError::UnknownGlobalAddress {
                name: name.to_string(),
            })
    }

    /// Patch 4 little-endian bytes in the 64-bit bucket. Used by the emit
    /// phase to resolve relocations reserved during the calculate phase.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.data64.len());
        self.data64[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Enforce the legacy invariant before the image is flushed.
    pub fn check_buckets(&self) -> CompileResult<()> {
        if !self.data32.is_empty() {
            return Err(CompileError::NonEmptyBucket {
                size: self.data32.len(),
            });
        }
        Ok(())
    }

    /// All bucket bytes in emission order (64, then 32, then 8).
    pub fn comma_separated(&self) -> String {
        let mut out = String::new();
        let mut first = true;
        for bucket in [&self.data64, &self.data32, &self.data8] {
            for byte in bucket {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&byte.to_string());
            }
        }
        out
    }
}
