//! Function-pointer tables.
//!
//! Each function signature gets its own table mapping runtime integer
//! indices to mangled function names; indirect calls go through these
//! tables. Reserved slots (for functions added at runtime) sit at the
//! front, 2-aligned. With non-aliasing enabled every placed function gets
//! a globally unique index across all tables.

use crate::core::{CodegenOptions, CompileResult};
use crate::ir::{FunctionType, Type};
use std::collections::{BTreeMap, HashMap};

/// Signature letter of one type: `v` void, `i` int/pointer, `d` double,
/// `f` precise float, `I` SIMD-int, `F` SIMD-float.
pub fn signature_letter(ty: &Type, options: &CodegenOptions) -> char {
    match ty {
        Type::Void => 'v',
        Type::Float if options.precise_f32 => 'f',
        Type::Float | Type::Double => 'd',
        Type::Vector(elem, _) => {
            if elem.is_integer() {
                'I'
            } else {
                'F'
            }
        }
        _ => 'i',
    }
}

/// Signature string of a function type: return letter then one letter per
/// parameter.
pub fn function_signature(ft: &FunctionType, options: &CodegenOptions) -> String {
    let mut sig = String::with_capacity(ft.params.len() + 1);
    sig.push(signature_letter(&ft.ret, options));
    for param in &ft.params {
        sig.push(signature_letter(param, options));
    }
    sig
}

/// All function tables of a module.
#[derive(Debug, Default)]
pub struct FunctionTableSet {
    tables: BTreeMap<String, Vec<String>>,
    indexed: HashMap<String, u32>,
    next_function_index: u32,
}

impl FunctionTableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of an already-placed function.
    pub fn cached_index(&self, mangled_name: &str) -> Option<u32> {
        self.indexed.get(mangled_name).copied()
    }

    fn ensure_table(&mut self, sig: &str, options: &CodegenOptions) -> &mut Vec<String> {
        let table = self.tables.entry(sig.to_string()).or_default();
        // Each reserved slot must be 2-aligned.
        let min_size = if options.reserved_function_pointers > 0 {
            2 * (options.reserved_function_pointers as usize + 1)
        } else {
            1
        };
        while table.len() < min_size {
            table.push("0".to_string());
        }
        table
    }

    /// Make sure the table for `sig` exists at its minimum size; indirect
    /// call sites need the table even when nothing was placed in it.
    pub fn ensure(&mut self, sig: &str, options: &CodegenOptions) {
        self.ensure_table(sig, options);
    }

    /// Place a function in the table for `sig` and return its index.
    /// Placement is append-only; once placed, the index is stable for the
    /// module's lifetime.
    pub fn place(
        &mut self,
        mangled_name: &str,
        sig: &str,
        alignment: u32,
        options: &CodegenOptions,
    ) -> CompileResult<u32> {
        debug_assert!(!self.indexed.contains_key(mangled_name));
        let next_function_index = self.next_function_index;
        let table = self.ensure_table(sig, options);
        if options.no_aliasing_function_pointers {
            while table.len() < next_function_index as usize {
                table.push("0".to_string());
            }
        }
        let alignment = alignment.max(1) as usize;
        while table.len() % alignment != 0 {
            table.push("0".to_string());
        }
        let index = table.len() as u32;
        table.push(mangled_name.to_string());
        self.indexed.insert(mangled_name.to_string(), index);
        if options.no_aliasing_function_pointers {
            self.next_function_index = index + 1;
        }
        log::debug!("placed {} in table {} at index {}", mangled_name, sig, index);
        Ok(index)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables with their entries padded up to a power of two with `"0"`
    /// sentinels, in signature order, for the metadata trailer.
    pub fn padded_tables(&self) -> Vec<(String, Vec<String>)> {
        self.tables
            .iter()
            .map(|(sig, entries)| {
                let mut padded = entries.clone();
                let mut size = 1;
                while size < padded.len() {
                    size <<= 1;
                }
                while padded.len() < size {
                    padded.push("0".to_string());
                }
                (sig.clone(), padded)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_fn(params: usize) -> FunctionType {
        FunctionType {
            ret: Type::Int(32),
            params: vec![Type::Int(32); params],
        }
    }

    #[test]
    fn test_signature_letters() {
        let mut options = CodegenOptions::default();
        assert_eq!(function_signature(&i32_fn(2), &options), "iii");
        let ft = FunctionType {
            ret: Type::Void,
            params: vec![Type::Float, Type::Double, Type::ptr(Type::Int(8))],
        };
        assert_eq!(function_signature(&ft, &options), "vddi");
        options.precise_f32 = true;
        assert_eq!(function_signature(&ft, &options), "vfdi");
        let vt = FunctionType {
            ret: Type::vector(Type::Int(32), 4),
            params: vec![Type::vector(Type::Float, 4)],
        };
        assert_eq!(function_signature(&vt, &options), "IF");
    }

    #[test]
    fn test_first_slot_is_reserved_null() {
        let options = CodegenOptions::default();
        let mut tables = FunctionTableSet::new();
        let index = tables.place("_f", "ii", 1, &options).unwrap();
        assert_eq!(index, 1);
        let padded = tables.padded_tables();
        assert_eq!(padded[0].1, vec!["0", "_f"]);
    }

    #[test]
    fn test_reserved_slots() {
        let options = CodegenOptions {
            reserved_function_pointers: 2,
            ..CodegenOptions::default()
        };
        let mut tables = FunctionTableSet::new();
        // 2*(reserved+1) leading nulls.
        assert_eq!(tables.place("_f", "v", 1, &options).unwrap(), 6);
    }

    #[test]
    fn test_no_aliasing_indices_are_global() {
        let options = CodegenOptions {
            no_aliasing_function_pointers: true,
            ..CodegenOptions::default()
        };
        let mut tables = FunctionTableSet::new();
        let a = tables.place("_a", "ii", 1, &options).unwrap();
        let b = tables.place("_b", "v", 1, &options).unwrap();
        let c = tables.place("_c", "ii", 1, &options).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(c, 3);
    }

    #[test]
    fn test_tables_pad_to_power_of_two() {
        let options = CodegenOptions::default();
        let mut tables = FunctionTableSet::new();
        for name in ["_a", "_b", "_c", "_d"] {
            tables.place(name, "ii", 1, &options).unwrap();
        }
        let padded = tables.padded_tables();
        assert_eq!(padded[0].1.len(), 8);
        assert_eq!(&padded[0].1[..5], &["0", "_a", "_b", "_c", "_d"]);
    }
}
