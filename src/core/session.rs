//! Arena-based codegen session management.
//!
//! This module provides simplified lifetime management for emission using
//! arena allocation. Mangled names are interned in the arena and shared by
//! reference for the lifetime of the session, and the session gathers
//! emission statistics for debugging.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based codegen session.
///
/// Owns the string intern table and the statistics gathered while a module
/// is emitted. All interned strings share the arena lifetime.
pub struct CodegenSession<'arena> {
    arena: &'arena Bump,
    interned_strings: RefCell<HashMap<String, &'arena str>>,
    stats: RefCell<SessionStats>,
}

impl<'arena> CodegenSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            interned_strings: RefCell::new(HashMap::new()),
            stats: RefCell::new(SessionStats::default()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }
        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Record that a function body was emitted.
    pub fn record_function_emitted(&self, name: &str, text_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_emitted += 1;
        stats.total_text_size += text_size;
        if stats.largest_function_size < text_size {
            stats.largest_function_size = text_size;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record an instruction translation.
    pub fn record_instruction_emitted(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_emitted += 1;
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record φ carry assignments emitted for one CFG edge.
    pub fn record_phi_moves(&self, count: usize) {
        self.stats.borrow_mut().phi_moves_emitted += count;
    }

    /// Record a function receiving a table index.
    pub fn record_table_slot(&self) {
        self.stats.borrow_mut().table_slots += 1;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Emission statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub functions_emitted: usize,
    pub total_text_size: usize,
    pub instructions_emitted: usize,
    pub instruction_counts: HashMap<String, usize>,
    pub largest_function_size: usize,
    pub largest_function_name: String,
    pub phi_moves_emitted: usize,
    pub table_slots: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Emission Statistics:")?;
        writeln!(f, "  Functions emitted: {}", self.functions_emitted)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Total text size: {} bytes", self.total_text_size)?;
        writeln!(f, "  Phi moves emitted: {}", self.phi_moves_emitted)?;
        writeln!(f, "  Table slots: {}", self.table_slots)?;
        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} bytes)",
                self.largest_function_name, self.largest_function_size
            )?;
        }
        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }
        Ok(())
    }
}
