//! Control-flow structurer boundary.
//!
//! The backend submits basic blocks (pre-rendered statement text plus an
//! optional switch condition) and labelled edges, then asks for structured
//! output. The submission protocol is fixed; the structuring strategy
//! behind it is an implementation detail. The renderer here drives a
//! `label` dispatch loop, which is correct for arbitrary reducible and
//! irreducible graphs:
//!
//! ```text
//!  label = <entry>;
//!  while (1) switch (label | 0) {
//!  case <id>: { <body> <edges> }
//!  ...
//!  }
//! ```
//!
//! A function with a single block and no edges renders as the block body
//! alone. Edge labels submitted as `case N: ` text are spliced verbatim
//! into an inner switch when the block carries a condition variable;
//! otherwise labels are `if` conditions and the unlabelled edge is the
//! fallthrough.

/// One outgoing edge of a submitted block.
#[derive(Debug, Clone)]
struct Branch {
    target: usize,
    /// `None` marks the default/fallthrough edge.
    label: Option<String>,
    /// φ carry code to run when the edge is taken.
    phi_code: Option<String>,
}

/// One submitted block.
#[derive(Debug, Clone)]
struct Block {
    code: String,
    /// Condition value text for switch-style dispatch, if any.
    cond_var: Option<String>,
    branches: Vec<Branch>,
}

/// Structurer instance for one function.
#[derive(Debug, Default)]
pub struct Relooper {
    blocks: Vec<Block>,
    entry: usize,
    reachable: Vec<bool>,
}

impl Relooper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a block; returns its dense id.
    pub fn add_block(&mut self, code: String, cond_var: Option<String>) -> usize {
        self.blocks.push(Block {
            code,
            cond_var,
            branches: Vec::new(),
        });
        self.blocks.len() - 1
    }

    /// Declare an edge. `label` is either a textual branch condition or a
    /// `case N: ` prefix when the source block has a condition variable;
    /// `None` marks the default edge.
    pub fn add_branch(
        &mut self,
        from: usize,
        to: usize,
        label: Option<String>,
        phi_code: Option<String>,
    ) {
        self.blocks[from].branches.push(Branch {
            target: to,
            label,
            phi_code,
        });
    }

    /// Compute reachability from the entry block.
    pub fn calculate(&mut self, entry: usize) {
        self.entry = entry;
        self.reachable = vec![false; self.blocks.len()];
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if self.reachable[id] {
                continue;
            }
            self.reachable[id] = true;
            for branch in &self.blocks[id].branches {
                if !self.reachable[branch.target] {
                    stack.push(branch.target);
                }
            }
        }
    }

    /// Render the structured body.
    pub fn render(&self) -> String {
        if self.blocks.is_empty() {
            return String::new();
        }

        let reachable_count = self.reachable.iter().filter(|r| **r).count();
        if reachable_count <= 1 && self.blocks[self.entry].branches.is_empty() {
            return indent_body(&self.blocks[self.entry].code);
        }

        let mut out = String::new();
        out.push_str(&format!(" label = {};\n", self.entry));
        out.push_str(" while (1) switch (label | 0) {\n");
        for (id, block) in self.blocks.iter().enumerate() {
            if !self.reachable.get(id).copied().unwrap_or(false) {
                continue;
            }
            out.push_str(&format!(" case {}: {{\n", id));
            out.push_str(&indent_body(&block.code));
            self.render_branches(block, &mut out);
            out.push_str(" }\n");
        }
        out.push_str(" }\n");
        out
    }

    fn render_branches(&self, block: &Block, out: &mut String) {
        if block.branches.is_empty() {
            return;
        }

        if let Some(cond) = &block.cond_var {
            // Switch-style dispatch: the condition lands in `label` first,
            // then each labelled edge is spliced as-is.
            out.push_str(&format!("  label = {};\n", cond));
            out.push_str("  switch (label | 0) {\n");
            let mut default: Option<&Branch> = None;
            for branch in &block.branches {
                match &branch.label {
                    Some(label) => {
                        out.push_str(&format!("  {}{{ ", label));
                        Self::render_jump(branch, out);
                        out.push_str(" }\n");
                    }
                    None => default = Some(branch),
                }
            }
            if let Some(branch) = default {
                out.push_str("  default: { ");
                Self::render_jump(branch, out);
                out.push_str(" }\n");
            }
            out.push_str("  }\n  break;\n");
            return;
        }

        // Conditional chain: labelled edges are if conditions, the
        // unlabelled edge is the fallthrough.
        for branch in &block.branches {
            match &branch.label {
                Some(cond) => {
                    out.push_str(&format!("  if ({}) {{ ", cond));
                    Self::render_jump(branch, out);
                    out.push_str(" }\n");
                }
                None => {
                    out.push_str("  ");
                    Self::render_jump(branch, out);
                    out.push('\n');
                }
            }
        }
    }

    fn render_jump(branch: &Branch, out: &mut String) {
        if let Some(phi) = &branch.phi_code {
            out.push_str(phi);
        }
        out.push_str(&format!("label = {}; break;", branch.target));
    }
}

fn indent_body(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 16);
    for line in code.lines() {
        if line.is_empty() {
            continue;
        }
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    out
}
