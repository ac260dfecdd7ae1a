//! Builders for constructing IR modules.
//!
//! The builder API mirrors the usual position-and-append style: append
//! blocks to a function, position at a block's end, then build
//! instructions. Used by the test suite and by embedders that produce
//! modules programmatically.

use super::{
    BinOp, BlockData, BlockId, CastOp, Constant, ConstExpr, FloatPredicate, FunctionData,
    FunctionType, GlobalVariable, Instruction, IntPredicate, Module, RmwOp, Terminator, Type,
    ValueData, ValueId, ValueKind,
};

fn opt_name(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Builds a [`Module`] value by value.
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            module: Module::empty(name),
        }
    }

    pub fn set_target_triple(&mut self, triple: &str) {
        self.module.target_triple = triple.to_string();
    }

    fn constant(&mut self, ty: Type, c: Constant) -> ValueId {
        self.module.push_value(ValueData {
            name: None,
            ty,
            kind: ValueKind::Constant(c),
        })
    }

    pub fn const_int(&mut self, ty: Type, value: i64) -> ValueId {
        self.constant(ty, Constant::Int(value))
    }

    pub fn const_i32(&mut self, value: i32) -> ValueId {
        self.const_int(Type::Int(32), i64::from(value))
    }

    pub fn const_i1(&mut self, value: bool) -> ValueId {
        self.const_int(Type::Int(1), i64::from(value))
    }

    pub fn const_float(&mut self, value: f32) -> ValueId {
        self.constant(Type::Float, Constant::Float(value))
    }

    pub fn const_double(&mut self, value: f64) -> ValueId {
        self.constant(Type::Double, Constant::Double(value))
    }

    pub fn const_null(&mut self, pointee: Type) -> ValueId {
        self.constant(Type::ptr(pointee), Constant::Null)
    }

    pub fn const_undef(&mut self, ty: Type) -> ValueId {
        self.constant(ty, Constant::Undef)
    }

    pub fn const_zero(&mut self, ty: Type) -> ValueId {
        self.constant(ty, Constant::AggregateZero)
    }

    pub fn const_str(&mut self, bytes: &[u8]) -> ValueId {
        self.constant(
            Type::array(Type::Int(8), bytes.len() as u64),
            Constant::Str(bytes.to_vec()),
        )
    }

    pub fn const_struct(&mut self, fields: Vec<ValueId>, packed: bool) -> ValueId {
        let field_tys = fields
            .iter()
            .map(|f| self.module.ty(*f).clone())
            .collect::<Vec<_>>();
        self.constant(
            Type::Struct {
                fields: field_tys,
                packed,
            },
            Constant::Struct(fields),
        )
    }

    pub fn const_array(&mut self, elem_ty: Type, elems: Vec<ValueId>) -> ValueId {
        self.constant(
            Type::array(elem_ty, elems.len() as u64),
            Constant::Array(elems),
        )
    }

    pub fn const_vector(&mut self, elems: Vec<ValueId>) -> ValueId {
        let elem_ty = self.module.ty(elems[0]).clone();
        self.constant(
            Type::vector(elem_ty, elems.len() as u32),
            Constant::Vector(elems),
        )
    }

    pub fn const_ptrtoint(&mut self, value: ValueId) -> ValueId {
        self.constant(Type::Int(32), Constant::Expr(ConstExpr::PtrToInt(value)))
    }

    pub fn const_add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.constant(Type::Int(32), Constant::Expr(ConstExpr::Add(lhs, rhs)))
    }

    pub fn const_bitcast(&mut self, value: ValueId, ty: Type) -> ValueId {
        self.constant(ty, Constant::Expr(ConstExpr::Bitcast(value)))
    }

    pub fn const_gep_offset(&mut self, base: ValueId, offset: i64) -> ValueId {
        let ty = self.module.ty(base).clone();
        self.constant(ty, Constant::Expr(ConstExpr::GepOffset { base, offset }))
    }

    pub fn const_block_address(&mut self, function: ValueId, block: BlockId) -> ValueId {
        self.constant(
            Type::ptr(Type::Int(8)),
            Constant::BlockAddress { function, block },
        )
    }

    pub fn global_alias(&mut self, name: &str, aliasee: ValueId) -> ValueId {
        let ty = self.module.ty(aliasee).clone();
        let id = self.constant(ty, Constant::Alias { aliasee });
        self.module.value_mut(id).name = Some(name.to_string());
        id
    }

    /// Add a global variable holding `content_ty`. The resulting value has
    /// pointer type; a missing initializer declares an external symbol.
    pub fn add_global(&mut self, name: &str, content_ty: Type, init: Option<ValueId>) -> ValueId {
        let id = self.module.push_value(ValueData {
            name: Some(name.to_string()),
            ty: Type::ptr(content_ty),
            kind: ValueKind::Global(GlobalVariable {
                initializer: init,
                alignment: 0,
            }),
        });
        self.module.globals.push(id);
        id
    }

    /// Declare an external function.
    pub fn declare_function(&mut self, name: &str, ty: FunctionType) -> ValueId {
        let id = self.module.push_value(ValueData {
            name: Some(name.to_string()),
            ty: Type::Func(Box::new(ty.clone())),
            kind: ValueKind::Function(FunctionData {
                ty,
                params: Vec::new(),
                blocks: Vec::new(),
                alignment: 1,
            }),
        });
        self.module.functions.push(id);
        id
    }

    /// Start defining a function; blocks and instructions are added through
    /// the returned builder.
    pub fn define_function(&mut self, name: &str, ty: FunctionType) -> FunctionBuilder<'_> {
        let mut params = Vec::with_capacity(ty.params.len());
        for (index, pty) in ty.params.iter().enumerate() {
            params.push(self.module.push_value(ValueData {
                name: None,
                ty: pty.clone(),
                kind: ValueKind::Argument {
                    index: index as u32,
                },
            }));
        }
        let func = self.module.push_value(ValueData {
            name: Some(name.to_string()),
            ty: Type::Func(Box::new(ty.clone())),
            kind: ValueKind::Function(FunctionData {
                ty,
                params,
                blocks: Vec::new(),
                alignment: 1,
            }),
        });
        self.module.functions.push(func);
        FunctionBuilder {
            builder: self,
            func,
            current: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }
}

/// Builds the body of one function.
pub struct FunctionBuilder<'m> {
    builder: &'m mut ModuleBuilder,
    func: ValueId,
    current: Option<BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn func_id(&self) -> ValueId {
        self.func
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.builder
            .module
            .as_function(self.func)
            .expect("function value")
            .params[index]
    }

    pub fn set_param_name(&mut self, index: usize, name: &str) {
        let param = self.param(index);
        self.builder.module.value_mut(param).name = opt_name(name);
    }

    pub fn set_alignment(&mut self, alignment: u32) {
        if let ValueKind::Function(f) = &mut self.builder.module.value_mut(self.func).kind {
            f.alignment = alignment;
        }
    }

    pub fn append_block(&mut self, name: &str) -> BlockId {
        let id = self.builder.module.push_block(BlockData {
            name: opt_name(name),
            insts: Vec::new(),
            term: Terminator::Unreachable,
        });
        if let ValueKind::Function(f) = &mut self.builder.module.value_mut(self.func).kind {
            f.blocks.push(id);
        }
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    fn push_inst(&mut self, name: &str, ty: Type, inst: Instruction) -> ValueId {
        let block = self.current.expect("no block positioned");
        let id = self.builder.module.push_value(ValueData {
            name: opt_name(name),
            ty,
            kind: ValueKind::Instruction(inst),
        });
        self.builder.module.block_mut(block).insts.push(id);
        id
    }

    fn set_term(&mut self, term: Terminator) {
        let block = self.current.expect("no block positioned");
        self.builder.module.block_mut(block).term = term;
    }

    // Constant helpers, delegated so constants can be made mid-build.

    pub fn const_i32(&mut self, value: i32) -> ValueId {
        self.builder.const_i32(value)
    }

    pub fn const_int(&mut self, ty: Type, value: i64) -> ValueId {
        self.builder.const_int(ty, value)
    }

    pub fn const_float(&mut self, value: f32) -> ValueId {
        self.builder.const_float(value)
    }

    pub fn const_double(&mut self, value: f64) -> ValueId {
        self.builder.const_double(value)
    }

    pub fn const_undef(&mut self, ty: Type) -> ValueId {
        self.builder.const_undef(ty)
    }

    pub fn const_block_address(&mut self, block: BlockId) -> ValueId {
        let func = self.func;
        self.builder.const_block_address(func, block)
    }

    // Instructions.

    pub fn binary(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let ty = self.builder.module.ty(lhs).clone();
        self.push_inst(name, ty, Instruction::Binary { op, lhs, rhs })
    }

    pub fn icmp(&mut self, pred: IntPredicate, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let ty = if self.builder.module.ty(lhs).is_vector() {
            Type::vector(Type::Int(32), self.builder.module.ty(lhs).vector_lanes().unwrap())
        } else {
            Type::Int(1)
        };
        self.push_inst(name, ty, Instruction::ICmp { pred, lhs, rhs })
    }

    pub fn fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> ValueId {
        let ty = if self.builder.module.ty(lhs).is_vector() {
            Type::vector(Type::Int(32), self.builder.module.ty(lhs).vector_lanes().unwrap())
        } else {
            Type::Int(1)
        };
        self.push_inst(name, ty, Instruction::FCmp { pred, lhs, rhs })
    }

    pub fn alloca(&mut self, allocated: Type, align: u32, name: &str) -> ValueId {
        let count = self.builder.const_i32(1);
        self.alloca_array(allocated, count, align, name)
    }

    pub fn alloca_array(
        &mut self,
        allocated: Type,
        count: ValueId,
        align: u32,
        name: &str,
    ) -> ValueId {
        let ty = Type::ptr(allocated.clone());
        self.push_inst(
            name,
            ty,
            Instruction::Alloca {
                allocated,
                count,
                align,
            },
        )
    }

    pub fn load(&mut self, ptr: ValueId, align: u32, name: &str) -> ValueId {
        let ty = self
            .builder
            .module
            .ty(ptr)
            .pointee()
            .expect("load from non-pointer")
            .clone();
        self.push_inst(name, ty, Instruction::Load { ptr, align })
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId, align: u32) {
        self.push_inst("", Type::Void, Instruction::Store { ptr, value, align });
    }

    pub fn gep(&mut self, base: ValueId, indices: &[ValueId], name: &str) -> ValueId {
        let ty = self.gep_result_type(base, indices);
        self.push_inst(
            name,
            ty,
            Instruction::Gep {
                base,
                indices: indices.to_vec(),
            },
        )
    }

    fn gep_result_type(&self, base: ValueId, indices: &[ValueId]) -> Type {
        let module = &self.builder.module;
        let mut cur = module
            .ty(base)
            .pointee()
            .expect("gep base must be a pointer")
            .clone();
        for index in &indices[1..] {
            cur = match cur {
                Type::Struct { fields, .. } => {
                    let field = module
                        .const_int_value(*index)
                        .expect("struct gep index must be constant")
                        as usize;
                    fields[field].clone()
                }
                Type::Array(elem, _) | Type::Vector(elem, _) => *elem,
                other => panic!("cannot index into {}", other),
            };
        }
        Type::ptr(cur)
    }

    pub fn cast(&mut self, op: CastOp, value: ValueId, to: Type, name: &str) -> ValueId {
        self.push_inst(name, to, Instruction::Cast { op, value })
    }

    pub fn select(
        &mut self,
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
        name: &str,
    ) -> ValueId {
        let ty = self.builder.module.ty(then_value).clone();
        self.push_inst(
            name,
            ty,
            Instruction::Select {
                cond,
                then_value,
                else_value,
            },
        )
    }

    pub fn call(&mut self, callee: ValueId, args: &[ValueId], name: &str) -> ValueId {
        let ret = self
            .builder
            .module
            .ty(callee)
            .fn_type()
            .expect("call target must have a function type")
            .ret
            .clone();
        self.push_inst(
            name,
            ret,
            Instruction::Call {
                callee,
                args: args.to_vec(),
            },
        )
    }

    pub fn phi(&mut self, ty: Type, name: &str) -> ValueId {
        self.push_inst(
            name,
            ty,
            Instruction::Phi {
                incoming: Vec::new(),
            },
        )
    }

    pub fn add_incoming(&mut self, phi: ValueId, value: ValueId, block: BlockId) {
        if let ValueKind::Instruction(Instruction::Phi { incoming }) =
            &mut self.builder.module.value_mut(phi).kind
        {
            incoming.push((value, block));
        } else {
            panic!("add_incoming on non-phi value");
        }
    }

    pub fn extract_element(&mut self, vector: ValueId, index: ValueId, name: &str) -> ValueId {
        let ty = self
            .builder
            .module
            .ty(vector)
            .vector_elem()
            .expect("extractelement from non-vector")
            .clone();
        self.push_inst(name, ty, Instruction::ExtractElement { vector, index })
    }

    pub fn insert_element(
        &mut self,
        vector: ValueId,
        element: ValueId,
        index: ValueId,
        name: &str,
    ) -> ValueId {
        let ty = self.builder.module.ty(vector).clone();
        self.push_inst(
            name,
            ty,
            Instruction::InsertElement {
                vector,
                element,
                index,
            },
        )
    }

    pub fn shuffle_vector(&mut self, a: ValueId, b: ValueId, mask: &[i32], name: &str) -> ValueId {
        let elem = self
            .builder
            .module
            .ty(a)
            .vector_elem()
            .expect("shufflevector on non-vector")
            .clone();
        let ty = Type::vector(elem, mask.len() as u32);
        self.push_inst(
            name,
            ty,
            Instruction::ShuffleVector {
                a,
                b,
                mask: mask.to_vec(),
            },
        )
    }

    pub fn atomic_rmw(&mut self, op: RmwOp, ptr: ValueId, value: ValueId, name: &str) -> ValueId {
        let ty = self.builder.module.ty(value).clone();
        self.push_inst(name, ty, Instruction::AtomicRmw { op, ptr, value })
    }

    pub fn fence(&mut self) {
        self.push_inst("", Type::Void, Instruction::Fence);
    }

    // Terminators.

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.set_term(Terminator::Ret(value));
    }

    pub fn br(&mut self, dest: BlockId) {
        self.set_term(Terminator::Br { dest });
    }

    pub fn cond_br(&mut self, cond: ValueId, then_dest: BlockId, else_dest: BlockId) {
        self.set_term(Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
        });
    }

    pub fn switch(&mut self, cond: ValueId, default: BlockId, cases: &[(i64, BlockId)]) {
        self.set_term(Terminator::Switch {
            cond,
            default,
            cases: cases.to_vec(),
        });
    }

    pub fn indirect_br(&mut self, address: ValueId, dests: &[BlockId]) {
        self.set_term(Terminator::IndirectBr {
            address,
            dests: dests.to_vec(),
        });
    }

    pub fn unreachable(&mut self) {
        self.set_term(Terminator::Unreachable);
    }

    /// Finish the function, returning its value id.
    pub fn finish(self) -> ValueId {
        self.func
    }
}
