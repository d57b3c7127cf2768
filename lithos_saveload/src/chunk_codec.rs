//! IR chunk codec.
//!
//! ```text
//!   chunk := bit_vector platform, bool this_has_uses, i32 spill_slots,
//!            bool osr [i32 frame_slots], checkpoint
//!            blocks, checkpoint
//!            constants, checkpoint
//!            u32 count, count × instruction
//!            u32 count, count × shared
//!
//!   instruction := u8 opcode, [operand result], [u32 inputs] operand*,
//!                  operand*, side payload, value ref, metadata,
//!                  bool [environment], bool [pointer map], checkpoint
//! ```
//!
//! Only constants some instruction still references are saved. The pool is
//! rebuilt before any instruction is decoded so constant references resolve.

use lithos_chunk::{
    BailoutId, BitVector, BlockFlags, BlockId, Chunk, CodeStubKind, Constant, ConstantFlags, ConstantValue,
    EnvClosure, EnvValue, Environment, FieldAccess, FrameType, Gap, GapPosition, Instruction, Op, Opcode, Operand,
    OsrInfo, ParallelMove, PointerMap, Targets, Token, ValueFlags, ValueInfo, ValueRef, ValueRepresentation,
};
use lithos_heap::{ShapeId, Value};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::context::{Loader, Saver};
use crate::error::{SaveloadError, SaveloadResult};

// =============================================================================
// Tags
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ConstantTag {
    Integer = 0,
    Double = 1,
    ExternalReference = 2,
    Named = 3,
    LiteralsArray = 4,
    Context = 5,
    CodeStub = 6,
    Object = 7,
}

impl ConstantTag {
    const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ConstantTag::Integer,
            1 => ConstantTag::Double,
            2 => ConstantTag::ExternalReference,
            3 => ConstantTag::Named,
            4 => ConstantTag::LiteralsArray,
            5 => ConstantTag::Context,
            6 => ConstantTag::CodeStub,
            7 => ConstantTag::Object,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ValueRefTag {
    None = 0,
    Constant = 1,
    Value = 2,
}

/// Operation parameters read before the value metadata.
#[derive(Debug)]
enum Side {
    None,
    Gap(Gap),
    Block(BlockId),
    Token(Token),
    Shift(Token, bool),
    Divisor(i32),
    Flag(bool),
    Count(i32),
    LazyEnvironment(Option<Box<Environment>>),
}

// =============================================================================
// Liveness
// =============================================================================

/// Ids of pool constants referenced by any instruction, ascending.
pub fn live_constants(chunk: &Chunk) -> Vec<u32> {
    let mut live = FxHashSet::default();
    for instruction in chunk.instructions() {
        let direct = instruction
            .result
            .iter()
            .chain(instruction.inputs.iter().flatten())
            .chain(instruction.temps.iter().flatten())
            .copied();
        live.extend(direct.filter_map(Operand::constant_id));

        if let Some(gap) = instruction.op.gap() {
            live.extend(gap.operands().filter_map(Operand::constant_id));
        }
        if let Some(env) = &instruction.environment {
            live.extend(env.operands().filter_map(Operand::constant_id));
        }
        if let Op::InstanceOfKnownGlobal {
            lazy_environment: Some(env),
            ..
        } = &instruction.op
        {
            live.extend(env.operands().filter_map(Operand::constant_id));
        }
        live.extend(instruction.value.constant_id());
    }
    let mut ids: Vec<u32> = live.into_iter().collect();
    ids.sort_unstable();
    ids
}

/// `trace_code` line for one instruction. Labels start a new block.
fn code_listing(index: usize, instruction: &Instruction) -> String {
    match &instruction.op {
        Op::Label(gap) => format!("basic block {}\n  [{:02}] {}", gap.block, index, instruction),
        _ => format!("  [{:02}] {}", index, instruction),
    }
}

// =============================================================================
// Save
// =============================================================================

impl<'h> Saver<'h> {
    pub(crate) fn save_chunk(&mut self, chunk: &Chunk) -> SaveloadResult<()> {
        if self.config.trace_code {
            eprintln!("--- saved code for function at {} ---", self.info.start_position(self.heap));
        }

        self.save_bit_vector(&chunk.platform.dehoisted_key_ids);
        self.stream.write_bool(chunk.this_has_uses);
        self.stream.write(chunk.spill_slot_count);
        match chunk.osr {
            Some(osr) => {
                self.stream.write_bool(true);
                self.stream.write(osr.unoptimized_frame_slots);
            }
            None => self.stream.write_bool(false),
        }
        self.stream.checkpoint();

        self.save_blocks(chunk);
        self.save_constants(chunk)?;

        self.stream.write(chunk.instructions().len() as u32);
        for (index, instruction) in chunk.instructions().iter().enumerate() {
            if self.config.trace_code {
                eprintln!("{}", code_listing(index, instruction));
            }
            self.save_instruction(instruction)?;
        }

        self.stream.write(chunk.inlined_functions.len() as u32);
        for &shared in &chunk.inlined_functions {
            self.save_shared(shared)?;
        }
        self.stream.check()
    }

    fn save_bit_vector(&mut self, bits: &BitVector) {
        self.stream.write(bits.len() as u32);
        self.stream.write(bits.words().len() as u32);
        for &word in bits.words() {
            self.stream.write(word);
        }
    }

    fn save_blocks(&mut self, chunk: &Chunk) {
        self.stream.write(chunk.block_count() as u32);
        for (index, block) in chunk.blocks().iter().enumerate() {
            assert_eq!(block.id.index(), index, "block {} stored at position {}", block.id, index);
            if block.id != BlockId::ENTRY {
                self.stream.write(block.entry_bailout_id.0);
            }
            self.stream.write_bool(block.flags.contains(BlockFlags::LOOP_HEADER));
            match block.inline_return_target {
                Some(target) => {
                    self.stream.write_bool(true);
                    self.stream.write(target.0);
                }
                None => self.stream.write_bool(false),
            }
            self.stream.write_bool(block.flags.contains(BlockFlags::REACHABLE));
            self.stream.write_bool(block.flags.contains(BlockFlags::LOOP_SUCCESSOR_DOMINATOR));
            self.stream.write_bool(block.flags.contains(BlockFlags::OSR_ENTRY));
            self.stream.write_bool(block.flags.contains(BlockFlags::ORDERED));
            self.stream.write(block.first_instruction_index);
            self.stream.write(block.last_instruction_index);
        }
        self.stream.checkpoint();
    }

    fn save_constants(&mut self, chunk: &Chunk) -> SaveloadResult<()> {
        let heap = self.heap;
        let live = live_constants(chunk);
        self.stream.write(live.len() as u32);
        for id in live {
            let Some(constant) = chunk.constants.get(id) else {
                panic!("live constant {} is missing from the pool", id);
            };
            self.stream.write(id);
            self.stream.write(constant.representation as u8);
            self.stream.write(constant.flags.bits());
            match &constant.value {
                ConstantValue::Integer(value) => {
                    self.stream.write(ConstantTag::Integer as u8);
                    self.stream.write(*value);
                }
                ConstantValue::Double(value) => {
                    self.stream.write(ConstantTag::Double as u8);
                    self.stream.write(*value);
                }
                ConstantValue::ExternalReference(index) => {
                    self.stream.write(ConstantTag::ExternalReference as u8);
                    self.stream.write(*index);
                }
                ConstantValue::Named {
                    name,
                    is_builtin,
                    object,
                } => {
                    let Some(shape) = heap.shape_of(*object) else {
                        panic!("named constant `{}` has no shape", name);
                    };
                    self.stream.write(ConstantTag::Named as u8);
                    self.stream.write_str(name);
                    self.stream.write_bool(*is_builtin);
                    self.save_shape(shape)?;
                }
                ConstantValue::LiteralsArray { owner } => {
                    self.stream.write(ConstantTag::LiteralsArray as u8);
                    self.save_function(*owner)?;
                }
                ConstantValue::Context { owner } => {
                    self.stream.write(ConstantTag::Context as u8);
                    self.save_function(*owner)?;
                }
                ConstantValue::CodeStub(kind) => {
                    self.stream.write(ConstantTag::CodeStub as u8);
                    self.stream.write(*kind as u8);
                }
                ConstantValue::Object(value) => {
                    self.stream.write(ConstantTag::Object as u8);
                    self.save_object(*value)?;
                }
            }
        }
        self.stream.checkpoint();
        self.stream.check()
    }

    fn save_instruction(&mut self, instruction: &Instruction) -> SaveloadResult<()> {
        assert!(
            instruction.matches_layout(),
            "{} does not match its operand layout",
            instruction.opcode()
        );
        let layout = instruction.layout();
        self.stream.write(instruction.opcode() as u8);
        if layout.result {
            self.save_operand(instruction.result);
        }
        if layout.inputs.is_none() {
            self.stream.write(instruction.inputs.len() as u32);
        }
        for &input in &instruction.inputs {
            self.save_operand(input);
        }
        for &temp in &instruction.temps {
            self.save_operand(temp);
        }

        self.save_side(&instruction.op)?;
        self.save_value_ref(&instruction.value);
        self.save_metadata(&instruction.op)?;

        self.save_optional_environment(instruction.environment.as_deref())?;
        match &instruction.pointer_map {
            Some(map) => {
                self.stream.write_bool(true);
                self.save_pointer_map(map);
            }
            None => self.stream.write_bool(false),
        }
        self.stream.checkpoint();
        self.stream.check()
    }

    fn save_operand(&mut self, operand: Option<Operand>) {
        match operand {
            Some(operand) => {
                self.stream.write_bool(true);
                self.stream.write(operand.bits());
            }
            None => self.stream.write_bool(false),
        }
    }

    fn save_side(&mut self, op: &Op) -> SaveloadResult<()> {
        match op {
            Op::Gap(gap) | Op::Label(gap) => self.save_gap(gap),
            Op::Goto { block } => self.stream.write(block.0),
            Op::BitI { op } | Op::ArithmeticD { op } | Op::ArithmeticT { op } => self.stream.write(*op as u8),
            Op::ShiftI { op, can_deopt } => {
                self.stream.write(*op as u8);
                self.stream.write_bool(*can_deopt);
            }
            Op::ModByPowerOf2I { divisor }
            | Op::ModByConstI { divisor }
            | Op::DivByPowerOf2I { divisor }
            | Op::DivByConstI { divisor }
            | Op::FlooringDivByPowerOf2I { divisor }
            | Op::FlooringDivByConstI { divisor } => self.stream.write(*divisor),
            Op::SmiUntag { needs_check } => self.stream.write_bool(*needs_check),
            Op::Drop { count } => self.stream.write(*count),
            Op::InstanceOfKnownGlobal { lazy_environment, .. } => {
                self.save_optional_environment(lazy_environment.as_deref())?
            }
            _ => {}
        }
        self.stream.check()
    }

    fn save_gap(&mut self, gap: &Gap) {
        self.stream.write(gap.block.0);
        for position in GapPosition::ALL {
            match gap.parallel_move(position) {
                Some(parallel_move) => {
                    self.stream.write_bool(true);
                    self.stream.write(parallel_move.moves().len() as u32);
                    for m in parallel_move.moves() {
                        self.save_operand(m.source);
                        self.save_operand(m.destination);
                    }
                }
                None => self.stream.write_bool(false),
            }
        }
    }

    fn save_value_ref(&mut self, value: &ValueRef) {
        match value {
            ValueRef::None => self.stream.write(ValueRefTag::None as u8),
            ValueRef::Constant(id) => {
                self.stream.write(ValueRefTag::Constant as u8);
                self.stream.write(*id);
            }
            ValueRef::Value(info) => {
                self.stream.write(ValueRefTag::Value as u8);
                self.stream.write(info.id);
                self.stream.write(info.block.0);
                self.stream.write(info.position);
                self.stream.write(info.representation as u8);
                self.stream.write(info.htype);
                self.stream.write(info.flags.bits());
            }
        }
    }

    fn save_metadata(&mut self, op: &Op) -> SaveloadResult<()> {
        match op {
            Op::StackCheck { backwards } => self.stream.write_bool(*backwards),
            Op::Deoptimize { reason } => self.stream.write_str(reason),
            Op::CheckMaps { shapes } => {
                self.stream.write(shapes.len() as u32);
                for &shape in shapes {
                    self.save_shape(shape)?;
                }
            }
            Op::CheckValue { object } => self.save_object(*object)?,
            Op::Branch { targets } => self.save_targets(targets),
            Op::CompareNumericAndBranch { token, targets } => {
                self.stream.write(*token as u8);
                self.save_targets(targets);
            }
            Op::TypeofIsAndBranch { literal, targets } => {
                self.stream.write_str(literal);
                self.save_targets(targets);
            }
            Op::LoadContextSlot { slot_index } | Op::StoreContextSlot { slot_index } => self.stream.write(*slot_index),
            Op::LoadNamedField { access } => self.save_field_access(access)?,
            Op::StoreNamedField { access, transition } => {
                self.save_field_access(access)?;
                match transition {
                    Some(shape) => {
                        self.stream.write_bool(true);
                        self.save_shape(*shape)?;
                    }
                    None => self.stream.write_bool(false),
                }
            }
            Op::LoadNamedGeneric { name } => self.save_name(*name)?,
            Op::LoadGlobalGeneric { name, for_typeof } => {
                self.save_name(*name)?;
                self.stream.write_bool(*for_typeof);
            }
            Op::FunctionLiteral { shared, pretenure } => {
                self.save_shared(*shared)?;
                self.stream.write_bool(*pretenure);
            }
            Op::CallJSFunction { argument_count } | Op::CallWithDescriptor { argument_count } => {
                self.stream.write(*argument_count)
            }
            Op::CallRuntime {
                function,
                argument_count,
            } => {
                self.stream.write(*function);
                self.stream.write(*argument_count);
            }
            Op::InstanceOfKnownGlobal { function, .. } => self.save_function(*function)?,
            _ => {}
        }
        self.stream.check()
    }

    fn save_targets(&mut self, targets: &Targets) {
        self.stream.write(targets.if_true.0);
        self.stream.write(targets.if_false.0);
    }

    fn save_field_access(&mut self, access: &FieldAccess) -> SaveloadResult<()> {
        self.stream.write(access.offset);
        self.stream.write_bool(access.in_object);
        self.stream.write(access.representation as u8);
        match access.name {
            Some(name) => {
                self.stream.write_bool(true);
                self.save_name(name)
            }
            None => {
                self.stream.write_bool(false);
                self.stream.check()
            }
        }
    }

    fn save_optional_environment(&mut self, env: Option<&Environment>) -> SaveloadResult<()> {
        match env {
            Some(env) => {
                self.stream.write_bool(true);
                self.save_environment(env)
            }
            None => {
                self.stream.write_bool(false);
                self.stream.check()
            }
        }
    }

    /// Outer frames first.
    fn save_environment(&mut self, env: &Environment) -> SaveloadResult<()> {
        self.save_optional_environment(env.outer.as_deref())?;
        self.stream.write(env.frame_type as u8);
        self.stream.write(env.arguments_stack_height);
        self.stream.write(env.bailout_id.0);
        self.stream.write(env.translation_size);
        self.stream.write(env.parameter_count);
        self.stream.write_bool(env.has_been_used);
        match env.closure {
            EnvClosure::Compiled => self.stream.write_bool(true),
            EnvClosure::Function(function) => {
                self.stream.write_bool(false);
                self.save_function(function)?;
            }
        }
        self.stream.write(env.values.len() as u32);
        for value in &env.values {
            self.save_operand(value.operand);
            self.stream.write_bool(value.is_tagged);
            self.stream.write_bool(value.is_uint32);
        }
        self.stream.write(env.object_mapping.len() as u32);
        for &word in &env.object_mapping {
            self.stream.write(word);
        }
        self.stream.check()
    }

    fn save_pointer_map(&mut self, map: &PointerMap) {
        self.stream.write(map.pointer_operands().len() as u32);
        for &operand in map.pointer_operands() {
            self.save_operand(operand);
        }
        self.stream.write(map.untagged_operands().len() as u32);
        for &operand in map.untagged_operands() {
            self.save_operand(operand);
        }
        self.stream.write(map.position);
    }
}

// =============================================================================
// Load
// =============================================================================

impl<'a, 'h> Loader<'a, 'h> {
    pub(crate) fn load_chunk(&mut self) -> SaveloadResult<Chunk> {
        if self.config.trace_code {
            eprintln!("--- loaded code for function at {} ---", self.info.start_position(self.heap));
        }

        let mut chunk = Chunk::new();
        chunk.platform.dehoisted_key_ids = self.load_bit_vector()?;
        chunk.this_has_uses = self.stream.read_bool()?;
        chunk.spill_slot_count = self.stream.read::<i32>()?;
        if self.stream.read_bool()? {
            chunk.osr = Some(OsrInfo {
                unoptimized_frame_slots: self.stream.read::<i32>()?,
            });
        }
        self.stream.checkpoint()?;

        self.load_blocks(&mut chunk)?;
        self.load_constants(&mut chunk)?;

        let count = self.stream.read::<u32>()?;
        for index in 0..count {
            let instruction = self.load_instruction(&chunk)?;
            if self.config.trace_code {
                eprintln!("{}", code_listing(index as usize, &instruction));
            }
            chunk.push_instruction(instruction);
        }

        let count = self.stream.read::<u32>()?;
        for _ in 0..count {
            let shared = self.load_shared()?;
            if !self.heap.ensure_deopt_support(shared) {
                trace_saveload!(self.config, "inlined function {} has no deoptimization support", shared);
                return self.fail(SaveloadError::NoDeoptSupport);
            }
            chunk.inlined_functions.push(shared);
        }
        Ok(chunk)
    }

    fn load_bit_vector(&mut self) -> SaveloadResult<BitVector> {
        let length = self.stream.read::<u32>()? as usize;
        let count = self.stream.read::<u32>()?;
        let mut words = Vec::new();
        for _ in 0..count {
            words.push(self.stream.read::<u64>()?);
        }
        match BitVector::from_words(length, words) {
            Some(bits) => Ok(bits),
            None => panic!("malformed bit vector of {} bits and {} words", length, count),
        }
    }

    fn load_blocks(&mut self, chunk: &mut Chunk) -> SaveloadResult<()> {
        let count = self.stream.read::<u32>()?;
        assert!(count > 0, "chunk without an entry block");

        // Return targets may point forward.
        let mut links = Vec::new();
        for index in 0..count {
            let id = if index == 0 { BlockId::ENTRY } else { chunk.new_block() };
            let bailout = if index == 0 {
                BailoutId::NONE
            } else {
                BailoutId(self.stream.read::<i32>()?)
            };
            let mut flags = BlockFlags::empty();
            flags.set(BlockFlags::LOOP_HEADER, self.stream.read_bool()?);
            if self.stream.read_bool()? {
                links.push((id, BlockId(self.stream.read::<u32>()?)));
            }
            flags.set(BlockFlags::REACHABLE, self.stream.read_bool()?);
            flags.set(BlockFlags::LOOP_SUCCESSOR_DOMINATOR, self.stream.read_bool()?);
            flags.set(BlockFlags::OSR_ENTRY, self.stream.read_bool()?);
            flags.set(BlockFlags::ORDERED, self.stream.read_bool()?);
            let first = self.stream.read::<i32>()?;
            let last = self.stream.read::<i32>()?;

            let Some(block) = chunk.block_mut(id) else {
                unreachable!("block {} was just created", id);
            };
            block.entry_bailout_id = bailout;
            block.flags = flags;
            block.first_instruction_index = first;
            block.last_instruction_index = last;
        }

        for (from, to) in links {
            let block_count = chunk.block_count();
            assert!(
                to.index() < block_count,
                "{} returns to {} outside {} blocks",
                from,
                to,
                block_count
            );
            if let Some(block) = chunk.block_mut(from) {
                block.inline_return_target = Some(to);
            }
        }
        self.stream.checkpoint()
    }

    fn load_constants(&mut self, chunk: &mut Chunk) -> SaveloadResult<()> {
        let count = self.stream.read::<u32>()?;
        for _ in 0..count {
            let id = self.stream.read::<u32>()?;
            let raw = self.stream.read::<u8>()?;
            let Some(representation) = ValueRepresentation::from_u8(raw) else {
                panic!("unknown representation {}", raw);
            };
            let raw = self.stream.read::<u8>()?;
            let Some(flags) = ConstantFlags::from_bits(raw) else {
                panic!("unknown constant flags {:#x}", raw);
            };
            let raw = self.stream.read::<u8>()?;
            let Some(tag) = ConstantTag::from_u8(raw) else {
                panic!("unknown constant kind {}", raw);
            };
            let value = match tag {
                ConstantTag::Integer => ConstantValue::Integer(self.stream.read::<i32>()?),
                ConstantTag::Double => ConstantValue::Double(self.stream.read::<f64>()?),
                ConstantTag::ExternalReference => ConstantValue::ExternalReference(self.stream.read::<u32>()?),
                ConstantTag::Named => self.load_named_constant()?,
                ConstantTag::LiteralsArray => {
                    let owner = self.load_function()?;
                    self.heap.ensure_literals(owner);
                    ConstantValue::LiteralsArray { owner }
                }
                ConstantTag::Context => ConstantValue::Context {
                    owner: self.load_function()?,
                },
                ConstantTag::CodeStub => {
                    let raw = self.stream.read::<u8>()?;
                    match CodeStubKind::from_u8(raw) {
                        Some(kind) => ConstantValue::CodeStub(kind),
                        None => panic!("unknown code stub {}", raw),
                    }
                }
                ConstantTag::Object => ConstantValue::Object(self.load_object()?),
            };
            chunk.add_constant(
                id,
                Constant {
                    representation,
                    flags,
                    value,
                },
            );
        }
        self.stream.checkpoint()
    }

    /// A global or builtins property whose layout must match the saved one.
    fn load_named_constant(&mut self) -> SaveloadResult<ConstantValue> {
        let name = self.stream.read_string()?;
        let is_builtin = self.stream.read_bool()?;
        let shape = self.load_shape()?;

        let (namespace, value) = if is_builtin {
            ("builtins object", self.heap.builtins().get(&name))
        } else {
            ("global object", self.heap.global().get(&name))
        };
        let Some(object) = value.and_then(Value::as_object) else {
            return self.fail(SaveloadError::NameNotFound { namespace, name });
        };
        if self.heap.shape_of(object) != Some(shape) {
            trace_saveload!(self.config, "layout of `{}` changed since it was saved", name);
            return self.fail(SaveloadError::LayoutChanged { name });
        }
        Ok(ConstantValue::Named {
            name,
            is_builtin,
            object,
        })
    }

    fn load_instruction(&mut self, chunk: &Chunk) -> SaveloadResult<Instruction> {
        let raw = self.stream.read::<u8>()?;
        let Some(opcode) = Opcode::from_u8(raw) else {
            panic!("unknown opcode {}", raw);
        };
        let layout = opcode.layout();
        let result = if layout.result { self.load_operand()? } else { None };
        let input_count = match layout.inputs {
            Some(count) => count,
            None => self.stream.read::<u32>()? as usize,
        };
        let mut inputs = SmallVec::new();
        for _ in 0..input_count {
            inputs.push(self.load_operand()?);
        }
        let mut temps = SmallVec::new();
        for _ in 0..layout.temps {
            temps.push(self.load_operand()?);
        }

        let side = self.load_side(opcode, chunk)?;
        let value = self.load_value_ref(chunk)?;
        let op = self.load_op(opcode, side, chunk)?;

        let environment = self.load_optional_environment()?;
        let pointer_map = if self.stream.read_bool()? {
            Some(self.load_pointer_map()?)
        } else {
            None
        };
        self.stream.checkpoint()?;

        Ok(Instruction {
            op,
            result,
            inputs,
            temps,
            value,
            environment,
            pointer_map,
        })
    }

    fn load_operand(&mut self) -> SaveloadResult<Option<Operand>> {
        if !self.stream.read_bool()? {
            return Ok(None);
        }
        let bits = self.stream.read::<u32>()?;
        match Operand::from_bits(bits) {
            Some(operand) => Ok(Some(operand)),
            None => panic!("malformed operand {:#x}", bits),
        }
    }

    fn load_block_id(&mut self, chunk: &Chunk) -> SaveloadResult<BlockId> {
        let id = BlockId(self.stream.read::<u32>()?);
        assert!(
            id.index() < chunk.block_count(),
            "{} outside {} blocks",
            id,
            chunk.block_count()
        );
        Ok(id)
    }

    fn load_token(&mut self) -> SaveloadResult<Token> {
        let raw = self.stream.read::<u8>()?;
        match Token::from_u8(raw) {
            Some(token) => Ok(token),
            None => panic!("unknown token {}", raw),
        }
    }

    fn load_side(&mut self, opcode: Opcode, chunk: &Chunk) -> SaveloadResult<Side> {
        Ok(match opcode {
            Opcode::Gap | Opcode::Label => Side::Gap(self.load_gap(chunk)?),
            Opcode::Goto => Side::Block(self.load_block_id(chunk)?),
            Opcode::BitI | Opcode::ArithmeticD | Opcode::ArithmeticT => Side::Token(self.load_token()?),
            Opcode::ShiftI => {
                let token = self.load_token()?;
                Side::Shift(token, self.stream.read_bool()?)
            }
            Opcode::ModByPowerOf2I
            | Opcode::ModByConstI
            | Opcode::DivByPowerOf2I
            | Opcode::DivByConstI
            | Opcode::FlooringDivByPowerOf2I
            | Opcode::FlooringDivByConstI => Side::Divisor(self.stream.read::<i32>()?),
            Opcode::SmiUntag => Side::Flag(self.stream.read_bool()?),
            Opcode::Drop => Side::Count(self.stream.read::<i32>()?),
            Opcode::InstanceOfKnownGlobal => Side::LazyEnvironment(self.load_optional_environment()?),
            _ => Side::None,
        })
    }

    fn load_gap(&mut self, chunk: &Chunk) -> SaveloadResult<Gap> {
        let mut gap = Gap::new(self.load_block_id(chunk)?);
        for position in GapPosition::ALL {
            if !self.stream.read_bool()? {
                continue;
            }
            let count = self.stream.read::<u32>()?;
            let mut parallel_move = ParallelMove::new();
            for _ in 0..count {
                let source = self.load_operand()?;
                let destination = self.load_operand()?;
                parallel_move.add_move(source, destination);
            }
            gap.set_parallel_move(position, Some(parallel_move));
        }
        Ok(gap)
    }

    fn load_value_ref(&mut self, chunk: &Chunk) -> SaveloadResult<ValueRef> {
        let raw = self.stream.read::<u8>()?;
        Ok(match raw {
            r if r == ValueRefTag::None as u8 => ValueRef::None,
            r if r == ValueRefTag::Constant as u8 => {
                let id = self.stream.read::<u32>()?;
                assert!(chunk.constants.contains(id), "value refers to unsaved constant {}", id);
                ValueRef::Constant(id)
            }
            r if r == ValueRefTag::Value as u8 => {
                let id = self.stream.read::<u32>()?;
                let block = self.load_block_id(chunk)?;
                let position = self.stream.read::<i32>()?;
                let raw = self.stream.read::<u8>()?;
                let Some(representation) = ValueRepresentation::from_u8(raw) else {
                    panic!("unknown representation {}", raw);
                };
                let htype = self.stream.read::<u16>()?;
                let raw = self.stream.read::<u32>()?;
                let Some(flags) = ValueFlags::from_bits(raw) else {
                    panic!("unknown value flags {:#x}", raw);
                };
                ValueRef::Value(ValueInfo {
                    id,
                    block,
                    position,
                    representation,
                    htype,
                    flags,
                })
            }
            other => panic!("unknown value tag {}", other),
        })
    }

    /// The [`Op`] for `opcode`, reading its metadata payload.
    fn load_op(&mut self, opcode: Opcode, side: Side, chunk: &Chunk) -> SaveloadResult<Op> {
        Ok(match (opcode, side) {
            (Opcode::Gap, Side::Gap(gap)) => Op::Gap(gap),
            (Opcode::Label, Side::Gap(gap)) => Op::Label(gap),
            (Opcode::Goto, Side::Block(block)) => Op::Goto { block },
            (Opcode::Parameter, _) => Op::Parameter,
            (Opcode::Context, _) => Op::Context,
            (Opcode::UnknownOsrValue, _) => Op::UnknownOsrValue,
            (Opcode::OsrEntry, _) => Op::OsrEntry,
            (Opcode::StackCheck, _) => Op::StackCheck {
                backwards: self.stream.read_bool()?,
            },
            (Opcode::LazyBailout, _) => Op::LazyBailout,
            (Opcode::Deoptimize, _) => Op::Deoptimize {
                reason: self.stream.read_string()?,
            },
            (Opcode::ConstantI, _) => Op::ConstantI,
            (Opcode::ConstantS, _) => Op::ConstantS,
            (Opcode::ConstantD, _) => Op::ConstantD,
            (Opcode::ConstantT, _) => Op::ConstantT,
            (Opcode::ConstantE, _) => Op::ConstantE,
            (Opcode::AddI, _) => Op::AddI,
            (Opcode::SubI, _) => Op::SubI,
            (Opcode::MulI, _) => Op::MulI,
            (Opcode::BitI, Side::Token(op)) => Op::BitI { op },
            (Opcode::ShiftI, Side::Shift(op, can_deopt)) => Op::ShiftI { op, can_deopt },
            (Opcode::ModByPowerOf2I, Side::Divisor(divisor)) => Op::ModByPowerOf2I { divisor },
            (Opcode::ModByConstI, Side::Divisor(divisor)) => Op::ModByConstI { divisor },
            (Opcode::DivByPowerOf2I, Side::Divisor(divisor)) => Op::DivByPowerOf2I { divisor },
            (Opcode::DivByConstI, Side::Divisor(divisor)) => Op::DivByConstI { divisor },
            (Opcode::FlooringDivByPowerOf2I, Side::Divisor(divisor)) => Op::FlooringDivByPowerOf2I { divisor },
            (Opcode::FlooringDivByConstI, Side::Divisor(divisor)) => Op::FlooringDivByConstI { divisor },
            (Opcode::ArithmeticD, Side::Token(op)) => Op::ArithmeticD { op },
            (Opcode::ArithmeticT, Side::Token(op)) => Op::ArithmeticT { op },
            (Opcode::SmiTag, _) => Op::SmiTag,
            (Opcode::SmiUntag, Side::Flag(needs_check)) => Op::SmiUntag { needs_check },
            (Opcode::NumberTagD, _) => Op::NumberTagD,
            (Opcode::TaggedToI, _) => Op::TaggedToI,
            (Opcode::CheckSmi, _) => Op::CheckSmi,
            (Opcode::CheckNonSmi, _) => Op::CheckNonSmi,
            (Opcode::CheckMaps, _) => {
                let count = self.stream.read::<u32>()?;
                let mut shapes: SmallVec<[ShapeId; 2]> = SmallVec::new();
                for _ in 0..count {
                    shapes.push(self.load_shape()?);
                }
                Op::CheckMaps { shapes }
            }
            (Opcode::CheckValue, _) => Op::CheckValue {
                object: self.load_object()?,
            },
            (Opcode::Branch, _) => Op::Branch {
                targets: self.load_targets(chunk)?,
            },
            (Opcode::CompareNumericAndBranch, _) => {
                let token = self.load_token()?;
                Op::CompareNumericAndBranch {
                    token,
                    targets: self.load_targets(chunk)?,
                }
            }
            (Opcode::TypeofIsAndBranch, _) => {
                let literal = self.stream.read_string()?;
                Op::TypeofIsAndBranch {
                    literal,
                    targets: self.load_targets(chunk)?,
                }
            }
            (Opcode::LoadContextSlot, _) => Op::LoadContextSlot {
                slot_index: self.stream.read::<i32>()?,
            },
            (Opcode::StoreContextSlot, _) => Op::StoreContextSlot {
                slot_index: self.stream.read::<i32>()?,
            },
            (Opcode::LoadNamedField, _) => Op::LoadNamedField {
                access: self.load_field_access()?,
            },
            (Opcode::StoreNamedField, _) => {
                let access = self.load_field_access()?;
                let transition = if self.stream.read_bool()? {
                    Some(self.load_shape()?)
                } else {
                    None
                };
                Op::StoreNamedField { access, transition }
            }
            (Opcode::LoadNamedGeneric, _) => Op::LoadNamedGeneric {
                name: self.load_name()?,
            },
            (Opcode::LoadGlobalGeneric, _) => {
                let name = self.load_name()?;
                Op::LoadGlobalGeneric {
                    name,
                    for_typeof: self.stream.read_bool()?,
                }
            }
            (Opcode::FunctionLiteral, _) => {
                let shared = self.load_shared()?;
                Op::FunctionLiteral {
                    shared,
                    pretenure: self.stream.read_bool()?,
                }
            }
            (Opcode::CallJSFunction, _) => Op::CallJSFunction {
                argument_count: self.stream.read::<i32>()?,
            },
            (Opcode::CallWithDescriptor, _) => Op::CallWithDescriptor {
                argument_count: self.stream.read::<i32>()?,
            },
            (Opcode::CallRuntime, _) => {
                let function = self.stream.read::<u16>()?;
                Op::CallRuntime {
                    function,
                    argument_count: self.stream.read::<i32>()?,
                }
            }
            (Opcode::InstanceOfKnownGlobal, Side::LazyEnvironment(lazy_environment)) => Op::InstanceOfKnownGlobal {
                function: self.load_function()?,
                lazy_environment,
            },
            (Opcode::PushArgument, _) => Op::PushArgument,
            (Opcode::Drop, Side::Count(count)) => Op::Drop { count },
            (Opcode::Return, _) => Op::Return,
            (opcode, side) => unreachable!("{} decoded with side payload {:?}", opcode, side),
        })
    }

    fn load_targets(&mut self, chunk: &Chunk) -> SaveloadResult<Targets> {
        let if_true = self.load_block_id(chunk)?;
        let if_false = self.load_block_id(chunk)?;
        Ok(Targets { if_true, if_false })
    }

    fn load_field_access(&mut self) -> SaveloadResult<FieldAccess> {
        let offset = self.stream.read::<i32>()?;
        let in_object = self.stream.read_bool()?;
        let raw = self.stream.read::<u8>()?;
        let Some(representation) = ValueRepresentation::from_u8(raw) else {
            panic!("unknown representation {}", raw);
        };
        let name = if self.stream.read_bool()? {
            Some(self.load_name()?)
        } else {
            None
        };
        Ok(FieldAccess {
            offset,
            in_object,
            representation,
            name,
        })
    }

    fn load_optional_environment(&mut self) -> SaveloadResult<Option<Box<Environment>>> {
        if self.stream.read_bool()? {
            Ok(Some(Box::new(self.load_environment()?)))
        } else {
            Ok(None)
        }
    }

    fn load_environment(&mut self) -> SaveloadResult<Environment> {
        let outer = self.load_optional_environment()?;
        let raw = self.stream.read::<u8>()?;
        let Some(frame_type) = FrameType::from_u8(raw) else {
            panic!("unknown frame type {}", raw);
        };
        let arguments_stack_height = self.stream.read::<i32>()?;
        let bailout_id = BailoutId(self.stream.read::<i32>()?);
        let translation_size = self.stream.read::<i32>()?;
        let parameter_count = self.stream.read::<i32>()?;
        let has_been_used = self.stream.read_bool()?;
        let closure = if self.stream.read_bool()? {
            EnvClosure::Compiled
        } else {
            EnvClosure::Function(self.load_function()?)
        };

        let count = self.stream.read::<u32>()?;
        let mut values = SmallVec::new();
        for _ in 0..count {
            let operand = self.load_operand()?;
            let is_tagged = self.stream.read_bool()?;
            let is_uint32 = self.stream.read_bool()?;
            values.push(EnvValue {
                operand,
                is_tagged,
                is_uint32,
            });
        }
        let count = self.stream.read::<u32>()?;
        let mut object_mapping = Vec::new();
        for _ in 0..count {
            object_mapping.push(self.stream.read::<u32>()?);
        }

        Ok(Environment {
            outer,
            frame_type,
            arguments_stack_height,
            bailout_id,
            translation_size,
            parameter_count,
            has_been_used,
            closure,
            values,
            object_mapping,
        })
    }

    fn load_pointer_map(&mut self) -> SaveloadResult<PointerMap> {
        let mut map = PointerMap::default();
        let count = self.stream.read::<u32>()?;
        for _ in 0..count {
            map.push_pointer_slot(self.load_operand()?);
        }
        let count = self.stream.read::<u32>()?;
        for _ in 0..count {
            map.push_untagged_slot(self.load_operand()?);
        }
        map.position = self.stream.read::<i32>()?;
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SaveloadConfig;
    use crate::context::CompilationInfo;
    use crate::stream::Writer;
    use lithos_heap::{BuiltinFunctionId, Heap};

    fn info(heap: &Heap) -> CompilationInfo {
        CompilationInfo::new(heap.builtin_function(BuiltinFunctionId::MathAbs).unwrap())
    }

    fn round_trip(chunk: &Chunk) -> Chunk {
        let config = SaveloadConfig::default().with_checkpoints(true);
        let heap = Heap::new();
        let mut saver = Saver::new(&heap, info(&heap), config);
        let result = saver.save_chunk(chunk);
        let bytes = saver.finish(result).unwrap();

        let mut dest = Heap::new();
        let info = info(&dest);
        let mut loader = Loader::new(&bytes, &mut dest, info, config);
        let result = loader.load_chunk();
        loader.finish(result).unwrap()
    }

    // -------------------------------------------------------------------------
    // Liveness
    // -------------------------------------------------------------------------

    #[test]
    fn test_live_constants_skip_unreferenced() {
        let mut chunk = Chunk::new();
        chunk.add_constant(1, Constant::integer(1));
        chunk.add_constant(2, Constant::integer(2));
        chunk.add_constant(3, Constant::integer(3));
        chunk.emit(
            BlockId::ENTRY,
            Instruction::new(Op::AddI)
                .with_result(Operand::register(0))
                .with_inputs([Operand::constant(3), Operand::register(1)]),
        );
        chunk.emit(
            BlockId::ENTRY,
            Instruction::new(Op::ConstantI)
                .with_result(Operand::register(2))
                .with_value(ValueRef::Constant(1)),
        );
        assert_eq!(live_constants(&chunk), vec![1, 3]);
    }

    #[test]
    fn test_live_constants_in_gap_moves() {
        let mut chunk = Chunk::new();
        chunk.add_constant(8, Constant::double(0.5));
        let mut gap = Gap::new(BlockId::ENTRY);
        gap.get_or_create_parallel_move(GapPosition::Start)
            .add_move(Some(Operand::constant(8)), Some(Operand::double_register(0)));
        chunk.emit(BlockId::ENTRY, Instruction::new(Op::Label(gap)));
        assert_eq!(live_constants(&chunk), vec![8]);
    }

    #[test]
    fn test_code_listing_marks_blocks() {
        let label = Instruction::new(Op::Label(Gap::new(BlockId(2))));
        let listing = code_listing(4, &label);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "basic block B2");
        assert!(lines[1].starts_with("  [04] "));

        let goto = Instruction::new(Op::Goto { block: BlockId(2) });
        assert!(!code_listing(5, &goto).contains("basic block"));
    }

    // -------------------------------------------------------------------------
    // Round trips
    // -------------------------------------------------------------------------

    #[test]
    fn test_header_round_trip() {
        let mut chunk = Chunk::new();
        chunk.platform.dehoisted_key_ids.add(3);
        chunk.platform.dehoisted_key_ids.add(70);
        chunk.this_has_uses = true;
        chunk.spill_slot_count = 5;
        chunk.osr = Some(OsrInfo {
            unoptimized_frame_slots: 9,
        });
        chunk.emit(BlockId::ENTRY, Instruction::new(Op::Return).with_inputs([Operand::register(0); 3]));

        let loaded = round_trip(&chunk);
        assert_eq!(loaded.platform, chunk.platform);
        assert!(loaded.this_has_uses);
        assert_eq!(loaded.spill_slot_count, 5);
        assert_eq!(loaded.osr, chunk.osr);
        assert_eq!(loaded.instructions(), chunk.instructions());
    }

    #[test]
    fn test_side_payloads_round_trip() {
        let mut chunk = Chunk::new();
        let exit = chunk.new_block();
        let r = Operand::register;
        let instructions = [
            Instruction::new(Op::BitI { op: Token::BitXor })
                .with_result(r(0))
                .with_inputs([r(0), r(1)]),
            Instruction::new(Op::ShiftI {
                op: Token::Shr,
                can_deopt: true,
            })
            .with_result(r(0))
            .with_inputs([r(0), r(1)]),
            Instruction::new(Op::FlooringDivByConstI { divisor: -7 })
                .with_result(r(0))
                .with_inputs([r(0)])
                .with_temps([r(2), r(3), r(4)]),
            Instruction::new(Op::SmiUntag { needs_check: true })
                .with_result(r(0))
                .with_inputs([r(0)]),
            Instruction::new(Op::CompareNumericAndBranch {
                token: Token::Lte,
                targets: Targets {
                    if_true: exit,
                    if_false: BlockId::ENTRY,
                },
            })
            .with_inputs([r(0), r(1)]),
            Instruction::new(Op::CallWithDescriptor { argument_count: 2 })
                .with_result(r(0))
                .with_inputs([r(1), r(2), r(3), r(4), r(5)]),
            Instruction::new(Op::Deoptimize {
                reason: "not a heap number".into(),
            }),
            Instruction::new(Op::Drop { count: 2 }),
            Instruction::new(Op::Goto { block: exit }),
        ];
        for instruction in instructions {
            chunk.emit(BlockId::ENTRY, instruction);
        }

        let loaded = round_trip(&chunk);
        assert_eq!(loaded.instructions(), chunk.instructions());
        assert_eq!(loaded.blocks(), chunk.blocks());
    }

    #[test]
    fn test_environment_and_pointer_map_round_trip() {
        let mut chunk = Chunk::new();
        chunk.add_constant(4, Constant::integer(42));

        let mut outer = Environment::new(EnvClosure::Compiled, FrameType::JsFunction, BailoutId(12));
        outer.push_value(EnvValue::tagged(Operand::constant(4)));
        outer.parameter_count = 1;
        let mut inner = Environment::new(EnvClosure::Compiled, FrameType::ArgumentsAdaptor, BailoutId(3));
        inner.push_value(EnvValue {
            operand: Some(Operand::stack_slot(2)),
            is_tagged: false,
            is_uint32: true,
        });
        inner.object_mapping = vec![7, 8];
        let mut map = PointerMap::new(33);
        map.record_pointer(Operand::stack_slot(1));
        map.push_untagged_slot(None);

        chunk.emit(
            BlockId::ENTRY,
            Instruction::new(Op::StackCheck { backwards: true })
                .with_inputs([Operand::register(0)])
                .with_environment(inner.with_outer(outer))
                .with_pointer_map(map),
        );

        let loaded = round_trip(&chunk);
        assert_eq!(loaded.instructions(), chunk.instructions());
        assert_eq!(loaded.constants.ids(), vec![4]);
    }

    // -------------------------------------------------------------------------
    // Fatal conditions
    // -------------------------------------------------------------------------

    fn empty_prefix() -> Writer {
        let mut out = Writer::new(false);
        out.write(0u32);
        out.write(0u32);
        out.write_bool(false);
        out.write(0i32);
        out.write_bool(false);
        out.write(1u32);
        for flag in [false, false, true, false, false, false] {
            out.write_bool(flag);
        }
        out.write(-1i32);
        out.write(-1i32);
        out.write(0u32);
        out
    }

    fn load_raw(bytes: &[u8]) -> SaveloadResult<Chunk> {
        let mut heap = Heap::new();
        let info = info(&heap);
        let mut loader = Loader::new(bytes, &mut heap, info, SaveloadConfig::default().with_checkpoints(false));
        let result = loader.load_chunk();
        loader.finish(result)
    }

    #[test]
    #[should_panic(expected = "unknown opcode")]
    fn test_unknown_opcode_is_fatal() {
        let mut out = empty_prefix();
        out.write(1u32);
        out.write(200u8);
        let _ = load_raw(&out.finish().unwrap());
    }

    #[test]
    #[should_panic(expected = "outside 1 blocks")]
    fn test_goto_to_missing_block_is_fatal() {
        let mut out = empty_prefix();
        out.write(1u32);
        out.write(Opcode::Goto as u8);
        out.write(4u32);
        let _ = load_raw(&out.finish().unwrap());
    }

    #[test]
    fn test_truncated_input_fails() {
        let mut out = empty_prefix();
        out.write(3u32);
        let err = load_raw(&out.finish().unwrap()).unwrap_err();
        assert!(matches!(err, SaveloadError::UnexpectedEnd { .. }));
    }
}
