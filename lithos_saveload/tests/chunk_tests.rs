//! Whole-chunk save/load tests.
//!
//! Coverage:
//! - Block layout, opcodes and an object constant survive a transfer
//! - Constants reachable only from outer deoptimization frames are kept
//! - Recoverable failures report the first reason
//! - Inlined units must support deoptimization in the destination
//! - Malformed input is fatal

use lithos_chunk::{
    BailoutId, BlockFlags, BlockId, Chunk, Constant, ConstantValue, EnvClosure, EnvValue, Environment, FrameType,
    Gap, GapPosition, Instruction, Op, Opcode, Operand, ValueRef,
};
use lithos_heap::{
    BuiltinFunctionId, Heap, ObjectId, PropertyAttributes, SharedFunctionInfo, Value,
};
use lithos_saveload::{
    live_constants, load_chunk, save_chunk, CompilationInfo, Reader, SaveloadConfig, SaveloadError, Status, Writer,
};

fn config() -> SaveloadConfig {
    SaveloadConfig::default().with_checkpoints(true)
}

/// `function outer() { function inner() {} }`, compiled for `outer`.
struct Script {
    heap: Heap,
    outer: ObjectId,
    inner: ObjectId,
}

impl Script {
    fn new() -> Self {
        let mut heap = Heap::new();
        let source = "function outer() { function inner() {} }";
        let script = heap.add_script("units.js", source);
        let native = heap.native_context();
        let outer = heap.new_script_function(script, "outer", 14, 40, native, None);
        let outer_shared = heap.function(outer).unwrap().shared;
        let mut inner = SharedFunctionInfo::from_script("inner", script, 33, 38);
        inner.outer = Some(outer_shared);
        let inner = heap.new_shared_function(inner);
        Script { heap, outer, inner }
    }

    fn info(&self) -> CompilationInfo {
        CompilationInfo::new(self.outer)
    }

    /// A closure over the inner unit, created inside a function context.
    fn inner_closure(&mut self) -> ObjectId {
        let native = self.heap.native_context();
        let context = self.heap.new_function_context(native, Some(self.outer), Vec::new());
        self.heap.new_closure(self.inner, context)
    }
}

fn math(heap: &Heap) -> ObjectId {
    heap.lookup_global("Math").and_then(|v| v.as_object()).unwrap()
}

// =============================================================================
// End to End
// =============================================================================

#[test]
fn test_three_block_chunk_round_trip() {
    let mut source = Script::new();
    let point = source.heap.new_plain_object(&[("x", Value::Smi(1)), ("y", Value::Smi(2))]);

    let mut chunk = Chunk::new();
    let header = chunk.new_block();
    let exit = chunk.new_block();
    {
        let block = chunk.block_mut(header).unwrap();
        block.flags |= BlockFlags::LOOP_HEADER;
        block.entry_bailout_id = BailoutId(4);
    }
    {
        let block = chunk.block_mut(exit).unwrap();
        block.inline_return_target = Some(header);
        block.entry_bailout_id = BailoutId(9);
    }
    chunk.add_constant(1, Constant::object(Value::Object(point)));

    let r = Operand::register;
    chunk.emit(BlockId::ENTRY, Instruction::new(Op::Label(Gap::new(BlockId::ENTRY))));
    chunk.emit(
        BlockId::ENTRY,
        Instruction::new(Op::ConstantT)
            .with_result(r(0))
            .with_value(ValueRef::Constant(1)),
    );
    chunk.emit(BlockId::ENTRY, Instruction::new(Op::Goto { block: header }));
    chunk.emit(
        header,
        Instruction::new(Op::StackCheck { backwards: true }).with_inputs([r(1)]),
    );
    chunk.emit(exit, Instruction::new(Op::Return).with_inputs([r(0), r(1), r(2)]));

    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();

    let mut dest = Script::new();
    let info = dest.info();
    let loaded = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap();

    assert_eq!(loaded.blocks(), chunk.blocks());
    assert!(loaded.blocks()[1].is_loop_header());
    assert_eq!(loaded.blocks()[2].inline_return_target, Some(header));

    let opcodes: Vec<Opcode> = loaded.instructions().iter().map(Instruction::opcode).collect();
    assert_eq!(
        opcodes,
        [Opcode::Label, Opcode::ConstantT, Opcode::Goto, Opcode::StackCheck, Opcode::Return]
    );

    let Some(ConstantValue::Object(Value::Object(object))) = loaded.lookup_constant(1).map(|c| c.value.clone()) else {
        panic!("constant 1 did not load as an object");
    };
    let object = dest.heap.js_object(object).unwrap();
    let shape = dest.heap.shape(object.shape);
    assert_eq!(shape.own_descriptor_count(), 2);
    let saved_shape = source.heap.shape(source.heap.shape_of(point).unwrap());
    for (saved, rebuilt) in saved_shape.descriptors().iter().zip(shape.descriptors()) {
        assert_eq!(saved.value, rebuilt.value);
        assert_eq!(saved.details, rebuilt.details);
    }
    assert_eq!(dest.heap.fixed_array(object.properties), Some(&[Value::Smi(1), Value::Smi(2)][..]));
}

// =============================================================================
// Constant Liveness
// =============================================================================

#[test]
fn test_constant_in_outer_environment_survives() {
    let source = Script::new();
    let mut chunk = Chunk::new();
    chunk.add_constant(7, Constant::double(2.5));
    chunk.add_constant(8, Constant::integer(99));

    let mut outer = Environment::new(EnvClosure::Compiled, FrameType::JsFunction, BailoutId(20));
    outer.push_value(EnvValue::tagged(Operand::constant(7)));
    let mut inner = Environment::new(EnvClosure::Function(source.outer), FrameType::JsFunction, BailoutId(2));
    inner.push_value(EnvValue::tagged(Operand::register(3)));
    chunk.emit(
        BlockId::ENTRY,
        Instruction::new(Op::LazyBailout).with_environment(inner.with_outer(outer)),
    );
    assert_eq!(live_constants(&chunk), vec![7]);

    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();
    let mut dest = Script::new();
    let info = dest.info();
    let loaded = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap();

    assert_eq!(loaded.constants.ids(), vec![7]);
    assert_eq!(loaded.lookup_constant(7), Some(&Constant::double(2.5)));
    let env = loaded.instructions()[0].environment.as_deref().unwrap();
    assert_eq!(env.depth(), 2);
    assert_eq!(env.closure, EnvClosure::Function(dest.outer));
}

#[test]
fn test_gap_move_constant_survives() {
    let source = Script::new();
    let mut chunk = Chunk::new();
    chunk.add_constant(3, Constant::integer(-1));
    let mut gap = Gap::new(BlockId::ENTRY);
    gap.get_or_create_parallel_move(GapPosition::End)
        .add_move(Some(Operand::constant(3)), Some(Operand::stack_slot(0)));
    chunk.emit(BlockId::ENTRY, Instruction::new(Op::Gap(gap)));

    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();
    let mut dest = Script::new();
    let info = dest.info();
    let loaded = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap();
    assert_eq!(loaded.lookup_constant(3), Some(&Constant::integer(-1)));
    assert_eq!(loaded.instructions(), chunk.instructions());
}

// =============================================================================
// Recoverable Failures
// =============================================================================

#[test]
fn test_first_failure_wins() {
    let mut source = Script::new();
    let stray = source.heap.new_symbol(Some("stray"), false);
    let mut chunk = Chunk::new();
    chunk.add_constant(1, Constant::object(Value::Object(stray)));
    chunk.add_constant(2, Constant::tagged(ConstantValue::Context { owner: source.inner_closure() }));
    chunk.emit(
        BlockId::ENTRY,
        Instruction::new(Op::Return).with_inputs([Operand::constant(1), Operand::constant(2), Operand::register(0)]),
    );

    let err = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap_err();
    assert_eq!(err, SaveloadError::UnregisteredSymbol);
}

#[test]
fn test_failed_stream_ignores_later_operations() {
    let mut out = Writer::new(false);
    out.write(1u32);
    assert_eq!(out.fail(SaveloadError::UnresolvableFunction), SaveloadError::UnresolvableFunction);
    out.write(2u32);
    out.write_str("ignored");
    assert_eq!(out.position(), 4);
    assert_eq!(out.fail(SaveloadError::CyclicShapeChain), SaveloadError::UnresolvableFunction);
    assert_eq!(out.status(), &Status::Failed(SaveloadError::UnresolvableFunction));
    assert_eq!(out.finish().unwrap_err(), SaveloadError::UnresolvableFunction);

    let bytes = [1u8, 0];
    let mut input = Reader::new(&bytes, false);
    let first = input.read::<u32>().unwrap_err();
    assert!(matches!(first, SaveloadError::UnexpectedEnd { offset: 0, needed: 2 }));
    assert_eq!(input.read::<u8>().unwrap_err(), first);
    assert_eq!(input.position(), 0);
}

#[test]
fn test_named_constant_missing_from_destination() {
    let source = Script::new();
    let mut chunk = named_math_chunk(&source.heap);
    chunk.emit(
        BlockId::ENTRY,
        Instruction::new(Op::PushArgument).with_inputs([Operand::constant(5)]),
    );
    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();

    let mut dest = Script::new();
    assert!(dest.heap.global_mut().delete("Math"));
    let info = dest.info();
    let err = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap_err();
    assert_eq!(
        err,
        SaveloadError::NameNotFound {
            namespace: "global object",
            name: "Math".into()
        }
    );
}

#[test]
fn test_named_constant_layout_change_is_detected() {
    let source = Script::new();
    let mut chunk = named_math_chunk(&source.heap);
    chunk.emit(
        BlockId::ENTRY,
        Instruction::new(Op::PushArgument).with_inputs([Operand::constant(5)]),
    );
    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();

    let mut same = Script::new();
    let info = same.info();
    let loaded = load_chunk(&bytes, &mut same.heap, &info, &config()).unwrap();
    assert!(matches!(
        &loaded.lookup_constant(5).unwrap().value,
        ConstantValue::Named { object, .. } if *object == math(&same.heap)
    ));

    let mut changed = Script::new();
    let holder = math(&changed.heap);
    changed
        .heap
        .define_constant(holder, "TAU", Value::Smi(6), PropertyAttributes::READ_ONLY);
    let info = changed.info();
    let err = load_chunk(&bytes, &mut changed.heap, &info, &config()).unwrap_err();
    assert_eq!(err, SaveloadError::LayoutChanged { name: "Math".into() });
}

fn named_math_chunk(heap: &Heap) -> Chunk {
    let mut chunk = Chunk::new();
    chunk.add_constant(
        5,
        Constant::tagged(ConstantValue::Named {
            name: "Math".into(),
            is_builtin: false,
            object: math(heap),
        }),
    );
    chunk
}

// =============================================================================
// Inlined Units
// =============================================================================

#[test]
fn test_inlined_unit_found_by_path() {
    let source = Script::new();
    let mut chunk = Chunk::new();
    chunk.inlined_functions.push(source.inner);
    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();

    let mut dest = Script::new();
    let info = dest.info();
    let loaded = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap();
    assert_eq!(loaded.inlined_functions, vec![dest.inner]);
    assert!(dest.heap.shared(dest.inner).unwrap().has_deopt_support);
}

#[test]
fn test_uncompiled_inlined_unit_fails() {
    let source = Script::new();
    let mut chunk = Chunk::new();
    chunk.inlined_functions.push(source.inner);
    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();

    let mut dest = Script::new();
    let outer_shared = dest.heap.function(dest.outer).unwrap().shared;
    dest.heap.shared_mut(outer_shared).unwrap().inner = vec![None];
    let info = dest.info();
    let err = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap_err();
    assert_eq!(err, SaveloadError::SharedFunctionUnreachable);
}

#[test]
fn test_inlined_native_without_deopt_support_fails() {
    let source = Script::new();
    let floor = source.heap.builtin_function(BuiltinFunctionId::MathFloor).unwrap();
    let mut chunk = Chunk::new();
    chunk.inlined_functions.push(source.heap.function(floor).unwrap().shared);
    let bytes = save_chunk(&chunk, &source.heap, &source.info(), &config()).unwrap();

    let mut dest = Script::new();
    let info = dest.info();
    let err = load_chunk(&bytes, &mut dest.heap, &info, &config()).unwrap_err();
    assert_eq!(err, SaveloadError::NoDeoptSupport);
}

// =============================================================================
// Fatal Input
// =============================================================================

#[test]
#[should_panic(expected = "unknown opcode 99")]
fn test_unknown_opcode_panics() {
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
    out.write(0i32);
    out.write(0i32);
    out.write(0u32);
    out.write(1u32);
    out.write(99u8);
    let bytes = out.finish().unwrap();

    let mut dest = Script::new();
    let info = dest.info();
    let _ = load_chunk(&bytes, &mut dest.heap, &info, &config().with_checkpoints(false));
}

#[test]
#[should_panic(expected = "checkpoint mismatch")]
fn test_checkpoint_mismatch_panics() {
    let source = Script::new();
    let bytes = save_chunk(&Chunk::new(), &source.heap, &source.info(), &config()).unwrap();
    let mut corrupted = bytes.clone();
    corrupted.insert(0, 0);
    corrupted.truncate(bytes.len());

    let mut dest = Script::new();
    let info = dest.info();
    let _ = load_chunk(&corrupted, &mut dest.heap, &info, &config());
}
