//! Shape and value round trips through the public save/load entry points.
//!
//! Coverage:
//! - Scalars and strings survive a transfer between heaps
//! - Transition chains rebuild with the same descriptors
//! - Independently saved units converge on one destination shape
//! - Cyclic back-pointer chains are rejected

use lithos_chunk::{BlockId, Chunk, Instruction, Op, Operand};
use lithos_heap::{
    HeapObject, Heap, InstanceType, ObjectId, PropertyAttributes, Shape, ShapeId, Value,
};
use lithos_saveload::{
    load_chunk, load_value, save_chunk, save_value, CompilationInfo, SaveloadConfig, SaveloadError,
};

fn config() -> SaveloadConfig {
    SaveloadConfig::default().with_checkpoints(true)
}

/// A heap with `function Point(x, y) {}` installed as a global and its
/// initial object shape, plus a `Point` instance bound to `origin` when asked.
struct PointHeap {
    heap: Heap,
    point: ObjectId,
    initial: ShapeId,
}

impl PointHeap {
    fn new(with_origin: bool) -> Self {
        let mut heap = Heap::new();
        let script = heap.add_script("point.js", "function Point(x, y) {}");
        let native = heap.native_context();
        let point = heap.new_script_function(script, "Point", 14, 23, native, None);
        let prototype = heap.new_plain_object(&[]);
        heap.function_mut(point).unwrap().prototype = Value::Object(prototype);
        heap.global_mut().define("Point", Value::Object(point), PropertyAttributes::empty());

        let mut initial = Shape::new(InstanceType::Object, 40, 2);
        initial.constructor = Value::Object(point);
        initial.prototype = Value::Object(prototype);
        let initial = heap.new_shape(initial);
        heap.function_mut(point).unwrap().initial_shape = Some(initial);

        let mut this = PointHeap { heap, point, initial };
        if with_origin {
            let origin = this.new_point(0, 0);
            this.heap.global_mut().define("origin", Value::Object(origin), PropertyAttributes::empty());
        }
        this
    }

    fn new_point(&mut self, x: i32, y: i32) -> ObjectId {
        self.heap.new_object_from(self.initial, &[("x", Value::Smi(x)), ("y", Value::Smi(y))])
    }

    fn info(&self) -> CompilationInfo {
        CompilationInfo::new(self.point)
    }

    fn origin_shape(&self) -> ShapeId {
        let origin = self.heap.lookup_global("origin").and_then(|v| v.as_object()).unwrap();
        self.heap.shape_of(origin).unwrap()
    }
}

fn key_names(heap: &Heap, shape: ShapeId) -> Vec<&str> {
    heap.shape(shape)
        .descriptors()
        .iter()
        .map(|d| heap.string_text(d.key).unwrap())
        .collect()
}

// =============================================================================
// Scalars
// =============================================================================

#[test]
fn test_scalars_round_trip() {
    let mut heap = Heap::new();
    let number = heap.new_number(-1234.5e-7);
    let text = heap.new_string("caf\u{e9}", false);
    let info = CompilationInfo::new(heap.lookup_global("Object").and_then(|v| v.as_object()).unwrap());

    let mut dest = Heap::new();
    let dest_info = CompilationInfo::new(dest.lookup_global("Object").and_then(|v| v.as_object()).unwrap());

    for value in [Value::Smi(-3), Value::Empty] {
        let bytes = save_value(value, &heap, &info, &config()).unwrap();
        assert_eq!(load_value(&bytes, &mut dest, &dest_info, &config()).unwrap(), value);
    }

    let bytes = save_value(Value::Object(number), &heap, &info, &config()).unwrap();
    let loaded = load_value(&bytes, &mut dest, &dest_info, &config()).unwrap();
    assert!(matches!(dest.get(loaded.as_object().unwrap()), HeapObject::Number(n) if n.to_bits() == (-1234.5e-7f64).to_bits()));

    let bytes = save_value(Value::Object(text), &heap, &info, &config()).unwrap();
    let loaded = load_value(&bytes, &mut dest, &dest_info, &config()).unwrap();
    assert_eq!(dest.string_text(loaded.as_object().unwrap()), Some("caf\u{e9}"));
}

// =============================================================================
// Shape Chains
// =============================================================================

#[test]
fn test_shape_chain_round_trip() {
    let mut heap = Heap::new();
    let object = heap.new_plain_object(&[("a", Value::Smi(1)), ("b", Value::Smi(2)), ("c", Value::Smi(3))]);
    heap.define_constant(object, "k", Value::Smi(9), PropertyAttributes::READ_ONLY);
    let shape = heap.shape_of(object).unwrap();
    let info = CompilationInfo::new(heap.lookup_global("Object").and_then(|v| v.as_object()).unwrap());
    let bytes = save_value(Value::Object(object), &heap, &info, &config()).unwrap();

    let mut dest = Heap::new();
    let dest_info = CompilationInfo::new(dest.lookup_global("Object").and_then(|v| v.as_object()).unwrap());
    let loaded = load_value(&bytes, &mut dest, &dest_info, &config()).unwrap();
    let loaded_shape = dest.shape_of(loaded.as_object().unwrap()).unwrap();

    assert_eq!(key_names(&dest, loaded_shape), ["a", "b", "c", "k"]);
    assert_eq!(dest.shape(loaded_shape).own_descriptor_count(), 4);
    assert_eq!(dest.shape(loaded_shape).bit_field3.own_descriptors(), 4);
    for (saved, rebuilt) in heap.shape(shape).descriptors().iter().zip(dest.shape(loaded_shape).descriptors()) {
        assert_eq!(saved.details, rebuilt.details);
        assert_eq!(saved.value, rebuilt.value);
    }
}

#[test]
fn test_deduplication_converges_on_existing_shape() {
    let mut first = PointHeap::new(false);
    let a = first.new_point(1, 2);
    let mut chunk = Chunk::new();
    chunk.emit(
        BlockId::ENTRY,
        Instruction::new(Op::CheckMaps {
            shapes: [first.heap.shape_of(a).unwrap()].into_iter().collect(),
        })
        .with_inputs([Operand::register(0)]),
    );
    let unit_a = save_chunk(&chunk, &first.heap, &first.info(), &config()).unwrap();

    let mut second = PointHeap::new(false);
    let b = second.new_point(5, 6);
    let unit_b = save_value(Value::Object(b), &second.heap, &second.info(), &config()).unwrap();

    let mut dest = PointHeap::new(true);
    let info = dest.info();
    let loaded_a = load_chunk(&unit_a, &mut dest.heap, &info, &config()).unwrap();
    let loaded_b = load_value(&unit_b, &mut dest.heap, &info, &config()).unwrap();

    let Op::CheckMaps { shapes } = &loaded_a.instructions()[0].op else {
        panic!("expected check-maps, loaded {}", loaded_a.instructions()[0]);
    };
    let shape_b = dest.heap.shape_of(loaded_b.as_object().unwrap()).unwrap();
    assert_eq!(shapes[0], dest.origin_shape());
    assert_eq!(shape_b, dest.origin_shape());
}

#[test]
fn test_without_existing_shape_loads_diverge() {
    let mut source = PointHeap::new(false);
    let point = source.new_point(1, 2);
    let bytes = save_value(Value::Object(point), &source.heap, &source.info(), &config()).unwrap();

    let mut dest = PointHeap::new(false);
    let info = dest.info();
    let first = load_value(&bytes, &mut dest.heap, &info, &config()).unwrap();
    let second = load_value(&bytes, &mut dest.heap, &info, &config()).unwrap();
    let shape = |value: Value| dest.heap.shape_of(value.as_object().unwrap()).unwrap();

    assert_ne!(shape(first), shape(second));
    assert_eq!(key_names(&dest.heap, shape(first)), ["x", "y"]);
    assert_eq!(dest.heap.shape(shape(first)).constructor, Value::Object(dest.point));
}

#[test]
fn test_cyclic_shape_chain_is_rejected() {
    let mut heap = Heap::new();
    let a = heap.new_shape(Shape::new(InstanceType::Object, 24, 1));
    let b = heap.clone_shape(a);
    let c = heap.clone_shape(b);
    heap.shape_mut(a).back_pointer = Some(c);
    let elements = heap.new_fixed_array(Vec::new());
    let properties = heap.new_fixed_array(Vec::new());
    let object = heap.new_object(c, elements, properties);
    let info = CompilationInfo::new(heap.lookup_global("Object").and_then(|v| v.as_object()).unwrap());

    let err = save_value(Value::Object(object), &heap, &info, &config()).unwrap_err();
    assert_eq!(err, SaveloadError::CyclicShapeChain);
}
