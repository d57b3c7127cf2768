//! Shape graph codec.
//!
//! A shape is saved as the transition path from its root:
//!
//! ```text
//!   shape := u16 root index | NOT_FOUND entry exit
//!            u32 steps
//!            steps × { entry, selector, exit }
//!            checkpoint
//!
//!   entry    := checkpoint, u8 type, i32 size, i32 inobject, i32 unused,
//!               u8 bf, u8 bf2, u32 bf3, u32 own, own × { name, u32 details }
//!   selector := bool clone
//!               | false, bool special, name          (special transition)
//!               | false, false, u32 descriptor index (property transition)
//!   exit     := own × value, bool has_constructor,
//!               function | value prototype, value constructor
//! ```
//!
//! Entry and exit are split so the loader can create (or find) the shape
//! before any descriptor value is resolved: such values may themselves refer
//! back into the chain being loaded.

use lithos_heap::{
    BitField3, Descriptor, InstanceType, ObjectId, PropertyDetails, RootIndex, Shape, ShapeId, Value,
};
use smallvec::SmallVec;

use crate::context::{Loader, Saver};
use crate::error::{SaveloadError, SaveloadResult};

// =============================================================================
// Save
// =============================================================================

impl<'h> Saver<'h> {
    pub(crate) fn save_shape(&mut self, shape: ShapeId) -> SaveloadResult<()> {
        self.stream.check()?;
        let heap = self.heap;

        // Leaf first.
        let mut chain: SmallVec<[ShapeId; 8]> = SmallVec::new();
        let mut current = Some(shape);
        while let Some(id) = current {
            if chain.contains(&id) || self.shape_chain_cache.contains(&id) {
                trace_saveload!(self.config, "cyclic shape chain through {:?}", id);
                return self.fail(SaveloadError::CyclicShapeChain);
            }
            chain.push(id);
            current = heap.shape(id).back_pointer;
        }

        let root = chain[chain.len() - 1];
        match heap.root_index_of(Value::from(root)) {
            Some(index) => self.stream.write(index as u16),
            None => {
                self.stream.write(RootIndex::NOT_FOUND);
                self.enter_shape(root)?;
                self.exit_shape(root)?;
            }
        }

        self.stream.write((chain.len() - 1) as u32);
        for pair in chain.windows(2).rev() {
            let (child, parent) = (pair[0], pair[1]);
            self.enter_shape(child)?;
            self.save_transition(parent, child)?;
            self.exit_shape(child)?;
        }
        self.stream.checkpoint();
        self.stream.check()
    }

    /// Layout fields and descriptor keys of `id`. Pushes it on the chain
    /// cache until the matching [`exit_shape`](Self::exit_shape).
    fn enter_shape(&mut self, id: ShapeId) -> SaveloadResult<()> {
        self.shape_chain_cache.push(id);
        self.stream.checkpoint();

        let heap = self.heap;
        let shape = heap.shape(id);
        self.stream.write(shape.instance_type as u8);
        self.stream.write(shape.instance_size);
        self.stream.write(shape.inobject_properties);
        self.stream.write(shape.unused_property_fields);
        self.stream.write(shape.bit_field);
        self.stream.write(shape.bit_field2);
        self.stream.write(shape.bit_field3.raw());
        self.stream.write(shape.own_descriptor_count() as u32);
        for descriptor in shape.descriptors() {
            self.save_name(descriptor.key)?;
            self.stream.write(descriptor.details.raw());
        }
        self.stream.check()
    }

    /// How `child` was derived from `parent`.
    fn save_transition(&mut self, parent: ShapeId, child: ShapeId) -> SaveloadResult<()> {
        let heap = self.heap;
        let parent_shape = heap.shape(parent);
        let parent_own = parent_shape.own_descriptor_count();
        let child_own = heap.shape(child).own_descriptor_count();

        match parent_shape.transition_key_to(child) {
            Some(key) if heap.instance_type(key) == InstanceType::Symbol => {
                self.stream.write_bool(false);
                self.stream.write_bool(true);
                self.save_name(key)
            }
            Some(key) => {
                let index = match heap.descriptor_index(child, key) {
                    Some(index) if index >= parent_own && index < child_own => index,
                    other => panic!(
                        "descriptor for transition {:?} -> {:?} at {:?}, outside [{}, {})",
                        parent, child, other, parent_own, child_own
                    ),
                };
                self.stream.write_bool(false);
                self.stream.write_bool(false);
                self.stream.write(index as u32);
                self.stream.check()
            }
            None if child_own == 0 => {
                self.stream.write_bool(true);
                self.stream.check()
            }
            None if parent_own + 1 == child_own => {
                self.stream.write_bool(false);
                self.stream.write_bool(false);
                self.stream.write(parent_own as u32);
                self.stream.check()
            }
            None => panic!("transition {:?} -> {:?} was overwritten", parent, child),
        }
    }

    /// Descriptor values, then constructor or prototype. Pops `id` off the
    /// chain cache.
    fn exit_shape(&mut self, id: ShapeId) -> SaveloadResult<()> {
        let heap = self.heap;
        let shape = heap.shape(id);
        for descriptor in shape.descriptors() {
            self.save_object(descriptor.value)?;
        }

        // The constructor recovers the prototype along with it.
        let constructor = shape
            .constructor
            .as_object()
            .filter(|&c| heap.function(c).is_some_and(|f| f.prototype == shape.prototype));
        match constructor {
            Some(constructor) => {
                self.stream.write_bool(true);
                self.save_function(constructor)?;
            }
            None => {
                self.stream.write_bool(false);
                self.save_object(shape.prototype)?;
                self.save_object(shape.constructor)?;
            }
        }

        let popped = self.shape_chain_cache.pop();
        assert_eq!(popped, Some(id), "shape chain cache is out of order");
        self.stream.check()
    }
}

// =============================================================================
// Load
// =============================================================================

/// Entry payload of one shape, held until the shape exists.
struct ShapeEntry {
    instance_type: InstanceType,
    instance_size: i32,
    inobject_properties: i32,
    unused_property_fields: i32,
    bit_field: u8,
    bit_field2: u8,
    bit_field3: u32,
    descriptors: Vec<(ObjectId, PropertyDetails)>,
}

impl ShapeEntry {
    /// A fresh unlinked shape with every descriptor value empty.
    fn build(&self) -> Shape {
        let mut shape = Shape::new(self.instance_type, self.instance_size, self.inobject_properties);
        shape.unused_property_fields = self.unused_property_fields;
        shape.bit_field = self.bit_field;
        shape.bit_field2 = self.bit_field2;
        shape.set_descriptors(
            self.descriptors
                .iter()
                .map(|&(key, details)| Descriptor {
                    key,
                    details,
                    value: Value::Empty,
                })
                .collect(),
        );
        shape.bit_field3 = BitField3::from_raw(self.bit_field3);
        shape
    }

    /// Whether an existing transition target has this layout.
    fn matches(&self, heap: &lithos_heap::Heap, id: ShapeId) -> bool {
        let shape = heap.shape(id);
        shape.instance_type == self.instance_type
            && shape.instance_size == self.instance_size
            && shape.inobject_properties == self.inobject_properties
            && shape.bit_field == self.bit_field
            && shape.bit_field2 == self.bit_field2
            && shape.own_descriptor_count() == self.descriptors.len()
            && shape
                .descriptors()
                .iter()
                .zip(&self.descriptors)
                .all(|(d, &(key, details))| d.details == details && heap.names_equal(d.key, key))
    }
}

/// Exit payload of one shape.
struct ShapeExit {
    values: Vec<Value>,
    prototype: Value,
    constructor: Value,
}

/// How a shape was derived from its parent.
#[derive(Debug, Clone, Copy)]
enum Step {
    Clone,
    Transition(ObjectId),
}

impl<'a, 'h> Loader<'a, 'h> {
    pub(crate) fn load_shape(&mut self) -> SaveloadResult<ShapeId> {
        let raw = self.stream.read::<u16>()?;
        let mut branched = false;
        let mut current = if raw == RootIndex::NOT_FOUND {
            let entry = self.load_shape_entry()?;
            let root = self.heap.new_shape(entry.build());
            let exit = self.load_shape_exit(entry.descriptors.len())?;
            self.apply_shape_exit(root, exit);
            branched = true;
            root
        } else {
            match RootIndex::from_u16(raw) {
                Some(index) => self.heap.root_shape(index),
                None => panic!("unknown root index {}", raw),
            }
        };

        let steps = self.stream.read::<u32>()?;
        for _ in 0..steps {
            let entry = self.load_shape_entry()?;
            let step = self.load_step(&entry)?;

            // The child must exist before exit values are resolved.
            let (mut next, mut fresh) = match step {
                Step::Clone => {
                    let mut shape = entry.build();
                    shape.back_pointer = Some(current);
                    (self.heap.new_shape(shape), true)
                }
                Step::Transition(key) => match self.existing_transition(current, key, &entry, None) {
                    Some(target) => (target, false),
                    None => (self.new_transition(current, key, &entry), true),
                },
            };

            let exit = self.load_shape_exit(entry.descriptors.len())?;
            if let (false, Step::Transition(key)) = (fresh, step) {
                // Edges may share a key and differ only in values.
                if !self.exit_matches(next, &exit) {
                    match self.existing_transition(current, key, &entry, Some(&exit)) {
                        Some(target) => next = target,
                        None => {
                            next = self.new_transition(current, key, &entry);
                            fresh = true;
                        }
                    }
                }
            }
            if fresh {
                self.apply_shape_exit(next, exit);
            }
            branched |= fresh;
            current = next;
        }
        self.stream.checkpoint()?;

        if branched {
            if let Some(existing) = self.find_equivalent_shape(current) {
                trace_saveload!(self.config, "deduplicate shape {:?} -> {:?}", current, existing);
                current = existing;
            }
        }
        trace_saveload!(
            self.config,
            "shape loaded, function at {}",
            self.info.start_position(self.heap)
        );
        Ok(current)
    }

    fn load_shape_entry(&mut self) -> SaveloadResult<ShapeEntry> {
        self.stream.checkpoint()?;
        let raw = self.stream.read::<u8>()?;
        let Some(instance_type) = InstanceType::from_u8(raw) else {
            panic!("unknown shape instance type {}", raw);
        };
        let instance_size = self.stream.read::<i32>()?;
        let inobject_properties = self.stream.read::<i32>()?;
        let unused_property_fields = self.stream.read::<i32>()?;
        let bit_field = self.stream.read::<u8>()?;
        let bit_field2 = self.stream.read::<u8>()?;
        let bit_field3 = self.stream.read::<u32>()?;
        let own = self.stream.read::<u32>()?;

        let mut descriptors = Vec::new();
        for _ in 0..own {
            let key = self.load_name()?;
            let raw = self.stream.read::<u32>()?;
            let Some(details) = PropertyDetails::from_raw(raw) else {
                panic!("malformed property details {:#x}", raw);
            };
            descriptors.push((key, details));
        }
        Ok(ShapeEntry {
            instance_type,
            instance_size,
            inobject_properties,
            unused_property_fields,
            bit_field,
            bit_field2,
            bit_field3,
            descriptors,
        })
    }

    fn load_step(&mut self, entry: &ShapeEntry) -> SaveloadResult<Step> {
        if self.stream.read_bool()? {
            return Ok(Step::Clone);
        }
        if self.stream.read_bool()? {
            return Ok(Step::Transition(self.load_name()?));
        }
        let index = self.stream.read::<u32>()? as usize;
        match entry.descriptors.get(index) {
            Some(&(key, _)) => Ok(Step::Transition(key)),
            None => panic!(
                "added descriptor {} out of range for {} descriptors",
                index,
                entry.descriptors.len()
            ),
        }
    }

    /// First `key` edge out of `parent` whose target has the entry layout
    /// and, when given, the exit values.
    fn existing_transition(
        &self,
        parent: ShapeId,
        key: ObjectId,
        entry: &ShapeEntry,
        exit: Option<&ShapeExit>,
    ) -> Option<ShapeId> {
        let heap = &*self.heap;
        heap.transitions_for(parent, key)
            .into_iter()
            .find(|&target| entry.matches(heap, target) && exit.map_or(true, |exit| self.exit_matches(target, exit)))
    }

    fn new_transition(&mut self, parent: ShapeId, key: ObjectId, entry: &ShapeEntry) -> ShapeId {
        let child = self.heap.new_shape(entry.build());
        self.heap.connect_transition(parent, key, child);
        child
    }

    fn load_shape_exit(&mut self, own: usize) -> SaveloadResult<ShapeExit> {
        let mut values = Vec::with_capacity(own);
        for _ in 0..own {
            values.push(self.load_object()?);
        }
        let (prototype, constructor) = if self.stream.read_bool()? {
            let function = self.load_function()?;
            let prototype = self.heap.function(function).map_or(Value::Empty, |f| f.prototype);
            (prototype, Value::Object(function))
        } else {
            let prototype = self.load_object()?;
            let constructor = self.load_object()?;
            (prototype, constructor)
        };
        Ok(ShapeExit {
            values,
            prototype,
            constructor,
        })
    }

    /// Freshly loaded numbers and strings match existing ones by contents.
    fn exit_matches(&self, id: ShapeId, exit: &ShapeExit) -> bool {
        let heap = &*self.heap;
        let shape = heap.shape(id);
        heap.values_equivalent(shape.prototype, exit.prototype)
            && heap.values_equivalent(shape.constructor, exit.constructor)
            && shape.own_descriptor_count() == exit.values.len()
            && shape
                .descriptors()
                .iter()
                .zip(&exit.values)
                .all(|(d, &value)| heap.values_equivalent(d.value, value))
    }

    /// Store exit values into a shape this load created.
    fn apply_shape_exit(&mut self, id: ShapeId, exit: ShapeExit) {
        let shape = self.heap.shape_mut(id);
        for (index, value) in exit.values.into_iter().enumerate() {
            shape.descriptor_mut(index).value = value;
        }
        shape.prototype = exit.prototype;
        shape.constructor = exit.constructor;
    }

    /// A shape of some global property equivalent to `shape`.
    fn find_equivalent_shape(&self, shape: ShapeId) -> Option<ShapeId> {
        let heap = &*self.heap;
        heap.global()
            .entries()
            .iter()
            .filter(|entry| !entry.deleted)
            .filter_map(|entry| entry.value.as_object())
            .filter_map(|object| heap.shape_of(object))
            .find(|&candidate| candidate != shape && heap.shapes_equivalent_for_dedup(candidate, shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SaveloadConfig;
    use crate::context::CompilationInfo;
    use lithos_heap::{BuiltinFunctionId, Heap, PropertyAttributes};

    fn config() -> SaveloadConfig {
        SaveloadConfig::default().with_checkpoints(true)
    }

    fn info(heap: &Heap) -> CompilationInfo {
        CompilationInfo::new(heap.builtin_function(BuiltinFunctionId::MathFloor).unwrap())
    }

    fn save(heap: &Heap, shape: ShapeId) -> SaveloadResult<Vec<u8>> {
        let mut saver = Saver::new(heap, info(heap), config());
        let result = saver.save_shape(shape);
        saver.finish(result)
    }

    fn load(heap: &mut Heap, bytes: &[u8]) -> SaveloadResult<ShapeId> {
        let info = info(heap);
        let mut loader = Loader::new(bytes, heap, info, config());
        let result = loader.load_shape();
        loader.finish(result)
    }

    fn names(heap: &Heap, shape: ShapeId) -> Vec<String> {
        heap.shape(shape)
            .descriptors()
            .iter()
            .map(|d| heap.string_text(d.key).unwrap_or("<symbol>").to_string())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Roots
    // -------------------------------------------------------------------------

    #[test]
    fn test_stable_root_is_an_index() {
        let heap = Heap::new();
        let root = heap.root_shape(RootIndex::ObjectShape);
        let mut saver = Saver::new(&heap, info(&heap), SaveloadConfig::default().with_checkpoints(false));
        let result = saver.save_shape(root);
        let bytes = saver.finish(result).unwrap();

        let mut expected = (RootIndex::ObjectShape as u16).to_le_bytes().to_vec();
        expected.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(bytes, expected);

        let mut dest = Heap::new();
        let info = info(&dest);
        let mut loader = Loader::new(&bytes, &mut dest, info, SaveloadConfig::default().with_checkpoints(false));
        let result = loader.load_shape();
        let loaded = loader.finish(result).unwrap();
        assert_eq!(loaded, dest.root_shape(RootIndex::ObjectShape));
    }

    #[test]
    fn test_unstable_root_is_rebuilt() {
        let mut heap = Heap::new();
        let mut root = Shape::new(InstanceType::Object, 48, 6);
        root.bit_field = 0x11;
        let root = heap.new_shape(root);
        let bytes = save(&heap, root).unwrap();

        let mut dest = Heap::new();
        let loaded = load(&mut dest, &bytes).unwrap();
        let shape = dest.shape(loaded);
        assert_eq!(shape.instance_size, 48);
        assert_eq!(shape.inobject_properties, 6);
        assert_eq!(shape.bit_field, 0x11);
        assert!(shape.back_pointer.is_none());
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    #[test]
    fn test_property_chain_round_trip() {
        let mut heap = Heap::new();
        let object = heap.new_plain_object(&[("a", Value::Smi(1)), ("b", Value::Smi(2))]);
        let shape = heap.shape_of(object).unwrap();
        let bytes = save(&heap, shape).unwrap();

        let mut dest = Heap::new();
        let loaded = load(&mut dest, &bytes).unwrap();
        assert_eq!(names(&dest, loaded), ["a", "b"]);
        for (d, e) in heap.shape(shape).descriptors().iter().zip(dest.shape(loaded).descriptors()) {
            assert_eq!(d.details, e.details);
            assert_eq!(d.value, e.value);
        }
        assert_eq!(dest.shape(loaded).bit_field3.own_descriptors(), 2);
    }

    #[test]
    fn test_second_load_reuses_transitions() {
        let mut heap = Heap::new();
        let object = heap.new_plain_object(&[("x", Value::Smi(0))]);
        let bytes = save(&heap, heap.shape_of(object).unwrap()).unwrap();

        let mut dest = Heap::new();
        let first = load(&mut dest, &bytes).unwrap();
        let second = load(&mut dest, &bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_heap_valued_constants_reuse_existing_edge() {
        fn with_constants(heap: &mut Heap) -> ShapeId {
            let object = heap.new_plain_object(&[("x", Value::Smi(0))]);
            let text = heap.new_string("hi", false);
            let number = heap.new_number(2.5);
            heap.define_constant(object, "m", Value::Object(text), PropertyAttributes::READ_ONLY);
            heap.define_constant(object, "n", Value::Object(number), PropertyAttributes::READ_ONLY);
            heap.shape_of(object).unwrap()
        }

        let mut heap = Heap::new();
        let shape = with_constants(&mut heap);
        let bytes = save(&heap, shape).unwrap();

        let mut dest = Heap::new();
        let existing = with_constants(&mut dest);
        let parent = dest.shape(existing).back_pointer.unwrap();
        let edges = dest.shape(parent).transitions.len();

        for _ in 0..3 {
            assert_eq!(load(&mut dest, &bytes).unwrap(), existing);
        }
        assert_eq!(dest.shape(parent).transitions.len(), edges);
    }

    #[test]
    fn test_sibling_edges_resolved_by_values() {
        let heap = Heap::new();
        let prototype_shape = |heap: &Heap, name: &str| {
            let constructor = heap.lookup_global(name).and_then(|v| v.as_object()).unwrap();
            let prototype = heap.function(constructor).unwrap().prototype.as_object().unwrap();
            heap.shape_of(prototype).unwrap()
        };
        let bytes = save(&heap, prototype_shape(&heap, "String")).unwrap();

        let mut dest = Heap::new();
        let loaded = load(&mut dest, &bytes).unwrap();
        assert_eq!(loaded, prototype_shape(&dest, "String"));
        assert_ne!(loaded, prototype_shape(&dest, "Array"));
    }

    #[test]
    fn test_special_transition_round_trip() {
        let mut heap = Heap::new();
        let object = heap.new_plain_object(&[("k", Value::Smi(3))]);
        let parent = heap.shape_of(object).unwrap();
        let frozen = heap.root(RootIndex::FrozenSymbol).as_object().unwrap();
        let child = heap.add_special_transition(parent, frozen);
        let bytes = save(&heap, child).unwrap();

        let mut dest = Heap::new();
        let loaded = load(&mut dest, &bytes).unwrap();
        let back = dest.shape(loaded).back_pointer.unwrap();
        let dest_frozen = dest.root(RootIndex::FrozenSymbol).as_object().unwrap();
        assert_eq!(dest.shape(back).transition_key_to(loaded), Some(dest_frozen));
        assert_eq!(names(&dest, loaded), ["k"]);
    }

    #[test]
    fn test_clone_step_round_trip() {
        let mut heap = Heap::new();
        let object = heap.new_plain_object(&[("k", Value::Smi(3))]);
        let parent = heap.shape_of(object).unwrap();
        let clone = heap.clone_shape(parent);
        let bytes = save(&heap, clone).unwrap();

        let mut dest = Heap::new();
        let loaded = load(&mut dest, &bytes).unwrap();
        let shape = dest.shape(loaded);
        assert_eq!(shape.own_descriptor_count(), 0);
        let back = shape.back_pointer.unwrap();
        assert_eq!(names(&dest, back), ["k"]);
        assert!(dest.shape(back).transition_key_to(loaded).is_none());
    }

    #[test]
    fn test_constructor_recovers_prototype() {
        let mut heap = Heap::new();
        let root = heap.root_shape(RootIndex::ObjectShape);
        let object_fn = heap.lookup_global("Object").and_then(|v| v.as_object()).unwrap();
        let mut copy = heap.shape(root).copy_drop_descriptors();
        copy.bit_field2 = 7;
        let shape = heap.new_shape(copy);
        let bytes = save(&heap, shape).unwrap();

        let mut dest = Heap::new();
        let loaded = load(&mut dest, &bytes).unwrap();
        let dest_object_fn = dest.lookup_global("Object").and_then(|v| v.as_object()).unwrap();
        assert_eq!(dest.shape(loaded).constructor, Value::Object(dest_object_fn));
        assert_eq!(dest.shape(loaded).prototype, dest.function(dest_object_fn).unwrap().prototype);
        assert_eq!(heap.shape(shape).constructor, Value::Object(object_fn));
    }

    // -------------------------------------------------------------------------
    // Failures
    // -------------------------------------------------------------------------

    #[test]
    fn test_cycle_is_rejected() {
        let mut heap = Heap::new();
        let a = heap.new_shape(Shape::new(InstanceType::Object, 32, 4));
        let b = heap.clone_shape(a);
        heap.shape_mut(a).back_pointer = Some(b);

        assert_eq!(save(&heap, b).unwrap_err(), SaveloadError::CyclicShapeChain);
    }

    #[test]
    fn test_chain_cache_empty_after_save() {
        let mut heap = Heap::new();
        let object = heap.new_plain_object(&[("p", Value::Smi(1)), ("q", Value::Smi(2))]);
        let shape = heap.shape_of(object).unwrap();
        let mut saver = Saver::new(&heap, info(&heap), config());
        saver.save_shape(shape).unwrap();
        assert!(saver.shape_chain_cache.is_empty());
    }
}
