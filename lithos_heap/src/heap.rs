//! The heap: object storage, roots, namespaces, and the object factory.
//!
//! A [`Heap`] owns every runtime object of one process. Read access
//! (`&Heap`) is all that saving a compiled unit needs; every method that
//! allocates takes `&mut self`, so the borrow checker keeps allocation off
//! the save path.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::arena::Arena;
use crate::function::{Context, ContextKind, ContextSlot, JsFunction, Script, ScriptId, SharedFunctionInfo};
use crate::namespace::{Namespace, SymbolRegistry};
use crate::object::{
    AccessorId, AccessorInfo, ElementsKind, Foreign, HeapObject, InstanceType, JsArray, JsBoxed, JsObject,
    JsRegExp, JsString, JsTypedArray, OddballKind, RegExpFlags, Symbol, TypedArrayKind,
};
use crate::roots::RootIndex;
use crate::shape::{Descriptor, PropertyAttributes, PropertyDetails, PropertyLocation, Representation, Shape, Transition};
use crate::value::{ObjectId, ShapeId, Value};

// =============================================================================
// Heap
// =============================================================================

/// All runtime objects of one process.
#[derive(Debug, Clone)]
pub struct Heap {
    objects: Arena<HeapObject>,
    scripts: Arena<Script>,
    roots: Vec<Value>,
    global: Namespace,
    builtins: Namespace,
    symbols: SymbolRegistry,
    string_table: FxHashMap<String, ObjectId>,
    native_context: ObjectId,
    global_object: ObjectId,
    global_proxy: ObjectId,
    builtins_object: ObjectId,
}

impl Heap {
    /// Heap holding only the process singletons. Roots are unset.
    pub(crate) fn empty() -> Self {
        let mut objects = Arena::new();
        let native_context = objects.alloc(HeapObject::Context(Context {
            kind: ContextKind::Native,
            previous: None,
            closure: None,
            slots: Vec::new(),
        }));
        let global_object = objects.alloc(HeapObject::GlobalObject);
        let global_proxy = objects.alloc(HeapObject::GlobalProxy);
        let builtins_object = objects.alloc(HeapObject::BuiltinsObject);
        Heap {
            objects,
            scripts: Arena::new(),
            roots: vec![Value::Empty; RootIndex::COUNT],
            global: Namespace::new(),
            builtins: Namespace::new(),
            symbols: SymbolRegistry::new(),
            string_table: FxHashMap::default(),
            native_context,
            global_object,
            global_proxy,
            builtins_object,
        }
    }

    // =========================================================================
    // Raw Access
    // =========================================================================

    /// The object behind `id`.
    #[inline]
    pub fn get(&self, id: ObjectId) -> &HeapObject {
        &self.objects[id]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> &mut HeapObject {
        &mut self.objects[id]
    }

    /// Number of allocated objects.
    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// All objects in allocation order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &HeapObject)> {
        self.objects.iter()
    }

    #[inline]
    pub fn instance_type(&self, id: ObjectId) -> InstanceType {
        self.objects[id].instance_type()
    }

    /// The shape behind `id`. Panics if `id` is not a shape.
    pub fn shape(&self, id: ShapeId) -> &Shape {
        match &self.objects[id.object()] {
            HeapObject::Shape(shape) => shape,
            other => panic!("{} is a {}, not a shape", id.object(), other.instance_type()),
        }
    }

    /// Mutable shape access. Panics if `id` is not a shape.
    pub fn shape_mut(&mut self, id: ShapeId) -> &mut Shape {
        match &mut self.objects[id.object()] {
            HeapObject::Shape(shape) => shape,
            other => panic!("{} is a {}, not a shape", id.object(), other.instance_type()),
        }
    }

    /// Checked cast to a shape handle.
    pub fn as_shape(&self, id: ObjectId) -> Option<ShapeId> {
        matches!(self.objects[id], HeapObject::Shape(_)).then_some(ShapeId::from_object(id))
    }

    /// Shape of a shape-bearing object.
    #[inline]
    pub fn shape_of(&self, id: ObjectId) -> Option<ShapeId> {
        self.objects[id].shape()
    }

    pub fn function(&self, id: ObjectId) -> Option<&JsFunction> {
        match &self.objects[id] {
            HeapObject::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: ObjectId) -> Option<&mut JsFunction> {
        match &mut self.objects[id] {
            HeapObject::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn shared(&self, id: ObjectId) -> Option<&SharedFunctionInfo> {
        match &self.objects[id] {
            HeapObject::SharedFunction(s) => Some(s),
            _ => None,
        }
    }

    pub fn shared_mut(&mut self, id: ObjectId) -> Option<&mut SharedFunctionInfo> {
        match &mut self.objects[id] {
            HeapObject::SharedFunction(s) => Some(s),
            _ => None,
        }
    }

    /// Shared unit of a closure. Panics if `function` is not a closure.
    pub fn shared_of(&self, function: ObjectId) -> &SharedFunctionInfo {
        let shared = self
            .function(function)
            .unwrap_or_else(|| panic!("{} is not a function", function))
            .shared;
        self.shared(shared)
            .unwrap_or_else(|| panic!("{} has no shared function info", function))
    }

    pub fn context(&self, id: ObjectId) -> Option<&Context> {
        match &self.objects[id] {
            HeapObject::Context(c) => Some(c),
            _ => None,
        }
    }

    pub fn string(&self, id: ObjectId) -> Option<&JsString> {
        match &self.objects[id] {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text of a string object.
    #[inline]
    pub fn string_text(&self, id: ObjectId) -> Option<&str> {
        self.string(id).map(|s| s.text.as_str())
    }

    pub fn symbol(&self, id: ObjectId) -> Option<&Symbol> {
        match &self.objects[id] {
            HeapObject::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn js_object(&self, id: ObjectId) -> Option<&JsObject> {
        match &self.objects[id] {
            HeapObject::Object(o) => Some(o),
            HeapObject::Boxed(b) => Some(&b.object),
            _ => None,
        }
    }

    /// Elements of a fixed array.
    pub fn fixed_array(&self, id: ObjectId) -> Option<&[Value]> {
        match &self.objects[id] {
            HeapObject::FixedArray(items) => Some(items),
            _ => None,
        }
    }

    pub fn script(&self, id: ScriptId) -> &Script {
        &self.scripts[id]
    }

    // =========================================================================
    // Roots and Singletons
    // =========================================================================

    #[inline]
    pub fn root(&self, index: RootIndex) -> Value {
        self.roots[index as usize]
    }

    pub(crate) fn set_root(&mut self, index: RootIndex, value: Value) {
        self.roots[index as usize] = value;
    }

    /// Root shape stored at `index`. Panics if that root is not a shape.
    pub fn root_shape(&self, index: RootIndex) -> ShapeId {
        self.root(index)
            .as_object()
            .and_then(|id| self.as_shape(id))
            .unwrap_or_else(|| panic!("root {:?} is not a shape", index))
    }

    /// Root index of `value`, found by scanning the root table.
    pub fn root_index_of(&self, value: Value) -> Option<RootIndex> {
        if value.is_empty() {
            return None;
        }
        self.roots
            .iter()
            .position(|&root| root == value)
            .and_then(|i| RootIndex::from_u16(i as u16))
    }

    /// The canonical oddball of `kind`.
    pub fn oddball(&self, kind: OddballKind) -> Value {
        let index = match kind {
            OddballKind::Undefined => RootIndex::Undefined,
            OddballKind::TheHole => RootIndex::TheHole,
            OddballKind::Null => RootIndex::Null,
            OddballKind::True => RootIndex::True,
            OddballKind::False => RootIndex::False,
            OddballKind::Uninitialized => RootIndex::Uninitialized,
            OddballKind::Exception => RootIndex::Exception,
        };
        self.root(index)
    }

    #[inline]
    pub fn undefined_value(&self) -> Value {
        self.root(RootIndex::Undefined)
    }

    #[inline]
    pub fn null_value(&self) -> Value {
        self.root(RootIndex::Null)
    }

    #[inline]
    pub fn native_context(&self) -> ObjectId {
        self.native_context
    }

    #[inline]
    pub fn global_object(&self) -> ObjectId {
        self.global_object
    }

    #[inline]
    pub fn global_proxy(&self) -> ObjectId {
        self.global_proxy
    }

    #[inline]
    pub fn builtins_object(&self) -> ObjectId {
        self.builtins_object
    }

    /// Properties of the global object.
    #[inline]
    pub fn global(&self) -> &Namespace {
        &self.global
    }

    #[inline]
    pub fn global_mut(&mut self) -> &mut Namespace {
        &mut self.global
    }

    /// Properties of the builtins object.
    #[inline]
    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    #[inline]
    pub fn builtins_mut(&mut self) -> &mut Namespace {
        &mut self.builtins
    }

    #[inline]
    pub fn symbol_registry(&self) -> &SymbolRegistry {
        &self.symbols
    }

    #[inline]
    pub fn symbol_registry_mut(&mut self) -> &mut SymbolRegistry {
        &mut self.symbols
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Whether two property names denote the same property.
    ///
    /// Strings compare by contents, symbols by identity.
    pub fn names_equal(&self, a: ObjectId, b: ObjectId) -> bool {
        if a == b {
            return true;
        }
        match (self.string(a), self.string(b)) {
            (Some(x), Some(y)) => x.text == y.text,
            _ => false,
        }
    }

    /// Whether two values are the same constant.
    ///
    /// Heap numbers compare by bit pattern and strings by contents; every
    /// other heap object only equals itself.
    pub fn values_equivalent(&self, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
            return false;
        };
        match (&self.objects[a], &self.objects[b]) {
            (HeapObject::Number(x), HeapObject::Number(y)) => x.to_bits() == y.to_bits(),
            (HeapObject::String(x), HeapObject::String(y)) => x.text == y.text,
            _ => false,
        }
    }

    /// Whether `name` is a string with text `text`.
    pub fn name_is(&self, name: ObjectId, text: &str) -> bool {
        self.string_text(name) == Some(text)
    }

    // =========================================================================
    // Factory
    // =========================================================================

    fn alloc(&mut self, object: HeapObject) -> ObjectId {
        self.objects.alloc(object)
    }

    pub fn new_oddball(&mut self, kind: OddballKind) -> ObjectId {
        self.alloc(HeapObject::Oddball(kind))
    }

    pub fn new_number(&mut self, value: f64) -> ObjectId {
        self.alloc(HeapObject::Number(value))
    }

    /// New string; interned strings are shared through the string table.
    pub fn new_string(&mut self, text: &str, interned: bool) -> ObjectId {
        if interned {
            return self.internalize(text);
        }
        self.alloc(HeapObject::String(JsString {
            text: text.to_string(),
            interned: false,
        }))
    }

    /// The unique interned string with `text`.
    pub fn internalize(&mut self, text: &str) -> ObjectId {
        if let Some(&id) = self.string_table.get(text) {
            return id;
        }
        let id = self.alloc(HeapObject::String(JsString {
            text: text.to_string(),
            interned: true,
        }));
        self.string_table.insert(text.to_string(), id);
        id
    }

    pub fn new_symbol(&mut self, description: Option<&str>, private: bool) -> ObjectId {
        self.alloc(HeapObject::Symbol(Symbol {
            description: description.map(str::to_string),
            private,
        }))
    }

    pub fn new_regexp(&mut self, pattern: ObjectId, flags: RegExpFlags) -> ObjectId {
        self.alloc(HeapObject::RegExp(JsRegExp { pattern, flags }))
    }

    pub fn new_fixed_array(&mut self, items: Vec<Value>) -> ObjectId {
        self.alloc(HeapObject::FixedArray(items))
    }

    pub fn new_double_array(&mut self, items: Vec<f64>) -> ObjectId {
        self.alloc(HeapObject::DoubleArray(items))
    }

    pub fn new_array(&mut self, kind: ElementsKind, length: Value, elements: ObjectId) -> ObjectId {
        self.alloc(HeapObject::Array(JsArray { kind, length, elements }))
    }

    /// Array with an empty backing store and no length.
    pub fn new_empty_array(&mut self, kind: ElementsKind) -> ObjectId {
        let elements = if kind.is_double() {
            RootIndex::EmptyDoubleArray
        } else {
            RootIndex::EmptyFixedArray
        };
        let elements = self
            .root(elements)
            .as_object()
            .unwrap_or_else(|| panic!("empty array roots are not initialized"));
        self.new_array(kind, Value::Empty, elements)
    }

    pub fn new_array_buffer(&mut self, bytes: Vec<u8>) -> ObjectId {
        self.alloc(HeapObject::ArrayBuffer(bytes))
    }

    pub fn new_typed_array(&mut self, kind: TypedArrayKind, buffer: ObjectId, byte_offset: usize, length: usize) -> ObjectId {
        self.alloc(HeapObject::TypedArray(JsTypedArray {
            kind,
            buffer,
            byte_offset,
            length,
        }))
    }

    pub fn new_object(&mut self, shape: ShapeId, elements: ObjectId, properties: ObjectId) -> ObjectId {
        self.alloc(HeapObject::Object(JsObject {
            shape,
            elements,
            properties,
        }))
    }

    pub fn new_boxed(&mut self, object: JsObject, value: Value) -> ObjectId {
        self.alloc(HeapObject::Boxed(JsBoxed { object, value }))
    }

    pub fn new_accessor_info(&mut self, getter: Value, setter: Value, data: Value) -> ObjectId {
        self.alloc(HeapObject::AccessorInfo(AccessorInfo { getter, setter, data }))
    }

    pub fn new_foreign(&mut self, accessor: Option<AccessorId>) -> ObjectId {
        self.alloc(HeapObject::Foreign(Foreign { accessor }))
    }

    pub fn new_allocation_site(&mut self) -> ObjectId {
        self.alloc(HeapObject::AllocationSite)
    }

    pub fn new_accessor_pair(&mut self, getter: Value, setter: Value) -> ObjectId {
        self.alloc(HeapObject::AccessorPair { getter, setter })
    }

    pub fn new_shape(&mut self, shape: Shape) -> ShapeId {
        ShapeId::from_object(self.alloc(HeapObject::Shape(shape)))
    }

    pub fn new_context(&mut self, context: Context) -> ObjectId {
        self.alloc(HeapObject::Context(context))
    }

    /// Function scope nested in `previous`.
    pub fn new_function_context(&mut self, previous: ObjectId, closure: Option<ObjectId>, slots: Vec<ContextSlot>) -> ObjectId {
        self.new_context(Context {
            kind: ContextKind::Function,
            previous: Some(previous),
            closure,
            slots,
        })
    }

    pub fn add_script(&mut self, name: &str, source: &str) -> ScriptId {
        self.scripts.alloc(Script {
            name: name.to_string(),
            source: source.to_string(),
        })
    }

    /// Allocate a shared unit and append it to its outer unit's inner list.
    pub fn new_shared_function(&mut self, info: SharedFunctionInfo) -> ObjectId {
        let outer = info.outer;
        let id = self.alloc(HeapObject::SharedFunction(info));
        if let Some(parent) = outer.and_then(|outer| self.shared_mut(outer)) {
            parent.inner.push(Some(id));
        }
        id
    }

    /// Closure over `shared` created in `context`, with the root closure shape.
    pub fn new_closure(&mut self, shared: ObjectId, context: ObjectId) -> ObjectId {
        let shape = self.root_shape(RootIndex::FunctionShape);
        self.alloc(HeapObject::Function(JsFunction {
            shared,
            context,
            shape,
            prototype: Value::Empty,
            initial_shape: None,
            literals: Value::Empty,
        }))
    }

    /// Literals array of `function`, created empty on first use.
    pub fn ensure_literals(&mut self, function: ObjectId) -> Option<ObjectId> {
        if let Some(array) = self.function(function)?.literals.as_object() {
            return Some(array);
        }
        let array = self.new_fixed_array(Vec::new());
        self.function_mut(function)?.literals = Value::Object(array);
        Some(array)
    }

    /// Top-level-or-nested script function: a fresh shared unit plus closure.
    pub fn new_script_function(
        &mut self,
        script: ScriptId,
        name: &str,
        start_position: i32,
        end_position: i32,
        context: ObjectId,
        outer: Option<ObjectId>,
    ) -> ObjectId {
        let mut info = SharedFunctionInfo::from_script(name, script, start_position, end_position);
        info.outer = outer;
        let shared = self.new_shared_function(info);
        self.new_closure(shared, context)
    }

    // =========================================================================
    // Shape Tree
    // =========================================================================

    /// Index of the own descriptor named `key`.
    pub fn descriptor_index(&self, shape: ShapeId, key: ObjectId) -> Option<usize> {
        self.shape(shape)
            .descriptors()
            .iter()
            .position(|d| self.names_equal(d.key, key))
    }

    /// Targets of every transition from `shape` keyed by `key`.
    pub fn transitions_for(&self, shape: ShapeId, key: ObjectId) -> SmallVec<[ShapeId; 2]> {
        self.shape(shape)
            .transitions
            .iter()
            .filter(|t| self.names_equal(t.key, key))
            .map(|t| t.target)
            .collect()
    }

    /// First transition target keyed by `key`.
    pub fn find_transition(&self, shape: ShapeId, key: ObjectId) -> Option<ShapeId> {
        self.transitions_for(shape, key).first().copied()
    }

    /// Record `parent --key--> child` and point `child` back at `parent`.
    pub fn connect_transition(&mut self, parent: ShapeId, key: ObjectId, child: ShapeId) {
        self.shape_mut(child).back_pointer = Some(parent);
        self.shape_mut(parent).transitions.push(Transition { key, target: child });
    }

    /// Shape reached from `parent` by adding one descriptor.
    ///
    /// Reuses an existing transition whose added descriptor matches exactly.
    pub fn add_descriptor_transition(&mut self, parent: ShapeId, key: ObjectId, details: PropertyDetails, value: Value) -> ShapeId {
        for target in self.transitions_for(parent, key) {
            let last = self.shape(target).descriptors().last();
            if last.is_some_and(|d| d.details == details && d.value == value) {
                return target;
            }
        }

        let parent_shape = self.shape(parent);
        let mut child = parent_shape.copy_drop_descriptors();
        let mut descriptors = parent_shape.descriptors().to_vec();
        descriptors.push(Descriptor { key, details, value });
        child.set_descriptors(descriptors);
        if details.location() == PropertyLocation::Field {
            child.unused_property_fields = (parent_shape.unused_property_fields - 1).max(0);
        }
        let child = self.new_shape(child);
        self.connect_transition(parent, key, child);
        child
    }

    /// Shape reached from `parent` through the special transition `symbol`.
    /// The child keeps every descriptor of the parent.
    pub fn add_special_transition(&mut self, parent: ShapeId, symbol: ObjectId) -> ShapeId {
        if let Some(target) = self.find_transition(parent, symbol) {
            return target;
        }
        let parent_shape = self.shape(parent);
        let mut child = parent_shape.copy_drop_descriptors();
        child.set_descriptors(parent_shape.descriptors().to_vec());
        let child = self.new_shape(child);
        self.connect_transition(parent, symbol, child);
        child
    }

    /// Descriptor-less copy of `parent` that points back at it without being
    /// reachable through a transition.
    pub fn clone_shape(&mut self, parent: ShapeId) -> ShapeId {
        let mut child = self.shape(parent).copy_drop_descriptors();
        child.back_pointer = Some(parent);
        self.new_shape(child)
    }

    /// Relaxed structural equality used to merge freshly loaded shapes with
    /// existing ones. Count-only fields are ignored.
    pub fn shapes_equivalent_for_dedup(&self, a: ShapeId, b: ShapeId) -> bool {
        if a == b {
            return true;
        }
        let (x, y) = (self.shape(a), self.shape(b));
        x.header_equivalent_for_dedup(y)
            && x
                .descriptors()
                .iter()
                .zip(y.descriptors())
                .all(|(d, e)| self.names_equal(d.key, e.key))
    }

    // =========================================================================
    // Objects
    // =========================================================================

    fn empty_fixed_array(&self) -> ObjectId {
        self.root(RootIndex::EmptyFixedArray)
            .as_object()
            .unwrap_or_else(|| panic!("empty fixed array root is not initialized"))
    }

    /// Plain object built by one field transition per property, starting at
    /// the root object shape.
    pub fn new_plain_object(&mut self, properties: &[(&str, Value)]) -> ObjectId {
        let root = self.root_shape(RootIndex::ObjectShape);
        self.new_object_from(root, properties)
    }

    /// Object built by one field transition per property from `root`.
    pub fn new_object_from(&mut self, root: ShapeId, properties: &[(&str, Value)]) -> ObjectId {
        let mut shape = root;
        let mut fields = Vec::with_capacity(properties.len());
        for (index, &(name, value)) in properties.iter().enumerate() {
            let key = self.internalize(name);
            let representation = match value {
                Value::Smi(_) => Representation::Smi,
                _ => Representation::Tagged,
            };
            let details = PropertyDetails::field(PropertyAttributes::empty(), representation, index as u32);
            shape = self.add_descriptor_transition(shape, key, details, Value::Empty);
            fields.push(value);
        }
        let properties = self.new_fixed_array(fields);
        let elements = self.empty_fixed_array();
        self.new_object(shape, elements, properties)
    }

    /// Install a constant property on an object or function by moving the
    /// holder to a child shape.
    pub fn define_constant(&mut self, holder: ObjectId, name: &str, value: Value, attributes: PropertyAttributes) {
        let key = self.internalize(name);
        let old = self
            .shape_of(holder)
            .unwrap_or_else(|| panic!("{} has no shape", holder));
        let new = self.add_descriptor_transition(old, key, PropertyDetails::constant(attributes), value);
        match &mut self.objects[holder] {
            HeapObject::Object(o) => o.shape = new,
            HeapObject::Boxed(b) => b.object.shape = new,
            HeapObject::Function(f) => f.shape = new,
            _ => unreachable!("shape_of returned a shape for a shapeless object"),
        }
    }

    /// Own property `name` of a shape-bearing object.
    pub fn get_property(&self, holder: ObjectId, name: &str) -> Option<Value> {
        if name == "prototype" {
            if let Some(function) = self.function(holder) {
                if !function.prototype.is_empty() {
                    return Some(function.prototype);
                }
            }
        }
        let shape = self.shape_of(holder)?;
        let descriptor = self
            .shape(shape)
            .descriptors()
            .iter()
            .find(|d| self.name_is(d.key, name))?;
        match descriptor.details.location() {
            PropertyLocation::Descriptor => Some(descriptor.value),
            PropertyLocation::Field => {
                let properties = self.js_object(holder)?.properties;
                self.fixed_array(properties)?
                    .get(descriptor.details.field_index() as usize)
                    .copied()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Factory Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_internalize_shares_strings() {
        let mut heap = Heap::new();
        let a = heap.internalize("answer");
        let b = heap.new_string("answer", true);
        let c = heap.new_string("answer", false);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(heap.names_equal(a, c));
        assert!(!heap.string(c).unwrap().interned);
    }

    #[test]
    fn test_root_index_lookup() {
        let heap = Heap::new();
        let null = heap.null_value();
        assert_eq!(heap.root_index_of(null), Some(RootIndex::Null));
        assert_eq!(heap.root_index_of(Value::Smi(0)), None);
        assert_eq!(heap.root_index_of(Value::Empty), None);
    }

    // -------------------------------------------------------------------------
    // Shape Tree Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_plain_objects_share_transitions() {
        let mut heap = Heap::new();
        let a = heap.new_plain_object(&[("x", Value::Smi(1)), ("y", Value::Smi(2))]);
        let b = heap.new_plain_object(&[("x", Value::Smi(3)), ("y", Value::Smi(4))]);
        assert_eq!(heap.shape_of(a), heap.shape_of(b));

        let shape = heap.shape_of(a).unwrap();
        assert_eq!(heap.shape(shape).own_descriptor_count(), 2);
        let parent = heap.shape(shape).back_pointer.unwrap();
        assert_eq!(heap.shape(parent).own_descriptor_count(), 1);
        assert_eq!(heap.get_property(b, "y"), Some(Value::Smi(4)));
    }

    #[test]
    fn test_transition_key_to_finds_edge() {
        let mut heap = Heap::new();
        let obj = heap.new_plain_object(&[("x", Value::Smi(1))]);
        let child = heap.shape_of(obj).unwrap();
        let root = heap.root_shape(RootIndex::ObjectShape);
        let key = heap.shape(root).transition_key_to(child).unwrap();
        assert!(heap.name_is(key, "x"));
    }

    #[test]
    fn test_special_transition_keeps_descriptors() {
        let mut heap = Heap::new();
        let obj = heap.new_plain_object(&[("x", Value::Smi(1))]);
        let shape = heap.shape_of(obj).unwrap();
        let frozen = heap.root(RootIndex::FrozenSymbol).as_object().unwrap();
        let child = heap.add_special_transition(shape, frozen);
        assert_eq!(heap.shape(child).own_descriptor_count(), 1);
        assert_eq!(heap.add_special_transition(shape, frozen), child);
        assert_eq!(heap.shape(child).back_pointer, Some(shape));
    }

    #[test]
    fn test_clone_shape_is_not_a_transition() {
        let mut heap = Heap::new();
        let obj = heap.new_plain_object(&[("x", Value::Smi(1))]);
        let shape = heap.shape_of(obj).unwrap();
        let clone = heap.clone_shape(shape);
        assert_eq!(heap.shape(clone).own_descriptor_count(), 0);
        assert_eq!(heap.shape(clone).back_pointer, Some(shape));
        assert!(heap.shape(shape).transition_key_to(clone).is_none());
    }

    #[test]
    fn test_dedup_equivalence_compares_names_by_text() {
        let mut heap = Heap::new();
        let root = heap.root_shape(RootIndex::ObjectShape);
        let key_a = heap.new_string("x", false);
        let key_b = heap.new_string("x", false);
        let details = PropertyDetails::field(PropertyAttributes::empty(), Representation::Tagged, 0);

        let mut a = heap.shape(root).copy_drop_descriptors();
        a.set_descriptors(vec![Descriptor { key: key_a, details, value: Value::Empty }]);
        let mut b = a.clone();
        b.set_descriptors(vec![Descriptor { key: key_b, details, value: Value::Empty }]);
        b.unused_property_fields = 0;

        let a = heap.new_shape(a);
        let b = heap.new_shape(b);
        assert!(heap.shapes_equivalent_for_dedup(a, b));

        let key_c = heap.internalize("z");
        let mut c = heap.shape(root).copy_drop_descriptors();
        c.set_descriptors(vec![Descriptor { key: key_c, details, value: Value::Empty }]);
        let c = heap.new_shape(c);
        assert!(!heap.shapes_equivalent_for_dedup(a, c));
    }

    #[test]
    fn test_values_equivalent_by_contents() {
        let mut heap = Heap::new();
        let a = Value::Object(heap.new_string("hi", false));
        let b = Value::Object(heap.new_string("hi", true));
        let c = Value::Object(heap.new_string("ho", false));
        assert!(heap.values_equivalent(a, b));
        assert!(!heap.values_equivalent(a, c));

        let nan = Value::Object(heap.new_number(f64::NAN));
        let other_nan = Value::Object(heap.new_number(f64::NAN));
        let zero = Value::Object(heap.new_number(0.0));
        let negative_zero = Value::Object(heap.new_number(-0.0));
        assert!(heap.values_equivalent(nan, other_nan));
        assert!(!heap.values_equivalent(zero, negative_zero));

        let x = Value::Object(heap.new_plain_object(&[]));
        let y = Value::Object(heap.new_plain_object(&[]));
        assert!(heap.values_equivalent(x, x));
        assert!(!heap.values_equivalent(x, y));
        assert!(!heap.values_equivalent(Value::Smi(1), a));
    }

    #[test]
    #[should_panic(expected = "not a shape")]
    fn test_shape_accessor_panics_on_wrong_kind() {
        let mut heap = Heap::new();
        let number = heap.new_number(1.0);
        heap.shape(ShapeId::from_object(number));
    }
}
