//! Process bootstrap.
//!
//! Every heap is created by the same deterministic sequence: roots first,
//! then the native functions, constructors, and the `Math` namespace. Two
//! heaps built by [`Heap::new`] therefore agree on every stable root and
//! every builtin, which is what lets a compiled unit saved in one process be
//! re-resolved in another.

use rustc_hash::FxHashMap;

use crate::function::{BuiltinFunctionId, ScriptId, SharedFunctionInfo};
use crate::heap::Heap;
use crate::object::{InstanceType, OddballKind};
use crate::roots::RootIndex;
use crate::shape::{PropertyAttributes, Shape};
use crate::value::{ObjectId, Value};

/// Native functions, by source name, with their builtin id if they have one.
const NATIVES: &[(&str, Option<BuiltinFunctionId>)] = &[
    ("Object", None),
    ("ObjectKeys", None),
    ("ObjectFreeze", None),
    ("ObjectHasOwnProperty", None),
    ("ObjectToString", None),
    ("ObjectValueOf", None),
    ("Array", None),
    ("ArrayIsArray", None),
    ("ArrayPush", Some(BuiltinFunctionId::ArrayPush)),
    ("ArrayPop", Some(BuiltinFunctionId::ArrayPop)),
    ("ArrayShift", Some(BuiltinFunctionId::ArrayShift)),
    ("ArrayJoin", None),
    ("ArrayForEach", None),
    ("String", None),
    ("StringFromCharCode", Some(BuiltinFunctionId::StringFromCharCode)),
    ("StringCharCodeAt", Some(BuiltinFunctionId::StringCharCodeAt)),
    ("StringCharAt", Some(BuiltinFunctionId::StringCharAt)),
    ("StringTrim", None),
    ("Number", None),
    ("NumberToFixed", None),
    ("MathFloor", Some(BuiltinFunctionId::MathFloor)),
    ("MathRound", Some(BuiltinFunctionId::MathRound)),
    ("MathAbs", Some(BuiltinFunctionId::MathAbs)),
    ("MathSqrt", Some(BuiltinFunctionId::MathSqrt)),
    ("MathMax", Some(BuiltinFunctionId::MathMax)),
    ("MathMin", Some(BuiltinFunctionId::MathMin)),
    ("MathPow", Some(BuiltinFunctionId::MathPow)),
    ("MathExp", Some(BuiltinFunctionId::MathExp)),
    ("MathLog", Some(BuiltinFunctionId::MathLog)),
    ("MathImul", Some(BuiltinFunctionId::MathImul)),
    ("ToNumber", None),
    ("ToString", None),
    ("NonNumberToNumber", None),
    ("InstanceOf", None),
];

/// Name of the script holding native function sources.
pub const NATIVES_SCRIPT_NAME: &str = "natives";

const HIDDEN: PropertyAttributes = PropertyAttributes::DONT_ENUM;

/// Source text and positions of the native functions.
struct Natives {
    script: ScriptId,
    positions: FxHashMap<&'static str, (i32, i32)>,
    builtins: FxHashMap<&'static str, BuiltinFunctionId>,
}

impl Natives {
    fn install(heap: &mut Heap) -> Self {
        let mut source = String::new();
        let mut positions = FxHashMap::default();
        let mut builtins = FxHashMap::default();
        for &(name, builtin) in NATIVES {
            source.push_str("function ");
            source.push_str(name);
            let start = source.len() as i32;
            source.push_str("() { [native code] }");
            positions.insert(name, (start, source.len() as i32));
            source.push('\n');
            if let Some(id) = builtin {
                builtins.insert(name, id);
            }
        }
        let script = heap.add_script(NATIVES_SCRIPT_NAME, &source);
        Natives {
            script,
            positions,
            builtins,
        }
    }

    /// Closure for the native `name`, installed on the builtins object too.
    fn function(&self, heap: &mut Heap, name: &'static str) -> ObjectId {
        let &(start, end) = self
            .positions
            .get(name)
            .unwrap_or_else(|| panic!("native `{}` is not declared", name));
        let mut info = SharedFunctionInfo::from_script(name, self.script, start, end);
        info.native = true;
        info.builtin = self.builtins.get(name).copied();
        let shared = heap.new_shared_function(info);
        let context = heap.native_context();
        let function = heap.new_closure(shared, context);
        heap.builtins_mut().define(
            name,
            Value::Object(function),
            PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_DELETE,
        );
        function
    }

    fn define_method(&self, heap: &mut Heap, holder: ObjectId, property: &str, native: &'static str) {
        let function = self.function(heap, native);
        heap.define_constant(holder, property, Value::Object(function), HIDDEN);
    }
}

impl Heap {
    /// A freshly bootstrapped heap.
    pub fn new() -> Self {
        let mut heap = Heap::empty();
        heap.install_roots();
        let natives = Natives::install(&mut heap);
        heap.install_object(&natives);
        heap.install_constructors(&natives);
        heap.install_math(&natives);
        for name in ["ToNumber", "ToString", "NonNumberToNumber", "InstanceOf"] {
            natives.function(&mut heap, name);
        }

        let undefined = heap.undefined_value();
        let nan = heap.root(RootIndex::NanValue);
        let frozen = PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM | PropertyAttributes::DONT_DELETE;
        heap.global_mut().define("undefined", undefined, frozen);
        heap.global_mut().define("NaN", nan, frozen);
        heap
    }

    fn install_roots(&mut self) {
        for (kind, index) in OddballKind::ALL.into_iter().zip(RootIndex::ALL) {
            let oddball = self.new_oddball(kind);
            self.set_root(index, Value::Object(oddball));
        }

        let empty_string = self.internalize("");
        self.set_root(RootIndex::EmptyString, Value::Object(empty_string));
        let empty_fixed = self.new_fixed_array(Vec::new());
        self.set_root(RootIndex::EmptyFixedArray, Value::Object(empty_fixed));
        let empty_double = self.new_double_array(Vec::new());
        self.set_root(RootIndex::EmptyDoubleArray, Value::Object(empty_double));
        let nan = self.new_number(f64::NAN);
        self.set_root(RootIndex::NanValue, Value::Object(nan));

        let function_shape = self.new_shape(Shape::new(InstanceType::Function, 64, 0));
        self.set_root(RootIndex::FunctionShape, function_shape.into());

        for (index, description, private) in [
            (RootIndex::IteratorSymbol, "Symbol.iterator", false),
            (RootIndex::ToPrimitiveSymbol, "Symbol.toPrimitive", false),
            (RootIndex::ElementsTransitionSymbol, "elements_transition_symbol", true),
            (RootIndex::FrozenSymbol, "frozen_symbol", true),
            (RootIndex::ObservedSymbol, "observed_symbol", true),
        ] {
            let symbol = self.new_symbol(Some(description), private);
            self.set_root(index, Value::Object(symbol));
        }
    }

    fn install_object(&mut self, natives: &Natives) {
        let object_fn = natives.function(self, "Object");

        let mut proto_shape = Shape::new(InstanceType::Object, 32, 4);
        proto_shape.constructor = Value::Object(object_fn);
        proto_shape.prototype = self.null_value();
        let proto_shape = self.new_shape(proto_shape);
        let empty = self.new_fixed_array(Vec::new());
        let elements = self.new_fixed_array(Vec::new());
        let object_prototype = self.new_object(proto_shape, elements, empty);

        let mut object_shape = Shape::new(InstanceType::Object, 32, 4);
        object_shape.constructor = Value::Object(object_fn);
        object_shape.prototype = Value::Object(object_prototype);
        let object_shape = self.new_shape(object_shape);
        self.set_root(RootIndex::ObjectShape, object_shape.into());

        if let Some(function) = self.function_mut(object_fn) {
            function.prototype = Value::Object(object_prototype);
            function.initial_shape = Some(object_shape);
        }

        self.define_constant(object_prototype, "constructor", Value::Object(object_fn), HIDDEN);
        natives.define_method(self, object_prototype, "hasOwnProperty", "ObjectHasOwnProperty");
        natives.define_method(self, object_prototype, "toString", "ObjectToString");
        natives.define_method(self, object_prototype, "valueOf", "ObjectValueOf");
        natives.define_method(self, object_fn, "keys", "ObjectKeys");
        natives.define_method(self, object_fn, "freeze", "ObjectFreeze");
        self.global_mut().define("Object", Value::Object(object_fn), HIDDEN);
    }

    /// Constructor whose instances get a fresh root shape of `instance_type`.
    fn install_constructor(&mut self, natives: &Natives, name: &'static str, instance_type: InstanceType) -> (ObjectId, ObjectId) {
        let constructor = natives.function(self, name);
        let prototype = self.new_plain_object(&[]);

        let mut initial = Shape::new(instance_type, 32, 4);
        initial.constructor = Value::Object(constructor);
        initial.prototype = Value::Object(prototype);
        let initial = self.new_shape(initial);

        if let Some(function) = self.function_mut(constructor) {
            function.prototype = Value::Object(prototype);
            function.initial_shape = Some(initial);
        }
        self.define_constant(prototype, "constructor", Value::Object(constructor), HIDDEN);
        self.global_mut().define(name, Value::Object(constructor), HIDDEN);
        (constructor, prototype)
    }

    fn install_constructors(&mut self, natives: &Natives) {
        let (array, array_proto) = self.install_constructor(natives, "Array", InstanceType::Array);
        natives.define_method(self, array, "isArray", "ArrayIsArray");
        natives.define_method(self, array_proto, "push", "ArrayPush");
        natives.define_method(self, array_proto, "pop", "ArrayPop");
        natives.define_method(self, array_proto, "shift", "ArrayShift");
        natives.define_method(self, array_proto, "join", "ArrayJoin");
        natives.define_method(self, array_proto, "forEach", "ArrayForEach");

        let (string, string_proto) = self.install_constructor(natives, "String", InstanceType::BoxedValue);
        natives.define_method(self, string, "fromCharCode", "StringFromCharCode");
        natives.define_method(self, string_proto, "charCodeAt", "StringCharCodeAt");
        natives.define_method(self, string_proto, "charAt", "StringCharAt");
        natives.define_method(self, string_proto, "trim", "StringTrim");

        let (_, number_proto) = self.install_constructor(natives, "Number", InstanceType::BoxedValue);
        natives.define_method(self, number_proto, "toFixed", "NumberToFixed");
    }

    fn install_math(&mut self, natives: &Natives) {
        let math = self.new_plain_object(&[]);
        for (property, native) in [
            ("floor", "MathFloor"),
            ("round", "MathRound"),
            ("abs", "MathAbs"),
            ("sqrt", "MathSqrt"),
            ("max", "MathMax"),
            ("min", "MathMin"),
            ("pow", "MathPow"),
            ("exp", "MathExp"),
            ("log", "MathLog"),
            ("imul", "MathImul"),
        ] {
            natives.define_method(self, math, property, native);
        }
        self.global_mut().define("Math", Value::Object(math), HIDDEN);
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_are_populated() {
        let heap = Heap::new();
        for index in RootIndex::ALL {
            assert!(!heap.root(index).is_empty(), "root {:?} unset", index);
        }
    }

    #[test]
    fn test_two_heaps_agree_on_builtins() {
        let a = Heap::new();
        let b = Heap::new();
        assert_eq!(a.object_count(), b.object_count());
        for id in BuiltinFunctionId::ALL {
            assert_eq!(a.builtin_function(id), b.builtin_function(id));
        }
    }

    #[test]
    fn test_natives_source_positions_point_at_parameters() {
        let heap = Heap::new();
        let keys = heap.lookup_path("Object").and_then(|v| heap.get_property(v.as_object().unwrap(), "keys"));
        let keys = keys.and_then(Value::as_object).unwrap();
        let shared = heap.shared_of(keys);
        let source = &heap.script(shared.script.unwrap()).source;
        let start = shared.start_position as usize;
        assert_eq!(&source[start - "ObjectKeys".len()..start], "ObjectKeys");
        assert_eq!(&source[start..start + 1], "(");
    }

    #[test]
    fn test_prototype_chain_shapes() {
        let heap = Heap::new();
        let object_shape = heap.root_shape(RootIndex::ObjectShape);
        let object_fn = heap.lookup_global("Object").unwrap();
        assert_eq!(heap.shape(object_shape).constructor, object_fn);
        let proto = heap.get_property(object_fn.as_object().unwrap(), "prototype").unwrap();
        assert_eq!(heap.shape(object_shape).prototype, proto);
    }

    #[test]
    fn test_global_constructors_are_hidden() {
        let heap = Heap::new();
        let entry = heap
            .global()
            .entries()
            .iter()
            .find(|e| e.key.as_str() == Some("Array"))
            .unwrap();
        assert!(entry.attributes.contains(PropertyAttributes::DONT_ENUM));
    }
}
