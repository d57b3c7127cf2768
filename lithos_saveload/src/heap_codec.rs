//! Heap value codec.
//!
//! ```text
//!   value   := u8 tag { 0 heap, 1 smi, 2 empty }
//!              heap  → u8 instance type, variant payload
//!              smi   → i32
//!   name    := bool is_string, string | symbol
//!   string  := bytes, bool interned
//!   symbol  := u16 root index | NOT_FOUND, str key, str name
//! ```
//!
//! Process singletons carry no payload and load as the destination's own
//! instance. Functions, shared units and shapes defer to their codecs.

use lithos_heap::{
    AccessorId, ElementsKind, HeapObject, InstanceType, JsObject, JsString, ObjectId, OddballKind, RegExpFlags,
    RootIndex, ShapeId, TypedArrayKind, Value,
};

use crate::context::{Loader, Saver};
use crate::error::{SaveloadError, SaveloadResult};

/// Discriminant of a saved [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ObjectTag {
    HeapObject = 0,
    Smi = 1,
    Empty = 2,
}

impl ObjectTag {
    const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ObjectTag::HeapObject,
            1 => ObjectTag::Smi,
            2 => ObjectTag::Empty,
            _ => return None,
        })
    }
}

// =============================================================================
// Save
// =============================================================================

impl<'h> Saver<'h> {
    pub(crate) fn save_object(&mut self, value: Value) -> SaveloadResult<()> {
        self.stream.check()?;
        match value {
            Value::Empty => self.stream.write(ObjectTag::Empty as u8),
            Value::Smi(v) => {
                self.stream.write(ObjectTag::Smi as u8);
                self.stream.write(v);
            }
            Value::Object(id) => {
                self.stream.write(ObjectTag::HeapObject as u8);
                self.save_heap_object(id)?;
            }
        }
        self.stream.check()
    }

    fn save_heap_object(&mut self, id: ObjectId) -> SaveloadResult<()> {
        let heap = self.heap;
        let object = heap.get(id);
        self.stream.write(object.instance_type() as u8);

        match object {
            HeapObject::Oddball(kind) => self.stream.write(*kind as u8),
            HeapObject::Number(value) => self.stream.write(*value),
            HeapObject::String(string) => self.save_string(string),
            HeapObject::Symbol(_) => self.save_symbol(id)?,
            HeapObject::RegExp(regexp) => {
                self.save_string_object(regexp.pattern);
                self.stream.write_str(&regexp.flags.to_flag_string());
            }
            HeapObject::FixedArray(items) => {
                self.stream.write(items.len() as u32);
                for &item in items {
                    self.save_object(item)?;
                }
            }
            HeapObject::DoubleArray(items) => {
                self.stream.write(items.len() as u32);
                for &item in items {
                    self.stream.write(item);
                }
            }
            HeapObject::Array(array) => {
                self.stream.write(array.kind as u8);
                self.save_object(array.length)?;
                if !array.length.is_empty() {
                    self.save_object(Value::Object(array.elements))?;
                }
            }
            HeapObject::ArrayBuffer(bytes) => self.stream.write_bytes(bytes),
            HeapObject::TypedArray(typed) => {
                self.stream.write(typed.kind as u8);
                self.save_object(Value::Object(typed.buffer))?;
                self.stream.write(typed.byte_offset as u64);
                self.stream.write(typed.length as u64);
            }
            HeapObject::Function(_) => self.save_function(id)?,
            HeapObject::SharedFunction(_) => self.save_shared(id)?,
            HeapObject::Shape(_) => self.save_shape(ShapeId::from_object(id))?,
            HeapObject::Object(object) => self.save_js_object(object)?,
            HeapObject::Boxed(boxed) => {
                self.save_js_object(&boxed.object)?;
                self.save_object(boxed.value)?;
            }
            HeapObject::AccessorInfo(info) => {
                self.save_object(info.getter)?;
                self.save_object(info.setter)?;
                self.save_object(info.data)?;
            }
            HeapObject::Foreign(foreign) => match foreign.accessor {
                Some(accessor) => self.stream.write(accessor as u8),
                None => panic!("unknown native pointer in foreign {}", id),
            },
            HeapObject::Context(_) if heap.is_top_level_context(id) => {}
            HeapObject::Context(_) => self.save_context(id)?,
            HeapObject::GlobalObject
            | HeapObject::GlobalProxy
            | HeapObject::BuiltinsObject
            | HeapObject::AllocationSite
            | HeapObject::AccessorPair { .. } => {}
        }
        self.stream.check()
    }

    fn save_js_object(&mut self, object: &JsObject) -> SaveloadResult<()> {
        self.save_shape(object.shape)?;
        self.save_object(Value::Object(object.elements))?;
        self.save_object(Value::Object(object.properties))
    }

    fn save_string(&mut self, string: &JsString) {
        self.stream.write_str(&string.text);
        self.stream.write_bool(string.interned);
    }

    fn save_string_object(&mut self, id: ObjectId) {
        let heap = self.heap;
        match heap.string(id) {
            Some(string) => self.save_string(string),
            None => panic!("{} is not a string", id),
        }
    }

    fn save_symbol(&mut self, id: ObjectId) -> SaveloadResult<()> {
        let heap = self.heap;
        if let Some(root) = heap.root_index_of(Value::Object(id)) {
            self.stream.write(root as u16);
            return self.stream.check();
        }
        self.stream.write(RootIndex::NOT_FOUND);
        match heap.symbol_registry().find(id) {
            Some((key, name)) => {
                self.stream.write_str(key);
                self.stream.write_str(name);
                self.stream.check()
            }
            None => self.fail(SaveloadError::UnregisteredSymbol),
        }
    }

    /// A property name: a string or a symbol.
    pub(crate) fn save_name(&mut self, name: ObjectId) -> SaveloadResult<()> {
        let heap = self.heap;
        match heap.get(name) {
            HeapObject::String(string) => {
                self.stream.write_bool(true);
                self.save_string(string);
                self.stream.check()
            }
            HeapObject::Symbol(_) => {
                self.stream.write_bool(false);
                self.save_symbol(name)
            }
            other => panic!("name {} is a {}", name, other.instance_type()),
        }
    }

    /// A context on the compiled closure's scope chain, by hop count.
    fn save_context(&mut self, id: ObjectId) -> SaveloadResult<()> {
        let heap = self.heap;
        let mut current = Some(self.info.context(heap));
        let mut depth = 0u32;
        while let Some(context) = current {
            if context == id {
                self.stream.write(depth);
                return self.stream.check();
            }
            depth += 1;
            current = heap.context(context).and_then(|c| c.previous);
        }
        self.fail(SaveloadError::UnreachableContext)
    }
}

// =============================================================================
// Load
// =============================================================================

impl<'a, 'h> Loader<'a, 'h> {
    pub(crate) fn load_object(&mut self) -> SaveloadResult<Value> {
        let raw = self.stream.read::<u8>()?;
        let Some(tag) = ObjectTag::from_u8(raw) else {
            panic!("unknown object tag {}", raw);
        };
        match tag {
            ObjectTag::HeapObject => self.load_heap_object(),
            ObjectTag::Smi => Ok(Value::Smi(self.stream.read::<i32>()?)),
            ObjectTag::Empty => Ok(Value::Empty),
        }
    }

    /// A value that must be a heap object.
    pub(crate) fn load_object_id(&mut self) -> SaveloadResult<ObjectId> {
        match self.load_object()? {
            Value::Object(id) => Ok(id),
            other => panic!("expected a heap object, loaded {}", other),
        }
    }

    fn load_heap_object(&mut self) -> SaveloadResult<Value> {
        let raw = self.stream.read::<u8>()?;
        let Some(instance_type) = InstanceType::from_u8(raw) else {
            panic!("unknown instance type tag {}", raw);
        };

        let id = match instance_type {
            InstanceType::Oddball => {
                let raw = self.stream.read::<u8>()?;
                let Some(kind) = OddballKind::from_u8(raw) else {
                    panic!("unknown oddball kind {}", raw);
                };
                return Ok(self.heap.oddball(kind));
            }
            InstanceType::HeapNumber => {
                let value = self.stream.read::<f64>()?;
                self.heap.new_number(value)
            }
            InstanceType::String => self.load_string()?,
            InstanceType::Symbol => self.load_symbol()?,
            InstanceType::RegExp => {
                let pattern = self.load_string()?;
                let flags = self.stream.read_string()?;
                let Some(flags) = RegExpFlags::parse(&flags) else {
                    panic!("malformed regexp flags {:?}", flags);
                };
                self.heap.new_regexp(pattern, flags)
            }
            InstanceType::FixedArray => {
                let len = self.stream.read::<u32>()?;
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(self.load_object()?);
                }
                self.heap.new_fixed_array(items)
            }
            InstanceType::FixedDoubleArray => {
                let len = self.stream.read::<u32>()?;
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(self.stream.read::<f64>()?);
                }
                self.heap.new_double_array(items)
            }
            InstanceType::Array => {
                let raw = self.stream.read::<u8>()?;
                let Some(kind) = ElementsKind::from_u8(raw) else {
                    panic!("unknown elements kind {}", raw);
                };
                let length = self.load_object()?;
                if length.is_empty() {
                    self.heap.new_empty_array(kind)
                } else {
                    let elements = self.load_object_id()?;
                    self.heap.new_array(kind, length, elements)
                }
            }
            InstanceType::ArrayBuffer => {
                let bytes = self.stream.read_bytes()?.to_vec();
                self.heap.new_array_buffer(bytes)
            }
            InstanceType::TypedArray => {
                let raw = self.stream.read::<u8>()?;
                let Some(kind) = TypedArrayKind::from_u8(raw) else {
                    panic!("unknown typed array kind {}", raw);
                };
                let buffer = self.load_object_id()?;
                let byte_offset = self.stream.read::<u64>()? as usize;
                let length = self.stream.read::<u64>()? as usize;
                self.heap.new_typed_array(kind, buffer, byte_offset, length)
            }
            InstanceType::Function => self.load_function()?,
            InstanceType::SharedFunctionInfo => self.load_shared()?,
            InstanceType::Shape => return self.load_shape().map(Value::from),
            InstanceType::Object => {
                let object = self.load_js_object()?;
                self.heap.new_object(object.shape, object.elements, object.properties)
            }
            InstanceType::BoxedValue => {
                let object = self.load_js_object()?;
                let value = self.load_object()?;
                self.heap.new_boxed(object, value)
            }
            InstanceType::AccessorInfo => {
                let getter = self.load_object()?;
                let setter = self.load_object()?;
                let data = self.load_object()?;
                self.heap.new_accessor_info(getter, setter, data)
            }
            InstanceType::Foreign => {
                let raw = self.stream.read::<u8>()?;
                let Some(accessor) = AccessorId::from_u8(raw) else {
                    panic!("unknown native accessor {}", raw);
                };
                self.heap.new_foreign(Some(accessor))
            }
            InstanceType::Context => self.load_context()?,
            InstanceType::NativeContext => self.heap.native_context(),
            InstanceType::GlobalObject => self.heap.global_object(),
            InstanceType::GlobalProxy => self.heap.global_proxy(),
            InstanceType::BuiltinsObject => self.heap.builtins_object(),
            InstanceType::AllocationSite => return Ok(self.heap.undefined_value()),
            InstanceType::AccessorPair => return Ok(self.heap.null_value()),
        };
        Ok(Value::Object(id))
    }

    fn load_js_object(&mut self) -> SaveloadResult<JsObject> {
        let shape = self.load_shape()?;
        let elements = self.load_object_id()?;
        let properties = self.load_object_id()?;
        Ok(JsObject {
            shape,
            elements,
            properties,
        })
    }

    fn load_string(&mut self) -> SaveloadResult<ObjectId> {
        let text = self.stream.read_string()?;
        let interned = self.stream.read_bool()?;
        Ok(self.heap.new_string(&text, interned))
    }

    fn load_symbol(&mut self) -> SaveloadResult<ObjectId> {
        let raw = self.stream.read::<u16>()?;
        if raw != RootIndex::NOT_FOUND {
            let Some(root) = RootIndex::from_u16(raw) else {
                panic!("unknown root index {}", raw);
            };
            return match self.heap.root(root) {
                Value::Object(id) => Ok(id),
                other => panic!("root {:?} holds {}", root, other),
            };
        }
        let key = self.stream.read_string()?;
        let name = self.stream.read_string()?;
        match self.heap.symbol_registry().lookup(&key, &name) {
            Some(symbol) => Ok(symbol),
            None => self.fail(SaveloadError::NameNotFound {
                namespace: "symbol registry",
                name: format!("{}:{}", key, name),
            }),
        }
    }

    pub(crate) fn load_name(&mut self) -> SaveloadResult<ObjectId> {
        if self.stream.read_bool()? {
            self.load_string()
        } else {
            self.load_symbol()
        }
    }

    fn load_context(&mut self) -> SaveloadResult<ObjectId> {
        let depth = self.stream.read::<u32>()?;
        let heap = &*self.heap;
        let mut current = Some(self.info.context(heap));
        for _ in 0..depth {
            current = current.and_then(|c| heap.context(c)).and_then(|c| c.previous);
        }
        match current {
            Some(context) => Ok(context),
            None => self.fail(SaveloadError::UnreachableContext),
        }
    }
}
