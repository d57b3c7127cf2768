//! Function references.
//!
//! A closure cannot be saved by identity: the loading process allocates its
//! own. Instead the saver derives a *key* the destination can re-resolve,
//! trying each [`ResolveStrategy`] in order until one applies.
//!
//! ```text
//!   function ──► builtin id ──► context chain ──► global ──► start position
//!                                                                │
//!          original name ◄── global constructor / prototype ◄───┘
//! ```
//!
//! Shared function units are keyed separately: by builtin id for native
//! units, otherwise by the inner-unit indices leading to them from the root
//! of the compiled closure's unit tree.

use std::fmt;
use std::sync::LazyLock;

use lithos_heap::{BuiltinFunctionId, Heap, ObjectId, PropertyKey, Value};
use regex::Regex;

use crate::context::{Loader, Saver};
use crate::error::{SaveloadError, SaveloadResult};

// =============================================================================
// Keys
// =============================================================================

/// Wire tag of a function or shared unit reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionRelocation {
    ByBuiltinFunctionId = 0,
    ByPathFromRoot = 1,
    ByNameInContextChain = 2,
    ByNameInGlobalObject = 3,
    ByStartPosition = 4,
    ByOriginalName = 5,
    ByGlobalConstructor = 6,
    ByGlobalPrototype = 7,
}

impl FunctionRelocation {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => FunctionRelocation::ByBuiltinFunctionId,
            1 => FunctionRelocation::ByPathFromRoot,
            2 => FunctionRelocation::ByNameInContextChain,
            3 => FunctionRelocation::ByNameInGlobalObject,
            4 => FunctionRelocation::ByStartPosition,
            5 => FunctionRelocation::ByOriginalName,
            6 => FunctionRelocation::ByGlobalConstructor,
            7 => FunctionRelocation::ByGlobalPrototype,
            _ => return None,
        })
    }
}

/// Process-independent identity of a closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKey {
    Builtin(BuiltinFunctionId),
    NameInContextChain(String),
    NameInGlobalObject(String),
    StartPosition(i32),
    /// Descriptor `index` of the global constructor `name`.
    GlobalConstructor { name: String, index: u32 },
    /// Descriptor `index` of the prototype of the global constructor `name`.
    GlobalPrototype { name: String, index: u32 },
    /// Builtins-object property named after the function's source text.
    OriginalName(String),
}

impl FunctionKey {
    pub fn relocation(&self) -> FunctionRelocation {
        match self {
            FunctionKey::Builtin(_) => FunctionRelocation::ByBuiltinFunctionId,
            FunctionKey::NameInContextChain(_) => FunctionRelocation::ByNameInContextChain,
            FunctionKey::NameInGlobalObject(_) => FunctionRelocation::ByNameInGlobalObject,
            FunctionKey::StartPosition(_) => FunctionRelocation::ByStartPosition,
            FunctionKey::GlobalConstructor { .. } => FunctionRelocation::ByGlobalConstructor,
            FunctionKey::GlobalPrototype { .. } => FunctionRelocation::ByGlobalPrototype,
            FunctionKey::OriginalName(_) => FunctionRelocation::ByOriginalName,
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKey::Builtin(id) => write!(f, "builtin {}", id),
            FunctionKey::NameInContextChain(name) => write!(f, "context binding `{}`", name),
            FunctionKey::NameInGlobalObject(name) => write!(f, "global `{}`", name),
            FunctionKey::StartPosition(position) => write!(f, "start position {}", position),
            FunctionKey::GlobalConstructor { name, index } => write!(f, "{}[{}]", name, index),
            FunctionKey::GlobalPrototype { name, index } => write!(f, "{}.prototype[{}]", name, index),
            FunctionKey::OriginalName(name) => write!(f, "native `{}`", name),
        }
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// One way of turning a closure into a [`FunctionKey`].
///
/// `Ok(None)` means the strategy does not apply and the next one is tried.
/// `Err` ends the search.
pub trait ResolveStrategy: Sync {
    fn name(&self) -> &'static str;

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>>;
}

struct ByBuiltinId;
struct ByContextChain;
struct ByGlobalName;
struct ByStartPosition;
struct ByGlobalConstructor;
struct ByOriginalName;

/// Strategies in the order they are tried.
pub static STRATEGIES: &[&dyn ResolveStrategy] = &[
    &ByBuiltinId,
    &ByContextChain,
    &ByGlobalName,
    &ByStartPosition,
    &ByGlobalConstructor,
    &ByOriginalName,
];

impl ResolveStrategy for ByBuiltinId {
    fn name(&self) -> &'static str {
        "builtin id"
    }

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>> {
        Ok(resolver.heap.shared_of(function).builtin.map(FunctionKey::Builtin))
    }
}

impl ResolveStrategy for ByContextChain {
    fn name(&self) -> &'static str {
        "context chain"
    }

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>> {
        let heap = resolver.heap;
        let name = &heap.shared_of(function).name;
        if name.is_empty() {
            return Ok(None);
        }
        let bound = heap
            .lookup_context_chain(resolver.context, name)
            .and_then(|(context, slot)| heap.context_slot(context, slot));
        Ok((bound == Some(Value::Object(function))).then(|| FunctionKey::NameInContextChain(name.clone())))
    }
}

impl ResolveStrategy for ByGlobalName {
    fn name(&self) -> &'static str {
        "global object"
    }

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>> {
        let heap = resolver.heap;
        let name = &heap.shared_of(function).name;
        if name.is_empty() {
            return Ok(None);
        }
        let bound = heap.lookup_global(name);
        Ok((bound == Some(Value::Object(function))).then(|| FunctionKey::NameInGlobalObject(name.clone())))
    }
}

impl ResolveStrategy for ByStartPosition {
    fn name(&self) -> &'static str {
        "start position"
    }

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>> {
        let heap = resolver.heap;
        let shared = heap.shared_of(function);
        if shared.native || shared.builtin.is_some() {
            return Ok(None);
        }
        let context = match heap.function(function) {
            Some(f) => f.context,
            None => return Ok(None),
        };
        if !heap.is_top_level_context(context) {
            return Err(SaveloadError::InnerFunctionReference);
        }
        Ok(Some(FunctionKey::StartPosition(shared.start_position)))
    }
}

impl ResolveStrategy for ByGlobalConstructor {
    fn name(&self) -> &'static str {
        "global constructor"
    }

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>> {
        let heap = resolver.heap;
        let target = heap.function(function).map(|f| f.shared);
        let same_unit = |value: Value| {
            let shared = value.as_object().and_then(|id| heap.function(id)).map(|f| f.shared);
            shared.is_some() && shared == target
        };
        let index_in = |holder: ObjectId| {
            let shape = heap.shape_of(holder)?;
            heap.shape(shape)
                .descriptors()
                .iter()
                .position(|d| same_unit(d.value))
                .map(|index| index as u32)
        };

        for entry in heap.global().entries() {
            if entry.deleted {
                continue;
            }
            let PropertyKey::String(name) = &entry.key else {
                continue;
            };
            let Some(constructor) = entry.value.as_object() else {
                continue;
            };
            let Some(constructor_fn) = heap.function(constructor) else {
                continue;
            };
            if let Some(index) = index_in(constructor) {
                return Ok(Some(FunctionKey::GlobalConstructor {
                    name: name.clone(),
                    index,
                }));
            }
            if let Some(index) = constructor_fn.prototype.as_object().and_then(index_in) {
                return Ok(Some(FunctionKey::GlobalPrototype {
                    name: name.clone(),
                    index,
                }));
            }
        }
        Ok(None)
    }
}

/// Identifier immediately before a function's parameter list. Only ASCII
/// whitespace may separate the two.
static ORIGINAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9_]+)[ \t\n\r\x0b\x0c]*$").expect("identifier pattern is valid"));

impl ResolveStrategy for ByOriginalName {
    fn name(&self) -> &'static str {
        "original name"
    }

    fn try_resolve(&self, resolver: &FunctionResolver<'_>, function: ObjectId) -> SaveloadResult<Option<FunctionKey>> {
        let heap = resolver.heap;
        let shared = heap.shared_of(function);
        let Some(script) = shared.script else {
            return Ok(None);
        };
        let source = &heap.script(script).source;
        let Some(prefix) = usize::try_from(shared.start_position).ok().and_then(|start| source.get(..start)) else {
            return Ok(None);
        };
        let name = ORIGINAL_NAME
            .captures(prefix)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .filter(|&name| name != "function");
        Ok(name.map(|name| FunctionKey::OriginalName(name.to_string())))
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves closures to keys and back, relative to one scope.
pub struct FunctionResolver<'h> {
    heap: &'h Heap,
    /// Innermost context of lexical lookups: the compiled closure's.
    context: ObjectId,
}

impl<'h> FunctionResolver<'h> {
    pub fn new(heap: &'h Heap, context: ObjectId) -> Self {
        FunctionResolver { heap, context }
    }

    /// First key any strategy derives for `function`.
    pub fn resolve(&self, function: ObjectId) -> SaveloadResult<FunctionKey> {
        for strategy in STRATEGIES {
            if let Some(key) = strategy.try_resolve(self, function)? {
                return Ok(key);
            }
        }
        Err(SaveloadError::UnresolvableFunction)
    }

    /// The closure `key` denotes in this heap.
    pub fn locate(&self, key: &FunctionKey) -> SaveloadResult<ObjectId> {
        let heap = self.heap;
        match key {
            FunctionKey::Builtin(id) => heap.builtin_function(*id).ok_or_else(|| SaveloadError::NameNotFound {
                namespace: "builtins",
                name: id.to_string(),
            }),
            FunctionKey::NameInContextChain(name) => {
                let value = heap
                    .lookup_context_chain(self.context, name)
                    .and_then(|(context, slot)| heap.context_slot(context, slot));
                match value {
                    Some(value) => Ok(self.expect_function(value, name)),
                    None => Err(SaveloadError::NameNotFound {
                        namespace: "context chain",
                        name: name.clone(),
                    }),
                }
            }
            FunctionKey::NameInGlobalObject(name) => self.function_value(heap.lookup_global(name), "global object", name),
            FunctionKey::StartPosition(position) => heap
                .function_by_start_position(*position)
                .ok_or(SaveloadError::FunctionNotFound { position: *position }),
            FunctionKey::GlobalConstructor { name, index } => {
                let holder = heap.lookup_global(name).and_then(Value::as_object);
                let value = holder.and_then(|holder| self.descriptor_value(holder, *index));
                self.function_value(value, "global constructor", &format!("{}[{}]", name, index))
            }
            FunctionKey::GlobalPrototype { name, index } => {
                let prototype = heap
                    .lookup_global(name)
                    .and_then(Value::as_object)
                    .and_then(|constructor| heap.function(constructor))
                    .and_then(|constructor| constructor.prototype.as_object());
                let value = prototype.and_then(|prototype| self.descriptor_value(prototype, *index));
                self.function_value(value, "global prototype", &format!("{}.prototype[{}]", name, index))
            }
            FunctionKey::OriginalName(name) => self.function_value(heap.builtins().get(name), "builtins object", name),
        }
    }

    fn descriptor_value(&self, holder: ObjectId, index: u32) -> Option<Value> {
        let shape = self.heap.shape_of(holder)?;
        self.heap
            .shape(shape)
            .descriptors()
            .get(index as usize)
            .map(|d| d.value)
    }

    /// `value` if it is a closure, otherwise a missing-name failure.
    fn function_value(&self, value: Option<Value>, namespace: &'static str, name: &str) -> SaveloadResult<ObjectId> {
        value
            .and_then(Value::as_object)
            .filter(|&id| self.heap.function(id).is_some())
            .ok_or_else(|| SaveloadError::NameNotFound {
                namespace,
                name: name.to_string(),
            })
    }

    fn expect_function(&self, value: Value, name: &str) -> ObjectId {
        match value.as_object().filter(|&id| self.heap.function(id).is_some()) {
            Some(id) => id,
            None => panic!("context binding `{}` is not a function", name),
        }
    }
}

// =============================================================================
// Save / Load
// =============================================================================

/// Terminator of a path-from-root reference.
const PATH_END: i32 = -1;

impl<'h> Saver<'h> {
    pub(crate) fn save_function(&mut self, function: ObjectId) -> SaveloadResult<()> {
        let heap = self.heap;
        let resolver = FunctionResolver::new(heap, self.info.context(heap));
        let key = match resolver.resolve(function) {
            Ok(key) => key,
            Err(error) => {
                trace_saveload!(self.config, "could not save function `{}`: {}", heap.shared_of(function).name, error);
                return self.fail(error);
            }
        };

        self.stream.write(key.relocation() as u8);
        match &key {
            FunctionKey::Builtin(id) => self.stream.write(*id as u8),
            FunctionKey::NameInContextChain(name) | FunctionKey::NameInGlobalObject(name) | FunctionKey::OriginalName(name) => {
                self.stream.write_str(name)
            }
            FunctionKey::StartPosition(position) => self.stream.write(*position),
            FunctionKey::GlobalConstructor { name, index } | FunctionKey::GlobalPrototype { name, index } => {
                self.stream.write_str(name);
                self.stream.write(*index);
            }
        }
        self.stream.check()
    }

    /// A shared function unit: builtin id, or inner indices from the root of
    /// the compiled closure's unit tree, root first, ending in `-1`.
    pub(crate) fn save_shared(&mut self, shared: ObjectId) -> SaveloadResult<()> {
        let heap = self.heap;
        let Some(info) = heap.shared(shared) else {
            panic!("{} is not a shared function unit", shared);
        };
        if info.native {
            return match info.builtin {
                Some(id) => {
                    self.stream.write(FunctionRelocation::ByBuiltinFunctionId as u8);
                    self.stream.write(id as u8);
                    self.stream.check()
                }
                None => self.fail(SaveloadError::UnresolvableFunction),
            };
        }

        let root = heap.root_shared_function(self.info.shared(heap));
        if heap.root_shared_function(shared) != root {
            return self.fail(SaveloadError::SharedFunctionUnreachable);
        }

        let mut path = Vec::new();
        let mut current = shared;
        while let Some(outer) = heap.shared(current).and_then(|s| s.outer) {
            let start = heap.shared(current).map(|s| s.start_position);
            let index = heap.shared(outer).and_then(|parent| {
                parent
                    .inner
                    .iter()
                    .position(|slot| slot.and_then(|id| heap.shared(id)).map(|s| s.start_position) == start)
            });
            match index {
                Some(index) => path.push(index as i32),
                None => panic!("{} is missing from the inner units of {}", current, outer),
            }
            current = outer;
        }

        self.stream.write(FunctionRelocation::ByPathFromRoot as u8);
        for &index in path.iter().rev() {
            self.stream.write(index);
        }
        self.stream.write(PATH_END);
        self.stream.check()
    }
}

impl<'a, 'h> Loader<'a, 'h> {
    pub(crate) fn load_function(&mut self) -> SaveloadResult<ObjectId> {
        let raw = self.stream.read::<u8>()?;
        let key = match FunctionRelocation::from_u8(raw) {
            Some(FunctionRelocation::ByBuiltinFunctionId) => {
                let raw = self.stream.read::<u8>()?;
                match BuiltinFunctionId::from_u8(raw) {
                    Some(id) => FunctionKey::Builtin(id),
                    None => panic!("unknown builtin function id {}", raw),
                }
            }
            Some(FunctionRelocation::ByNameInContextChain) => FunctionKey::NameInContextChain(self.stream.read_string()?),
            Some(FunctionRelocation::ByNameInGlobalObject) => FunctionKey::NameInGlobalObject(self.stream.read_string()?),
            Some(FunctionRelocation::ByStartPosition) => FunctionKey::StartPosition(self.stream.read::<i32>()?),
            Some(FunctionRelocation::ByOriginalName) => FunctionKey::OriginalName(self.stream.read_string()?),
            Some(FunctionRelocation::ByGlobalConstructor) => {
                let name = self.stream.read_string()?;
                let index = self.stream.read::<u32>()?;
                FunctionKey::GlobalConstructor { name, index }
            }
            Some(FunctionRelocation::ByGlobalPrototype) => {
                let name = self.stream.read_string()?;
                let index = self.stream.read::<u32>()?;
                FunctionKey::GlobalPrototype { name, index }
            }
            Some(FunctionRelocation::ByPathFromRoot) | None => panic!("unknown function relocation {}", raw),
        };

        let heap = &*self.heap;
        let resolver = FunctionResolver::new(heap, self.info.context(heap));
        match resolver.locate(&key) {
            Ok(function) => Ok(function),
            Err(error) => {
                trace_saveload!(self.config, "could not load function by {}: {}", key, error);
                self.fail(error)
            }
        }
    }

    pub(crate) fn load_shared(&mut self) -> SaveloadResult<ObjectId> {
        let raw = self.stream.read::<u8>()?;
        match FunctionRelocation::from_u8(raw) {
            Some(FunctionRelocation::ByBuiltinFunctionId) => {
                let raw = self.stream.read::<u8>()?;
                let Some(id) = BuiltinFunctionId::from_u8(raw) else {
                    panic!("unknown builtin function id {}", raw);
                };
                let shared = self.heap.builtin_function(id).and_then(|f| self.heap.function(f)).map(|f| f.shared);
                match shared {
                    Some(shared) => Ok(shared),
                    None => self.fail(SaveloadError::NameNotFound {
                        namespace: "builtins",
                        name: id.to_string(),
                    }),
                }
            }
            Some(FunctionRelocation::ByPathFromRoot) => {
                let mut current = self.heap.root_shared_function(self.info.shared(self.heap));
                loop {
                    let index = self.stream.read::<i32>()?;
                    if index == PATH_END {
                        return Ok(current);
                    }
                    let next = usize::try_from(index)
                        .ok()
                        .and_then(|index| self.heap.shared(current)?.inner.get(index).copied().flatten());
                    match next {
                        Some(next) => current = next,
                        None => return self.fail(SaveloadError::SharedFunctionUnreachable),
                    }
                }
            }
            _ => panic!("unknown shared function relocation {}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithos_heap::{ContextSlot, PropertyAttributes};

    fn resolver_at(heap: &Heap, context: ObjectId) -> FunctionResolver<'_> {
        FunctionResolver::new(heap, context)
    }

    // -------------------------------------------------------------------------
    // Strategy order
    // -------------------------------------------------------------------------

    #[test]
    fn test_builtin_id_wins() {
        let heap = Heap::new();
        let floor = heap.builtin_function(BuiltinFunctionId::MathFloor).unwrap();
        let resolver = resolver_at(&heap, heap.native_context());
        assert_eq!(resolver.resolve(floor).unwrap(), FunctionKey::Builtin(BuiltinFunctionId::MathFloor));
        assert_eq!(resolver.locate(&FunctionKey::Builtin(BuiltinFunctionId::MathFloor)).unwrap(), floor);
    }

    #[test]
    fn test_context_chain_before_global() {
        let mut heap = Heap::new();
        let script = heap.add_script("app.js", "function helper(x) {} function main() {}");
        let native = heap.native_context();
        let helper = heap.new_script_function(script, "helper", 15, 21, native, None);
        heap.global_mut().define("helper", Value::Object(helper), PropertyAttributes::empty());
        let scope = heap.new_function_context(
            native,
            None,
            vec![ContextSlot {
                name: "helper".into(),
                value: Value::Object(helper),
            }],
        );

        let resolver = resolver_at(&heap, scope);
        assert_eq!(resolver.resolve(helper).unwrap(), FunctionKey::NameInContextChain("helper".into()));
        let resolver = resolver_at(&heap, native);
        assert_eq!(resolver.resolve(helper).unwrap(), FunctionKey::NameInGlobalObject("helper".into()));
    }

    #[test]
    fn test_start_position_for_anonymous_top_level() {
        let mut heap = Heap::new();
        let script = heap.add_script("app.js", "var f = function (a) {};");
        let native = heap.native_context();
        let f = heap.new_script_function(script, "", 17, 23, native, None);

        let resolver = resolver_at(&heap, native);
        let key = resolver.resolve(f).unwrap();
        assert_eq!(key, FunctionKey::StartPosition(17));
        assert_eq!(resolver.locate(&key).unwrap(), f);
    }

    #[test]
    fn test_inner_function_is_rejected() {
        let mut heap = Heap::new();
        let script = heap.add_script("app.js", "function outer() { return function (b) {}; }");
        let native = heap.native_context();
        let outer = heap.new_script_function(script, "outer", 14, 45, native, None);
        let outer_shared = heap.function(outer).unwrap().shared;
        let scope = heap.new_function_context(native, Some(outer), Vec::new());
        let inner = heap.new_script_function(script, "", 35, 41, scope, Some(outer_shared));

        let resolver = resolver_at(&heap, native);
        assert_eq!(resolver.resolve(inner).unwrap_err(), SaveloadError::InnerFunctionReference);
    }

    #[test]
    fn test_global_constructor_and_prototype_scan() {
        let heap = Heap::new();
        let resolver = resolver_at(&heap, heap.native_context());

        let object_fn = heap.lookup_global("Object").and_then(Value::as_object).unwrap();
        let keys = heap.get_property(object_fn, "keys").and_then(Value::as_object).unwrap();
        match resolver.resolve(keys).unwrap() {
            FunctionKey::GlobalConstructor { name, index } => {
                assert_eq!(name, "Object");
                let key = FunctionKey::GlobalConstructor { name, index };
                assert_eq!(resolver.locate(&key).unwrap(), keys);
            }
            other => panic!("unexpected key {:?}", other),
        }

        let array_fn = heap.lookup_global("Array").and_then(Value::as_object).unwrap();
        let proto = heap.get_property(array_fn, "prototype").and_then(Value::as_object).unwrap();
        let join = heap.get_property(proto, "join").and_then(Value::as_object).unwrap();
        match resolver.resolve(join).unwrap() {
            FunctionKey::GlobalPrototype { name, index } => {
                assert_eq!(name, "Array");
                let key = FunctionKey::GlobalPrototype { name, index };
                assert_eq!(resolver.locate(&key).unwrap(), join);
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_original_name_for_unreachable_native() {
        let heap = Heap::new();
        let resolver = resolver_at(&heap, heap.native_context());
        let to_number = heap.builtins().get("ToNumber").and_then(Value::as_object).unwrap();
        let key = resolver.resolve(to_number).unwrap();
        assert_eq!(key, FunctionKey::OriginalName("ToNumber".into()));
        assert_eq!(resolver.locate(&key).unwrap(), to_number);
    }

    #[test]
    fn test_original_name_skips_only_ascii_whitespace() {
        let mut heap = Heap::new();
        let native = heap.native_context();
        let ascii = heap.add_script("ascii.js", "obj.run \t\x0c(x) {}");
        let run = heap.new_script_function(ascii, "run", 10, 17, native, None);
        let unicode = heap.add_script("nbsp.js", "obj.run\u{a0}(x) {}");
        let nbsp = heap.new_script_function(unicode, "run", 9, 16, native, None);

        let resolver = resolver_at(&heap, native);
        assert_eq!(
            ByOriginalName.try_resolve(&resolver, run).unwrap(),
            Some(FunctionKey::OriginalName("run".into()))
        );
        assert_eq!(ByOriginalName.try_resolve(&resolver, nbsp).unwrap(), None);
    }

    // -------------------------------------------------------------------------
    // Load failures
    // -------------------------------------------------------------------------

    #[test]
    fn test_missing_names_are_recoverable() {
        let heap = Heap::new();
        let resolver = resolver_at(&heap, heap.native_context());
        assert_eq!(
            resolver.locate(&FunctionKey::NameInGlobalObject("nope".into())).unwrap_err(),
            SaveloadError::NameNotFound {
                namespace: "global object",
                name: "nope".into()
            }
        );
        assert_eq!(
            resolver.locate(&FunctionKey::StartPosition(123_456)).unwrap_err(),
            SaveloadError::FunctionNotFound { position: 123_456 }
        );
    }

    #[test]
    #[should_panic(expected = "is not a function")]
    fn test_context_binding_must_be_a_function() {
        let mut heap = Heap::new();
        let native = heap.native_context();
        let scope = heap.new_function_context(
            native,
            None,
            vec![ContextSlot {
                name: "x".into(),
                value: Value::Smi(1),
            }],
        );
        let resolver = resolver_at(&heap, scope);
        let _ = resolver.locate(&FunctionKey::NameInContextChain("x".into()));
    }

    #[test]
    fn test_relocation_tags() {
        for raw in 0..8u8 {
            assert_eq!(FunctionRelocation::from_u8(raw).map(|r| r as u8), Some(raw));
        }
        assert!(FunctionRelocation::from_u8(8).is_none());
    }
}
