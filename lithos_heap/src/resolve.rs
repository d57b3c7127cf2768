//! Name resolution against a live heap.
//!
//! These are the queries a loader uses to re-find objects by semantic keys:
//! scope-chain bindings, global properties, builtin entry points, top-level
//! functions by source position, and shared units by tree position.

use crate::function::{BuiltinFunctionId, ContextKind};
use crate::heap::Heap;
use crate::object::HeapObject;
use crate::value::{ObjectId, Value};

impl Heap {
    /// Find the context and slot binding `name`, walking outward from
    /// `context`.
    pub fn lookup_context_chain(&self, context: ObjectId, name: &str) -> Option<(ObjectId, usize)> {
        let mut current = Some(context);
        while let Some(id) = current {
            let ctx = self.context(id)?;
            if let Some(slot) = ctx.slot_index(name) {
                return Some((id, slot));
            }
            current = ctx.previous;
        }
        None
    }

    /// Value stored in a context slot.
    pub fn context_slot(&self, context: ObjectId, slot: usize) -> Option<Value> {
        self.context(context)?.slots.get(slot).map(|s| s.value)
    }

    /// Live global property.
    #[inline]
    pub fn lookup_global(&self, name: &str) -> Option<Value> {
        self.global().get(name)
    }

    /// Resolve a dotted path such as `String.prototype` starting at the
    /// global object.
    pub fn lookup_path(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let mut value = self.lookup_global(parts.next()?)?;
        for part in parts {
            value = self.get_property(value.as_object()?, part)?;
        }
        Some(value)
    }

    /// Closure installed for a builtin id.
    pub fn builtin_function(&self, id: BuiltinFunctionId) -> Option<ObjectId> {
        let holder = self.lookup_path(id.holder())?.as_object()?;
        let function = self.get_property(holder, id.name())?.as_object()?;
        self.function(function).map(|_| function)
    }

    /// Whether `context` is the process's top-level scope.
    #[inline]
    pub fn is_top_level_context(&self, context: ObjectId) -> bool {
        self.context(context).is_some_and(|c| c.kind == ContextKind::Native)
    }

    /// First top-level, non-native closure whose unit starts at `position`.
    pub fn function_by_start_position(&self, position: i32) -> Option<ObjectId> {
        self.objects().find_map(|(id, object)| match object {
            HeapObject::Function(function) if self.is_top_level_context(function.context) => {
                let shared = self.shared(function.shared)?;
                (!shared.native && shared.start_position == position).then_some(id)
            }
            _ => None,
        })
    }

    /// Root of the shared unit tree containing `shared`.
    pub fn root_shared_function(&self, shared: ObjectId) -> ObjectId {
        let mut current = shared;
        while let Some(outer) = self.shared(current).and_then(|s| s.outer) {
            current = outer;
        }
        current
    }

    /// Make sure `shared` can deoptimize. Units without source cannot be
    /// recompiled for it.
    pub fn ensure_deopt_support(&mut self, shared: ObjectId) -> bool {
        match self.shared_mut(shared) {
            Some(info) if info.has_deopt_support => true,
            Some(info) if !info.native && info.script.is_some() => {
                info.has_deopt_support = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::function::ContextSlot;
    use crate::heap::Heap;
    use crate::value::Value;
    use crate::BuiltinFunctionId;

    #[test]
    fn test_context_chain_walks_outward() {
        let mut heap = Heap::new();
        let native = heap.native_context();
        let outer = heap.new_function_context(
            native,
            None,
            vec![ContextSlot {
                name: "helper".into(),
                value: Value::Smi(7),
            }],
        );
        let inner = heap.new_function_context(outer, None, Vec::new());

        let (ctx, slot) = heap.lookup_context_chain(inner, "helper").unwrap();
        assert_eq!(ctx, outer);
        assert_eq!(heap.context_slot(ctx, slot), Some(Value::Smi(7)));
        assert!(heap.lookup_context_chain(inner, "missing").is_none());
    }

    #[test]
    fn test_builtin_functions_resolve() {
        let heap = Heap::new();
        for id in BuiltinFunctionId::ALL {
            let function = heap.builtin_function(id).unwrap_or_else(|| panic!("{} missing", id));
            assert_eq!(heap.shared_of(function).builtin, Some(id));
        }
    }

    #[test]
    fn test_function_by_start_position_skips_inner() {
        let mut heap = Heap::new();
        let script = heap.add_script("app.js", "function top(a) { function inner(b) {} }");
        let native = heap.native_context();
        let top = heap.new_script_function(script, "top", 12, 41, native, None);
        let top_shared = heap.function(top).unwrap().shared;
        let ctx = heap.new_function_context(native, Some(top), Vec::new());
        heap.new_script_function(script, "inner", 32, 39, ctx, Some(top_shared));

        assert_eq!(heap.function_by_start_position(12), Some(top));
        assert_eq!(heap.function_by_start_position(32), None);
    }

    #[test]
    fn test_root_shared_function() {
        let mut heap = Heap::new();
        let script = heap.add_script("app.js", "function a() { function b() { function c() {} } }");
        let native = heap.native_context();
        let a = heap.new_script_function(script, "a", 10, 50, native, None);
        let a_shared = heap.function(a).unwrap().shared;
        let b = heap.new_script_function(script, "b", 25, 48, native, Some(a_shared));
        let b_shared = heap.function(b).unwrap().shared;
        let c = heap.new_script_function(script, "c", 40, 46, native, Some(b_shared));
        let c_shared = heap.function(c).unwrap().shared;

        assert_eq!(heap.root_shared_function(c_shared), a_shared);
        assert_eq!(heap.shared(a_shared).unwrap().inner, vec![Some(b_shared)]);
    }

    #[test]
    fn test_ensure_deopt_support() {
        let mut heap = Heap::new();
        let script = heap.add_script("app.js", "function f() {}");
        let native = heap.native_context();
        let f = heap.new_script_function(script, "f", 10, 15, native, None);
        let shared = heap.function(f).unwrap().shared;
        assert!(heap.ensure_deopt_support(shared));
        assert!(heap.shared(shared).unwrap().has_deopt_support);

        let floor = heap.builtin_function(BuiltinFunctionId::MathFloor).unwrap();
        let floor_shared = heap.function(floor).unwrap().shared;
        assert!(!heap.ensure_deopt_support(floor_shared));
    }
}
