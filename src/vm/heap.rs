use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace};

use super::object::{Closure, Function, LoxString, Object, Upvalue};
use super::table::Table;
use super::value::Value;
use crate::config::GcConfig;

// =============================================================================
// ObjRef - Generational index into the heap arena
// =============================================================================

/// A reference to a heap object.
///
/// The generation is bumped every time a slot is freed, so a reference that
/// outlives its object is detected on access instead of aliasing whatever is
/// allocated into the slot next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

impl ObjRef {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

// =============================================================================
// GC statistics
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct GcStats {
    pub cycles: u64,
    pub objects_freed: u64,
    pub bytes_freed: u64,
    pub total_pause_us: u64,
    pub max_pause_us: u64,
    /// Bytes live after the most recent cycle.
    pub live_bytes: usize,
    pub next_gc: usize,
}

// =============================================================================
// Heap - Object arena with mark-and-sweep collection
// =============================================================================

struct Slot {
    generation: u32,
    marked: bool,
    /// Bytes accounted to this slot when it was allocated.
    size: usize,
    object: Option<Object>,
}

/// The garbage-collected object arena.
///
/// The heap knows how to trace objects but not where the roots are: callers
/// mark their roots with the `mark_*` methods and then call [`Heap::collect`].
/// The intern table lives here and is weak; strings reachable only through
/// it are dropped during collection.
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    strings: Table,
    gray: Vec<ObjRef>,
    scratch: Vec<Value>,
    bytes_allocated: usize,
    next_gc: usize,
    config: GcConfig,
    stats: GcStats,
}

impl Heap {
    pub fn new(config: GcConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            gray: Vec::new(),
            scratch: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.initial_threshold,
            config,
            stats: GcStats {
                next_gc: config.initial_threshold,
                ..Default::default()
            },
        }
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Number of live objects in the arena.
    pub fn object_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// The intern table.
    pub fn strings(&self) -> &Table {
        &self.strings
    }

    /// Whether the owner should mark its roots and collect before the next
    /// allocation.
    pub fn should_collect(&self) -> bool {
        self.config.enabled && (self.config.stress || self.bytes_allocated > self.next_gc)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Move an object into the arena. Never collects.
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        let size = object.size_estimate();
        self.bytes_allocated += size;
        trace!(kind = object.kind(), size, "alloc");

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.size = size;
            slot.marked = false;
            return ObjRef::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            size,
            object: Some(object),
        });
        ObjRef::new(index, 0)
    }

    /// Intern `chars`, returning the existing string object if there is one.
    pub fn alloc_string(&mut self, chars: &str) -> ObjRef {
        let string = LoxString::new(chars);
        let hash = string.hash();
        if let Some(existing) = self.find_string(chars, hash) {
            return existing;
        }
        let r = self.alloc(Object::String(string));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    pub fn find_string(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        self.strings
            .find_by(hash, |key| self.string(key).as_str() == chars)
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn get(&self, r: ObjRef) -> &Object {
        let slot = &self.slots[r.index as usize];
        match &slot.object {
            Some(object) if slot.generation == r.generation => object,
            _ => panic!("stale object reference {:?}", r),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        let slot = &mut self.slots[r.index as usize];
        match &mut slot.object {
            Some(object) if slot.generation == r.generation => object,
            _ => panic!("stale object reference {:?}", r),
        }
    }

    pub fn string(&self, r: ObjRef) -> &LoxString {
        match self.get(r) {
            Object::String(s) => s,
            other => panic!("expected string, found {}", other.kind()),
        }
    }

    pub fn function(&self, r: ObjRef) -> &Function {
        match self.get(r) {
            Object::Function(f) => f,
            other => panic!("expected function, found {}", other.kind()),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &Closure {
        match self.get(r) {
            Object::Closure(c) => c,
            other => panic!("expected closure, found {}", other.kind()),
        }
    }

    pub fn closure_mut(&mut self, r: ObjRef) -> &mut Closure {
        match self.get_mut(r) {
            Object::Closure(c) => c,
            other => panic!("expected closure, found {}", other.kind()),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &Upvalue {
        match self.get(r) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.kind()),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut Upvalue {
        match self.get_mut(r) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.kind()),
        }
    }

    // =========================================================================
    // Marking
    // =========================================================================

    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.slots[r.index as usize].marked
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef) {
        let slot = &mut self.slots[r.index as usize];
        if slot.marked {
            return;
        }
        debug_assert_eq!(slot.generation, r.generation, "marking stale {:?}", r);
        slot.marked = true;
        self.gray.push(r);
    }

    /// Mark every key and value of a table that is not owned by the heap.
    pub fn mark_table(&mut self, table: &Table) {
        for entry in table.iter() {
            self.mark_object(entry.key);
            self.mark_value(entry.value);
        }
    }

    /// Mark what a function still under construction refers to.
    pub fn mark_function(&mut self, function: &Function) {
        if let Some(name) = function.name {
            self.mark_object(name);
        }
        for constant in &function.chunk.constants {
            self.mark_value(*constant);
        }
    }

    fn blacken(&mut self, r: ObjRef) {
        let mut children = std::mem::take(&mut self.scratch);
        match self.get(r) {
            Object::String(_) | Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Upvalue(Upvalue::Closed(value)) => children.push(*value),
            Object::Function(function) => {
                children.extend(function.name.map(Value::Obj));
                children.extend_from_slice(&function.chunk.constants);
            }
            Object::Closure(closure) => {
                children.push(Value::Obj(closure.function));
                children.extend(closure.upvalues.iter().map(|u| Value::Obj(*u)));
            }
            Object::Native(native) => children.push(Value::Obj(native.name)),
        }
        for child in children.drain(..) {
            self.mark_value(child);
        }
        self.scratch = children;
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Trace from the marked roots, drop unreachable interned strings and
    /// sweep. Returns the number of bytes freed.
    pub fn collect(&mut self) -> usize {
        let start = Instant::now();
        let before = self.bytes_allocated;
        debug!(bytes_allocated = before, roots = self.gray.len(), "gc begin");

        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }

        let slots = &self.slots;
        self.strings
            .remove_white(|key| slots[key.index as usize].marked);

        let freed_objects = self.sweep();
        let freed = before - self.bytes_allocated;
        let growth = self.config.growth_factor.max(1.0);
        self.next_gc =
            ((self.bytes_allocated as f64 * growth) as usize).max(self.config.initial_threshold);

        let pause_us = start.elapsed().as_micros() as u64;
        self.stats.cycles += 1;
        self.stats.objects_freed += freed_objects as u64;
        self.stats.bytes_freed += freed as u64;
        self.stats.total_pause_us += pause_us;
        self.stats.max_pause_us = self.stats.max_pause_us.max(pause_us);
        self.stats.live_bytes = self.bytes_allocated;
        self.stats.next_gc = self.next_gc;

        debug!(
            collected = freed,
            objects = freed_objects,
            from = before,
            to = self.bytes_allocated,
            next = self.next_gc,
            "gc end"
        );
        freed
    }

    fn sweep(&mut self) -> usize {
        let mut live = 0;
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
                live += slot.size;
            } else {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }
        self.bytes_allocated = live;
        freed
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut heap = Heap::default();
        let r = heap.alloc_string("hello");
        assert_eq!(heap.string(r).as_str(), "hello");
        assert_eq!(heap.get(r).kind(), "string");
        assert_eq!(heap.object_count(), 1);
        assert!(heap.bytes_allocated() > 0);
    }

    #[test]
    fn test_strings_are_interned() {
        let mut heap = Heap::default();
        let a = heap.alloc_string("same");
        let b = heap.alloc_string("same");
        let c = heap.alloc_string("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn test_collect_frees_unreachable() {
        let mut heap = Heap::default();
        let keep = heap.alloc_string("keep");
        heap.alloc_string("drop");

        heap.mark_object(keep);
        heap.collect();

        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.string(keep).as_str(), "keep");
        assert_eq!(heap.strings().len(), 1);
        assert!(heap.find_string("drop", LoxString::new("drop").hash()).is_none());
        assert!(!heap.is_marked(keep), "marks are cleared by sweep");
    }

    #[test]
    #[should_panic(expected = "stale object reference")]
    fn test_stale_reference_panics() {
        let mut heap = Heap::default();
        let r = heap.alloc_string("gone");
        heap.collect();
        let _ = heap.alloc_string("reused");
        heap.get(r);
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut heap = Heap::default();
        let old = heap.alloc_string("a");
        heap.collect();
        let new = heap.alloc_string("b");
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
    }

    #[test]
    fn test_closure_traces_function_and_upvalues() {
        let mut heap = Heap::default();
        let name = heap.alloc_string("f");
        let constant = heap.alloc_string("constant");
        let mut function = Function::new(Some(name));
        function.chunk.add_constant(Value::Obj(constant));
        let function = heap.alloc(Object::Function(function));
        let captured = heap.alloc_string("captured");
        let upvalue = heap.alloc(Object::Upvalue(Upvalue::Closed(Value::Obj(captured))));
        let mut closure = Closure::new(function, 1);
        closure.upvalues.push(upvalue);
        let closure = heap.alloc(Object::Closure(closure));
        heap.alloc_string("garbage");

        heap.mark_object(closure);
        heap.collect();

        assert_eq!(heap.object_count(), 6);
        assert_eq!(heap.string(captured).as_str(), "captured");
        assert_eq!(heap.function(function).name, Some(name));
    }

    #[test]
    fn test_mark_table_roots_keys_and_values() {
        let mut heap = Heap::default();
        let key = heap.alloc_string("key");
        let value = heap.alloc_string("value");
        let mut table = Table::new();
        table.set(key, heap.string(key).hash(), Value::Obj(value));

        heap.mark_table(&table);
        heap.collect();
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn test_threshold_has_floor() {
        let mut heap = Heap::default();
        heap.alloc_string("x");
        heap.collect();
        assert_eq!(heap.next_gc(), GcConfig::default().initial_threshold);
        assert_eq!(heap.stats().cycles, 1);
        assert_eq!(heap.stats().objects_freed, 1);
    }

    #[test]
    fn test_threshold_grows_with_live_bytes() {
        let config = GcConfig {
            initial_threshold: 1,
            ..GcConfig::default()
        };
        let mut heap = Heap::new(config);
        let r = heap.alloc_string(&"x".repeat(1000));
        heap.mark_object(r);
        heap.collect();
        assert_eq!(heap.next_gc(), heap.bytes_allocated() * 2);
        assert!(!heap.should_collect());
    }

    #[test]
    fn test_stress_and_disabled_modes() {
        let stress = Heap::new(GcConfig {
            stress: true,
            ..GcConfig::default()
        });
        assert!(stress.should_collect());

        let disabled = Heap::new(GcConfig {
            enabled: false,
            stress: true,
            ..GcConfig::default()
        });
        assert!(!disabled.should_collect());
    }
}
