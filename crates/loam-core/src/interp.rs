use crate::cell::{CellKind, CellRef, SMALL_MAX, SMALL_STR_MAX};
use crate::env;
use crate::error::LoamError;
use crate::gc;
use crate::heap::{Heap, MIN_RECLAIM};
use crate::machine::Machine;
use crate::print;
use crate::symbol::{next_gensym_id, Classes, SymId, SymbolTable};
use crate::value::Value;

/// Hook used by the environment layer to invoke watch callbacks (and by
/// anything else in the core that must call back into the evaluator). The
/// evaluator crate installs it at interpreter setup.
pub type ApplyHook = fn(&mut Interp, Value, &[Value]) -> Result<Value, Value>;

/// Hook that installs the standard library into a fresh interpreter; used by
/// `thread` to bootstrap spawned interpreters.
pub type BootstrapHook = fn(&mut Interp);

/// The interpreter: one heap, one symbol table, one machine register set.
/// Everything is an explicit context passed by reference — there is no
/// process-wide heap. Spawned threads get their own `Interp`.
pub struct Interp {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub classes: Classes,
    pub machine: Machine,
    /// The pending-exception slot. Opcodes and foreign functions set it by
    /// returning `Err`; the machine loop polls it after every step.
    pub pending: Option<Value>,
    /// The `core` namespace frame (stdlib installs here).
    pub root_env: Value,
    /// The `user` namespace frame, child of `core`; programs evaluate here.
    pub user_env: Value,
    /// Namespace registry: symbol -> namespace frame.
    pub namespaces: Vec<(SymId, Value)>,
    /// Pre-allocated out-of-memory exception, so reporting OOM cannot
    /// itself need to allocate.
    pub oom: Value,
    pub apply_hook: Option<ApplyHook>,
    pub thread_bootstrap: Option<BootstrapHook>,
}

impl Interp {
    pub fn new() -> Interp {
        let heap = Heap::new();
        let (symbols, classes) = SymbolTable::new();
        let mut interp = Interp {
            heap,
            symbols,
            classes,
            machine: Machine::new(),
            pending: None,
            root_env: Value::Nil,
            user_env: Value::Nil,
            namespaces: Vec::new(),
            oom: Value::Nil,
            apply_hook: None,
            thread_bootstrap: None,
        };
        interp.bootstrap_heap();
        interp
    }

    pub fn with_max_segments(max: usize) -> Interp {
        let mut interp = Interp::new();
        interp.heap.max_segments = max;
        interp
    }

    /// Build the objects that must exist before anything else can: the OOM
    /// exception and the core/user namespace frames. A fresh heap has a full
    /// free segment, so these infallible `try_alloc`s cannot miss.
    fn bootstrap_heap(&mut self) {
        let oom_class = self.classes.out_of_memory;
        let msg = self
            .heap
            .try_alloc(CellKind::StrSmall("out of memory".into()))
            .map(Value::Cell)
            .unwrap_or(Value::Nil);
        self.oom = self
            .heap
            .try_alloc(CellKind::Exception {
                class: oom_class,
                message: msg,
                data: Value::Nil,
            })
            .map(Value::Cell)
            .unwrap_or(Value::Nil);

        let core_sym = self.symbols.intern(None, "core");
        let user_sym = self.symbols.intern(None, "user");
        let core_frame = env::new_ns_frame_raw(&mut self.heap, Value::Nil);
        let user_frame = env::new_ns_frame_raw(&mut self.heap, core_frame);
        self.root_env = core_frame;
        self.user_env = user_frame;
        self.namespaces.push((core_sym, core_frame));
        self.namespaces.push((user_sym, user_frame));
        self.machine.envir = user_frame;
    }

    // ── allocation ──────────────────────────────────────────────

    /// Allocate a cell. On free-list exhaustion: collect; if the collection
    /// reclaimed less than an eighth of a segment, grow; if the heap can do
    /// neither, report out-of-memory through the pre-allocated exception.
    /// Never panics. The in-flight kind's payload is treated as a root so a
    /// collection here cannot reclaim values that exist only in `kind`.
    pub fn alloc(&mut self, kind: CellKind) -> Result<Value, Value> {
        if self.heap.free_count() == 0 {
            let mut in_flight: Vec<Value> = Vec::new();
            kind.for_each_child(|v| in_flight.push(v));
            let freed = gc::collect(self, &in_flight);
            if freed < MIN_RECLAIM {
                self.heap.add_segment();
            }
        }
        match self.heap.try_alloc(kind) {
            Some(r) => Ok(Value::Cell(r)),
            None => Err(self.oom),
        }
    }

    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value, Value> {
        self.alloc(CellKind::Pair {
            car,
            cdr,
            meta: Value::Nil,
        })
    }

    /// Build a proper list right-to-left, keeping the partial spine in the
    /// sink so a collection triggered mid-construction cannot reclaim it.
    pub fn list(&mut self, items: &[Value]) -> Result<Value, Value> {
        let mut acc = Value::Nil;
        let depth = self.heap.sink_depth();
        self.heap.sink_push(acc);
        for v in items.iter().rev() {
            let next = match self.cons(*v, acc) {
                Ok(n) => n,
                Err(e) => {
                    self.heap.sink_truncate(depth);
                    return Err(e);
                }
            };
            acc = next;
            self.heap.sink_pop();
            self.heap.sink_push(acc);
        }
        self.heap.sink_truncate(depth);
        Ok(acc)
    }

    pub fn string(&mut self, s: &str) -> Result<Value, Value> {
        let n = s.chars().count();
        if n <= SMALL_STR_MAX {
            self.alloc(CellKind::StrSmall(s.to_string()))
        } else {
            let buf = crate::buffer::char_buf(s.chars().collect());
            self.alloc(CellKind::StrLarge { buf, off: 0, len: n })
        }
    }

    pub fn vector(&mut self, items: Vec<Value>) -> Result<Value, Value> {
        if items.len() <= SMALL_MAX {
            self.alloc(CellKind::VecSmall(items))
        } else {
            let len = items.len();
            let buf = crate::buffer::val_buf(items);
            self.alloc(CellKind::VecLarge { buf, off: 0, len })
        }
    }

    pub fn sym(&mut self, name: &str) -> Value {
        Value::Sym(self.symbols.intern_qualified(name))
    }

    pub fn keyword(&mut self, name: &str) -> Value {
        Value::Keyword(self.symbols.intern_qualified(name))
    }

    /// Fresh uninterned-looking symbol: `prefix__N`.
    pub fn gensym(&mut self, prefix: &str) -> Value {
        let n = next_gensym_id();
        let name = format!("{prefix}__{n}");
        self.sym(&name)
    }

    // ── exceptions ──────────────────────────────────────────────

    /// Build an exception value. If even the exception cannot be allocated,
    /// degrade to the pre-allocated OOM exception.
    pub fn make_error(&mut self, class: SymId, message: &str) -> Value {
        let msg = match self.string(message) {
            Ok(v) => v,
            Err(oom) => return oom,
        };
        let depth = self.heap.sink_depth();
        self.heap.sink_push(msg);
        let exc = self.alloc(CellKind::Exception {
            class,
            message: msg,
            data: Value::Nil,
        });
        self.heap.sink_truncate(depth);
        match exc {
            Ok(v) => v,
            Err(oom) => oom,
        }
    }

    pub fn runtime_error(&mut self, message: &str) -> Value {
        let class = self.classes.runtime;
        self.make_error(class, message)
    }

    pub fn arithmetic_error(&mut self, message: &str) -> Value {
        let class = self.classes.arithmetic;
        self.make_error(class, message)
    }

    pub fn illegal_argument(&mut self, message: &str) -> Value {
        let class = self.classes.illegal_argument;
        self.make_error(class, message)
    }

    pub fn illegal_state(&mut self, message: &str) -> Value {
        let class = self.classes.illegal_state;
        self.make_error(class, message)
    }

    pub fn number_format_error(&mut self, message: &str) -> Value {
        let class = self.classes.number_format;
        self.make_error(class, message)
    }

    pub fn class_cast_error(&mut self, message: &str) -> Value {
        let class = self.classes.class_cast;
        self.make_error(class, message)
    }

    pub fn arity_error(&mut self, name: &str, expected: &str, got: usize) -> Value {
        let class = self.classes.arity;
        self.make_error(
            class,
            &format!("{name} expects {expected} args, got {got}"),
        )
    }

    pub fn type_error(&mut self, expected: &str, got: &str) -> Value {
        let class = self.classes.class_cast;
        self.make_error(class, &format!("expected {expected}, got {got}"))
    }

    /// Render an exception value into the host-facing error.
    pub fn describe_exception(&self, exc: Value) -> LoamError {
        if let Some(r) = exc.as_cell() {
            if let CellKind::Exception { class, message, .. } = &self.heap.cell(r).kind {
                let class_name = self.symbols.qualified_name(*class);
                let message = print::display_str(self, *message);
                return LoamError::Uncaught {
                    class: class_name,
                    message,
                };
            }
        }
        LoamError::Uncaught {
            class: "Throwable".into(),
            message: print::pr_str(self, exc),
        }
    }

    // ── misc ────────────────────────────────────────────────────

    pub fn kind_of(&self, v: Value) -> Option<CellKind> {
        v.as_cell().map(|r| self.heap.kind(r))
    }

    pub fn cell_ref(&self, v: Value) -> Option<CellRef> {
        v.as_cell()
    }

    pub fn type_name(&self, v: Value) -> &'static str {
        match v {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Sym(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Proc(_) => "proc",
            Value::Eof => "eof",
            Value::Cell(r) => self.heap.cell(r).kind.type_name(),
        }
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1. A fresh interpreter has its namespaces and the preallocated OOM
    #[test]
    fn fresh_interp() {
        let interp = Interp::new();
        assert_eq!(interp.namespaces.len(), 2);
        assert!(interp.oom.is_pointer());
        assert!(matches!(
            interp.kind_of(interp.oom),
            Some(CellKind::Exception { .. })
        ));
    }

    // 2. list() builds a proper list in order
    #[test]
    fn list_builds_in_order() {
        let mut interp = Interp::new();
        let l = interp
            .list(&[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
        let mut items = Vec::new();
        let mut cur = l;
        while let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(cur) {
            items.push(car.as_int().unwrap());
            cur = cdr;
        }
        assert_eq!(items, vec![1, 2, 3]);
    }

    // 3. Small and large strings pick the right representation
    #[test]
    fn string_representation() {
        let mut interp = Interp::new();
        let small = interp.string("short").unwrap();
        assert!(matches!(
            interp.kind_of(small),
            Some(CellKind::StrSmall(_))
        ));
        let big = interp
            .string("a string comfortably longer than twenty-four codepoints")
            .unwrap();
        assert!(matches!(
            interp.kind_of(big),
            Some(CellKind::StrLarge { .. })
        ));
    }

    // 4. Exception constructors attach the right class
    #[test]
    fn error_classes() {
        let mut interp = Interp::new();
        let e = interp.arithmetic_error("divide by zero");
        match interp.kind_of(e) {
            Some(CellKind::Exception { class, .. }) => {
                assert_eq!(class, interp.classes.arithmetic);
                assert!(interp.symbols.isa(class, interp.classes.throwable));
            }
            other => panic!("expected exception, got {:?}", other.map(|k| k.type_name())),
        }
    }

    // 5. gensym names are unique
    #[test]
    fn gensym_unique() {
        let mut interp = Interp::new();
        let a = interp.gensym("g");
        let b = interp.gensym("g");
        assert!(!a.ident_eq(&b));
    }
}
