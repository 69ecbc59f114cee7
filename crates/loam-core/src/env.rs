use crate::buffer::val_buf;
use crate::cell::CellKind;
use crate::heap::Heap;
use crate::interp::Interp;
use crate::symbol::SymId;
use crate::value::Value;

/// Bucket count for namespace/root frames. Lexical frames are plain alists —
/// small and short-lived, hashing overhead not justified.
pub const NS_BUCKETS: usize = 727;

/// Build a namespace frame (bucketed bindings) during bootstrap, when the
/// free list is guaranteed non-empty.
pub(crate) fn new_ns_frame_raw(heap: &mut Heap, parent: Value) -> Value {
    let buf = val_buf(vec![Value::Nil; NS_BUCKETS]);
    let buckets = heap
        .try_alloc(CellKind::VecLarge {
            buf,
            off: 0,
            len: NS_BUCKETS,
        })
        .map(Value::Cell)
        .unwrap_or(Value::Nil);
    heap.try_alloc(CellKind::Frame {
        bindings: buckets,
        parent,
    })
    .map(Value::Cell)
    .unwrap_or(Value::Nil)
}

/// Allocate a namespace frame with 727 hash buckets.
pub fn new_ns_frame(interp: &mut Interp, parent: Value) -> Result<Value, Value> {
    let buf = val_buf(vec![Value::Nil; NS_BUCKETS]);
    let buckets = interp.alloc(CellKind::VecLarge {
        buf,
        off: 0,
        len: NS_BUCKETS,
    })?;
    interp.heap.sink_push(buckets);
    let frame = interp.alloc(CellKind::Frame {
        bindings: buckets,
        parent,
    });
    interp.heap.sink_pop();
    frame
}

/// Allocate a lexical frame: alist bindings, short-lived.
pub fn new_frame(interp: &mut Interp, parent: Value) -> Result<Value, Value> {
    interp.alloc(CellKind::Frame {
        bindings: Value::Nil,
        parent,
    })
}

fn frame_parts(interp: &Interp, frame: Value) -> Option<(Value, Value)> {
    match interp.kind_of(frame) {
        Some(CellKind::Frame { bindings, parent }) => Some((bindings, parent)),
        _ => None,
    }
}

/// Walk an alist of `(sym . var-slot)` pairs for `sym`.
fn alist_find(interp: &Interp, mut alist: Value, sym: SymId) -> Option<Value> {
    while let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(alist) {
        if let Some(CellKind::Pair {
            car: key,
            cdr: slot,
            ..
        }) = interp.kind_of(car)
        {
            if key.as_sym() == Some(sym) {
                return Some(slot);
            }
        }
        alist = cdr;
    }
    None
}

fn bucket_index(interp: &Interp, sym: SymId) -> usize {
    (interp.symbols.hash(sym) % NS_BUCKETS as u64) as usize
}

/// Find the var slot for `sym` in exactly this frame (no parent walk).
pub fn frame_lookup(interp: &Interp, frame: Value, sym: SymId) -> Option<Value> {
    let (bindings, _) = frame_parts(interp, frame)?;
    match interp.kind_of(bindings) {
        // Bucketed namespace frame.
        Some(CellKind::VecLarge { buf, off, .. }) => {
            let idx = bucket_index(interp, sym);
            let chain = buf.borrow()[off + idx];
            alist_find(interp, chain, sym)
        }
        // Lexical alist frame (bindings may be Nil when empty).
        _ => alist_find(interp, bindings, sym),
    }
}

/// Find-or-create the var slot for `sym` in this frame, then store `value`.
/// Mutating an existing slot fires its watches. Returns the slot.
pub fn define(interp: &mut Interp, frame: Value, sym: SymId, value: Value) -> Result<Value, Value> {
    if let Some(slot) = frame_lookup(interp, frame, sym) {
        set_slot(interp, slot, value)?;
        return Ok(slot);
    }
    let slot = interp.alloc(CellKind::VarSlot {
        value,
        watches: Value::Nil,
    })?;
    interp.heap.sink_push(slot);
    let entry = interp.cons(Value::Sym(sym), slot);
    let entry = match entry {
        Ok(e) => e,
        Err(err) => {
            interp.heap.sink_pop();
            return Err(err);
        }
    };
    interp.heap.sink_push(entry);
    let result = prepend_binding(interp, frame, sym, entry);
    interp.heap.sink_pop();
    interp.heap.sink_pop();
    result?;
    Ok(slot)
}

fn prepend_binding(
    interp: &mut Interp,
    frame: Value,
    sym: SymId,
    entry: Value,
) -> Result<(), Value> {
    let (bindings, _) = match frame_parts(interp, frame) {
        Some(p) => p,
        None => {
            let err = interp.illegal_state("define target is not a frame");
            return Err(err);
        }
    };
    match interp.kind_of(bindings) {
        Some(CellKind::VecLarge { buf, off, .. }) => {
            let idx = bucket_index(interp, sym);
            let chain = buf.borrow()[off + idx];
            let new_chain = interp.cons(entry, chain)?;
            buf.borrow_mut()[off + idx] = new_chain;
            Ok(())
        }
        _ => {
            let new_alist = interp.cons(entry, bindings)?;
            let frame_ref = match frame.as_cell() {
                Some(r) => r,
                None => {
                    let err = interp.illegal_state("define target is not a frame");
                    return Err(err);
                }
            };
            if let CellKind::Frame { bindings, .. } = &mut interp.heap.cell_mut(frame_ref).kind {
                *bindings = new_alist;
            }
            Ok(())
        }
    }
}

/// Read a var slot's current value.
pub fn slot_value(interp: &Interp, slot: Value) -> Value {
    match interp.kind_of(slot) {
        Some(CellKind::VarSlot { value, .. }) => value,
        _ => Value::Nil,
    }
}

/// Mutate a var slot, then synchronously invoke each registered watch with
/// `(old new)` before returning.
pub fn set_slot(interp: &mut Interp, slot: Value, new: Value) -> Result<(), Value> {
    let slot_ref = match slot.as_cell() {
        Some(r) => r,
        None => {
            let err = interp.illegal_state("set! target is not a var");
            return Err(err);
        }
    };
    let (old, watches) = match &interp.heap.cell(slot_ref).kind {
        CellKind::VarSlot { value, watches } => (*value, *watches),
        _ => {
            let err = interp.illegal_state("set! target is not a var");
            return Err(err);
        }
    };
    if let CellKind::VarSlot { value, .. } = &mut interp.heap.cell_mut(slot_ref).kind {
        *value = new;
    }
    let mut chain = watches;
    while let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(chain) {
        if let Some(CellKind::Pair { cdr: watch_fn, .. }) = interp.kind_of(car) {
            if let Some(hook) = interp.apply_hook {
                hook(interp, watch_fn, &[old, new])?;
            }
        }
        chain = cdr;
    }
    Ok(())
}

/// Attach a `(key . fn)` watch to a var slot.
pub fn add_watch(interp: &mut Interp, slot: Value, key: Value, f: Value) -> Result<(), Value> {
    let slot_ref = match slot.as_cell() {
        Some(r) => r,
        None => {
            let err = interp.illegal_state("add-watch target is not a var");
            return Err(err);
        }
    };
    let watches = match &interp.heap.cell(slot_ref).kind {
        CellKind::VarSlot { watches, .. } => *watches,
        _ => {
            let err = interp.illegal_state("add-watch target is not a var");
            return Err(err);
        }
    };
    let entry = interp.cons(key, f)?;
    interp.heap.sink_push(entry);
    let chain = interp.cons(entry, watches);
    interp.heap.sink_pop();
    let chain = chain?;
    if let CellKind::VarSlot { watches, .. } = &mut interp.heap.cell_mut(slot_ref).kind {
        *watches = chain;
    }
    Ok(())
}

/// Find the var slot for `sym`, walking the frame chain for unqualified
/// symbols, or resolving the namespace first for `ns/name`. Raises the
/// spec'd runtime exceptions when either step fails.
pub fn resolve_slot(interp: &mut Interp, env: Value, sym: SymId) -> Result<Value, Value> {
    if interp.symbols.namespace(sym).is_some() {
        let ns_name = interp.symbols.namespace(sym).map(str::to_string);
        let ns_name = ns_name.unwrap_or_default();
        let ns_sym = interp.symbols.intern(None, &ns_name);
        let frame = interp
            .namespaces
            .iter()
            .find(|(id, _)| *id == ns_sym)
            .map(|(_, f)| *f);
        let frame = match frame {
            Some(f) => f,
            None => {
                let err = interp.runtime_error(&format!("undefined namespace: {ns_name}"));
                return Err(err);
            }
        };
        let bare = interp.symbols.bare(sym);
        match frame_lookup(interp, frame, bare) {
            Some(slot) => Ok(slot),
            None => {
                let name = interp.symbols.qualified_name(sym);
                let err = interp.runtime_error(&format!("undeclared var: {name}"));
                Err(err)
            }
        }
    } else {
        let mut cur = env;
        while !cur.is_nil() {
            if let Some(slot) = frame_lookup(interp, cur, sym) {
                return Ok(slot);
            }
            cur = match frame_parts(interp, cur) {
                Some((_, parent)) => parent,
                None => Value::Nil,
            };
        }
        let name = interp.symbols.qualified_name(sym);
        let err = interp.runtime_error(&format!("undeclared var: {name}"));
        Err(err)
    }
}

/// Resolve a symbol to its value.
pub fn resolve(interp: &mut Interp, env: Value, sym: SymId) -> Result<Value, Value> {
    let slot = resolve_slot(interp, env, sym)?;
    Ok(slot_value(interp, slot))
}

/// The namespace frame at the root of a lexical chain — where `def` interns.
pub fn namespace_of(interp: &Interp, env: Value) -> Value {
    let mut cur = env;
    loop {
        match frame_parts(interp, cur) {
            Some((bindings, parent)) => {
                // A bucketed frame is a namespace frame.
                if matches!(
                    interp.kind_of(bindings),
                    Some(CellKind::VecLarge { .. })
                ) {
                    return cur;
                }
                if parent.is_nil() {
                    return cur;
                }
                cur = parent;
            }
            None => return cur,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1. define/resolve round-trip in a namespace frame
    #[test]
    fn define_and_resolve() {
        let mut interp = Interp::new();
        let x = interp.symbols.intern(None, "x");
        let root = interp.user_env;
        define(&mut interp, root, x, Value::Int(41)).unwrap();
        let v = resolve(&mut interp, root, x).unwrap();
        assert_eq!(v.as_int(), Some(41));
    }

    // 2. Lexical shadowing: inner frame wins, outer unaffected
    #[test]
    fn lexical_shadowing() {
        let mut interp = Interp::new();
        let x = interp.symbols.intern(None, "x");
        let env = interp.user_env;
        let outer = new_frame(&mut interp, env).unwrap();
        define(&mut interp, outer, x, Value::Int(1)).unwrap();
        let inner = new_frame(&mut interp, outer).unwrap();
        define(&mut interp, inner, x, Value::Int(2)).unwrap();
        assert_eq!(resolve(&mut interp, inner, x).unwrap().as_int(), Some(2));
        assert_eq!(resolve(&mut interp, outer, x).unwrap().as_int(), Some(1));
    }

    // 3. Unresolved symbols raise "undeclared var"
    #[test]
    fn undeclared_var() {
        let mut interp = Interp::new();
        let nope = interp.symbols.intern(None, "nope");
        let env = interp.user_env;
        let err = resolve(&mut interp, env, nope).unwrap_err();
        let rendered = interp.describe_exception(err).to_string();
        assert!(rendered.contains("undeclared var: nope"), "{rendered}");
    }

    // 4. Qualified resolution: namespace first, then bare name there only
    #[test]
    fn qualified_resolution() {
        let mut interp = Interp::new();
        let plus = interp.symbols.intern(None, "plus");
        let root = interp.root_env;
        define(&mut interp, root, plus, Value::Int(7)).unwrap();
        let qualified = interp.symbols.intern_qualified("core/plus");
        let env = interp.user_env;
        assert_eq!(
            resolve(&mut interp, env, qualified).unwrap().as_int(),
            Some(7)
        );
        // Unknown namespace fails loudly.
        let bad = interp.symbols.intern_qualified("nowhere/plus");
        let err = resolve(&mut interp, env, bad).unwrap_err();
        let rendered = interp.describe_exception(err).to_string();
        assert!(rendered.contains("undefined namespace"), "{rendered}");
    }

    // 5. set_slot fires watches with (old new)
    #[test]
    fn watches_fire() {
        let mut interp = Interp::new();
        let x = interp.symbols.intern(None, "watched");
        let root = interp.user_env;
        let slot = define(&mut interp, root, x, Value::Int(1)).unwrap();
        // Stub hook that records the watch invocation in machine.args.
        fn hook(interp: &mut Interp, _f: Value, args: &[Value]) -> Result<Value, Value> {
            let pair = interp.cons(args[0], args[1])?;
            interp.machine.args = pair;
            Ok(Value::Nil)
        }
        interp.apply_hook = Some(hook);
        add_watch(&mut interp, slot, Value::Int(0), Value::Nil).unwrap();
        set_slot(&mut interp, slot, Value::Int(2)).unwrap();
        match interp.kind_of(interp.machine.args) {
            Some(CellKind::Pair { car, cdr, .. }) => {
                assert_eq!(car.as_int(), Some(1));
                assert_eq!(cdr.as_int(), Some(2));
            }
            _ => panic!("watch did not fire"),
        }
        assert_eq!(slot_value(&interp, slot).as_int(), Some(2));
    }

    // 6. namespace_of finds the bucketed root from a lexical chain
    #[test]
    fn namespace_of_walks_up() {
        let mut interp = Interp::new();
        let env = interp.user_env;
        let lex = new_frame(&mut interp, env).unwrap();
        let lex2 = new_frame(&mut interp, lex).unwrap();
        assert!(namespace_of(&interp, lex2).ident_eq(&interp.user_env));
    }

    // 7. Many bindings in one namespace frame distribute across buckets
    #[test]
    fn bucket_distribution() {
        let mut interp = Interp::new();
        let root = interp.user_env;
        for i in 0..200 {
            let sym = interp.symbols.intern(None, &format!("var-{i}"));
            define(&mut interp, root, sym, Value::Int(i)).unwrap();
        }
        for i in (0..200).step_by(17) {
            let sym = interp.symbols.intern(None, &format!("var-{i}"));
            assert_eq!(resolve(&mut interp, root, sym).unwrap().as_int(), Some(i));
        }
    }
}
