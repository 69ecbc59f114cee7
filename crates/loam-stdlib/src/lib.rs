mod arithmetic;
mod comparison;
mod io;
mod list;
mod map;
mod meta;
mod predicates;
mod regex_ops;
mod string;

use std::rc::Rc;

use loam_core::{env, CellKind, ForeignFn, Interp, LoamError, Op, Value};

/// Install the standard library into the interpreter's `core` namespace and
/// wire up the evaluator hooks. Embedders call this once, before any user
/// program runs.
pub fn install(interp: &mut Interp) -> Result<(), LoamError> {
    loam_eval::install_hooks(interp);
    interp.thread_bootstrap = Some(bootstrap);
    register_all(interp).map_err(|e| interp.describe_exception(e))
}

/// Thread-spawn bootstrap: spawned interpreters get the same stdlib.
fn bootstrap(interp: &mut Interp) {
    let _ = install(interp);
}

fn register_all(interp: &mut Interp) -> Result<(), Value> {
    // Opcode procedures: primitives that jump straight into the machine.
    register_value(interp, "apply", Value::Proc(Op::Apply))?;
    register_value(interp, "eval", Value::Proc(Op::Eval))?;
    register_value(interp, "read", Value::Proc(Op::ReadExpr))?;
    register_value(interp, "force", Value::Proc(Op::Force))?;

    arithmetic::register(interp)?;
    comparison::register(interp)?;
    list::register(interp)?;
    map::register(interp)?;
    string::register(interp)?;
    predicates::register(interp)?;
    meta::register(interp)?;
    io::register(interp)?;
    regex_ops::register(interp)?;
    Ok(())
}

/// Register a foreign function with a declared `[min, max]` arity range
/// (`-1` = unbounded) into the core namespace.
pub(crate) fn register_fn(
    interp: &mut Interp,
    name: &str,
    min: i32,
    max: i32,
    f: impl Fn(&mut Interp, &[Value]) -> Result<Value, Value> + 'static,
) -> Result<(), Value> {
    let func: ForeignFn = Rc::new(f);
    let cell = interp.alloc(CellKind::Foreign {
        name: Rc::from(name),
        func,
        min,
        max,
    })?;
    register_value(interp, name, cell)
}

pub(crate) fn register_value(
    interp: &mut Interp,
    name: &str,
    value: Value,
) -> Result<(), Value> {
    let sym = interp.symbols.intern(None, name);
    let root = interp.root_env;
    interp.heap.sink_push(value);
    let result = env::define(interp, root, sym, value);
    interp.heap.sink_pop();
    result.map(|_| ())
}

// ── shared argument helpers ─────────────────────────────────────

pub(crate) fn want_int(interp: &mut Interp, v: Value) -> Result<i64, Value> {
    v.as_int().ok_or_else(|| {
        let got = interp.type_name(v);
        interp.type_error("int", got)
    })
}

pub(crate) fn want_string(interp: &mut Interp, v: Value) -> Result<String, Value> {
    loam_core::coll::str_to_string(interp, v).ok_or_else(|| {
        let got = interp.type_name(v);
        interp.type_error("string", got)
    })
}

/// Realize any seqable argument (forcing lazy chains) into a Vec. Every
/// collected item is anchored on the sink until `f` returns, so callbacks
/// are free to allocate or collect.
pub(crate) fn with_seq<R>(
    interp: &mut Interp,
    v: Value,
    f: impl FnOnce(&mut Interp, &[Value]) -> Result<R, Value>,
) -> Result<R, Value> {
    let depth = interp.heap.sink_depth();
    let items = match collect_seq(interp, v) {
        Ok(items) => items,
        Err(e) => {
            interp.heap.sink_truncate(depth);
            return Err(e);
        }
    };
    let result = f(interp, &items);
    interp.heap.sink_truncate(depth);
    result
}

/// Walk a seqable value into a Vec, pushing each item onto the sink as it
/// is collected. The caller owns the matching sink truncation.
pub(crate) fn collect_seq(interp: &mut Interp, v: Value) -> Result<Vec<Value>, Value> {
    use loam_core::coll;
    let mut out = Vec::new();
    let mut push = |interp: &mut Interp, out: &mut Vec<Value>, item: Value| {
        interp.heap.sink_push(item);
        out.push(item);
    };
    let mut cur = loam_eval::force_now(interp, v)?;
    loop {
        if cur.is_nil() {
            return Ok(out);
        }
        match interp.kind_of(cur) {
            Some(CellKind::Pair { car, cdr, .. }) => {
                push(interp, &mut out, car);
                cur = loam_eval::force_now(interp, cdr)?;
            }
            Some(
                CellKind::VecSmall(_)
                | CellKind::VecLarge { .. }
                | CellKind::Queue { .. },
            ) => {
                for item in coll::seq_items(interp, cur).unwrap_or_default() {
                    push(interp, &mut out, item);
                }
                return Ok(out);
            }
            Some(CellKind::StrSmall(_) | CellKind::StrLarge { .. }) => {
                for c in coll::str_chars(interp, cur).unwrap_or_default() {
                    push(interp, &mut out, Value::Char(c));
                }
                return Ok(out);
            }
            Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
                for item in coll::set_items(interp, cur).unwrap_or_default() {
                    push(interp, &mut out, item);
                }
                return Ok(out);
            }
            Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
                for (k, val) in coll::map_entries(interp, cur).unwrap_or_default() {
                    let entry = interp.vector(vec![k, val])?;
                    push(interp, &mut out, entry);
                }
                return Ok(out);
            }
            _ => {
                let got = interp.type_name(cur);
                return Err(interp.type_error("seqable", got));
            }
        }
    }
}
