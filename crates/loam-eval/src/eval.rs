use std::rc::Rc;

use loam_core::cell::ClosureDef;
use loam_core::{coll, env, print, CellKind, FnClause, Interp, Op, Syntax, Value};

use crate::destructure;
use crate::read;

/// Drive the machine until the dump stack returns to `entry_depth`. One
/// iteration is one opcode step; a raised exception sets the pending slot
/// and unwinds to the nearest `try` frame above the entry depth, or
/// propagates out.
pub fn run(interp: &mut Interp, entry_depth: usize) -> Result<Value, Value> {
    loop {
        match step(interp, entry_depth) {
            Ok(Some(v)) => return Ok(v),
            Ok(None) => {}
            Err(exc) => {
                interp.pending = Some(exc);
                if !unwind(interp, entry_depth) {
                    let exc = interp.pending.take().unwrap_or(Value::Nil);
                    return Err(exc);
                }
            }
        }
    }
}

/// Unwind the dump stack looking for a `try` frame with a matching catch
/// clause. Returns true when a handler was installed (pending cleared).
fn unwind(interp: &mut Interp, entry_depth: usize) -> bool {
    loop {
        let exc = match interp.pending.take() {
            Some(e) => e,
            None => return true,
        };
        if interp.machine.dump.len() <= entry_depth {
            interp.pending = Some(exc);
            return false;
        }
        let frame = match interp.machine.dump.pop() {
            Some(f) => f,
            None => {
                interp.pending = Some(exc);
                return false;
            }
        };
        interp.machine.trim_recur_targets();
        if frame.op != Op::TryPop {
            interp.pending = Some(exc);
            continue;
        }
        match install_handler(interp, frame.code, frame.envir, exc) {
            Ok(true) => return true,
            Ok(false) => {
                // No clause matched: keep unwinding with the same exception.
                interp.pending = Some(exc);
            }
            Err(new_exc) => {
                // The handler setup itself failed (OOM); unwind with that.
                interp.pending = Some(new_exc);
            }
        }
    }
}

/// Scan `(catch Class sym body...)` clauses in order; the first whose class
/// matches by single-inheritance isa? wins.
fn install_handler(
    interp: &mut Interp,
    clauses: Value,
    try_env: Value,
    exc: Value,
) -> Result<bool, Value> {
    let exc_class = match interp.kind_of(exc) {
        Some(CellKind::Exception { class, .. }) => class,
        _ => interp.classes.throwable,
    };
    let mut cur = clauses;
    while let Some(CellKind::Pair { car: clause, cdr, .. }) = interp.kind_of(cur) {
        cur = cdr;
        let items = match coll::list_to_vec(interp, clause) {
            Some(items) if items.len() >= 2 => items,
            _ => continue,
        };
        // items: [catch Class sym body...]
        let class_sym = match items[1].as_sym() {
            Some(s) => s,
            None => continue,
        };
        if !interp.symbols.isa(exc_class, class_sym) {
            continue;
        }
        let bind_sym = match items.get(2).and_then(|v| v.as_sym()) {
            Some(s) => s,
            None => {
                return Err(interp.illegal_argument("catch: handler binding must be a symbol"));
            }
        };
        let frame = env::new_frame(interp, try_env)?;
        interp.machine.envir = frame;
        env::define(interp, frame, bind_sym, exc)?;
        let body = interp.list(&items[3..])?;
        interp.machine.op = Op::DoSeq;
        interp.machine.code = body;
        interp.machine.args = Value::Nil;
        return Ok(true);
    }
    Ok(false)
}

/// Pop a dump frame and deliver `v` to it, or finish if the dump is back at
/// the entry depth.
pub(crate) fn s_return(
    interp: &mut Interp,
    entry_depth: usize,
    v: Value,
) -> Result<Option<Value>, Value> {
    if interp.machine.dump.len() <= entry_depth {
        interp.machine.value = v;
        return Ok(Some(v));
    }
    let frame = match interp.machine.dump.pop() {
        Some(f) => f,
        None => {
            interp.machine.value = v;
            return Ok(Some(v));
        }
    };
    interp.machine.op = frame.op;
    interp.machine.args = frame.args;
    interp.machine.envir = frame.envir;
    interp.machine.code = frame.code;
    interp.machine.value = v;
    interp.machine.trim_recur_targets();
    Ok(None)
}

fn step(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    match interp.machine.op {
        Op::Eval => step_eval(interp, entry_depth),
        Op::EvalArgs => step_eval_args(interp, entry_depth),
        Op::Apply => step_apply(interp, entry_depth),
        Op::MacroExpand => {
            let expansion = interp.machine.value;
            interp.machine.op = Op::Eval;
            interp.machine.code = expansion;
            Ok(None)
        }
        Op::DoSeq => step_do(interp, entry_depth),
        Op::IfBranch => step_if_branch(interp, entry_depth),
        Op::DefBind => step_def_bind(interp, entry_depth),
        Op::SetBind => step_set_bind(interp, entry_depth),
        Op::LetBind => step_let_bind(interp, entry_depth, false),
        Op::LoopBind => step_let_bind(interp, entry_depth, true),
        Op::CondClauses => step_cond(interp, entry_depth),
        Op::AndNext => step_and_or(interp, entry_depth, true),
        Op::OrNext => step_and_or(interp, entry_depth, false),
        Op::TryPop => {
            let v = interp.machine.value;
            s_return(interp, entry_depth, v)
        }
        Op::RecurArgs => step_recur_args(interp, entry_depth),
        Op::Force => step_force_store(interp, entry_depth),
        Op::EvalVec | Op::EvalMap | Op::EvalSet => step_eval_coll(interp, entry_depth),
        Op::ReadExpr
        | Op::ReadList
        | Op::ReadListTail
        | Op::ReadVector
        | Op::ReadMap
        | Op::ReadSet
        | Op::ReadFnLit
        | Op::ReadWrap
        | Op::ReadDiscard
        | Op::ReadTagged => read::step_read(interp, entry_depth),
    }
}

// ── Eval ────────────────────────────────────────────────────────

fn step_eval(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    match code {
        Value::Sym(s) => {
            let v = env::resolve(interp, envir, s)?;
            s_return(interp, entry_depth, v)
        }
        Value::Cell(r) => match interp.heap.cell(r).kind.clone() {
            CellKind::Pair { car: head, cdr: rest, .. } => {
                if let Value::Sym(s) = head {
                    if let Some(syntax) = interp.symbols.syntax(s) {
                        return special_form(interp, entry_depth, syntax, rest);
                    }
                    // Macro call: head resolves to a macro closure, which
                    // receives the unevaluated forms and whose expansion is
                    // then evaluated in this environment.
                    if let Ok(slot) = env::resolve_slot(interp, envir, s) {
                        let val = env::slot_value(interp, slot);
                        if let Some(CellKind::Closure(def)) = interp.kind_of(val) {
                            if def.is_macro {
                                interp
                                    .machine
                                    .push(Op::MacroExpand, Value::Nil, envir, Value::Nil);
                                interp.machine.value = val;
                                interp.machine.args = rest;
                                interp.machine.op = Op::Apply;
                                return Ok(None);
                            }
                        }
                    }
                }
                interp.machine.push(Op::EvalArgs, Value::Nil, envir, rest);
                interp.machine.op = Op::Eval;
                interp.machine.code = head;
                Ok(None)
            }
            CellKind::VecSmall(_) | CellKind::VecLarge { .. } => {
                let items = coll::vec_items(interp, code).unwrap_or_default();
                start_coll_eval(interp, entry_depth, Op::EvalVec, items)
            }
            CellKind::MapSmall(_) | CellKind::MapLarge { .. } => {
                let entries = coll::map_entries(interp, code).unwrap_or_default();
                let mut items = Vec::with_capacity(entries.len() * 2);
                for (k, v) in entries {
                    items.push(k);
                    items.push(v);
                }
                start_coll_eval(interp, entry_depth, Op::EvalMap, items)
            }
            CellKind::SetSmall(_) | CellKind::SetLarge { .. } => {
                let items = coll::set_items(interp, code).unwrap_or_default();
                start_coll_eval(interp, entry_depth, Op::EvalSet, items)
            }
            _ => s_return(interp, entry_depth, code),
        },
        _ => s_return(interp, entry_depth, code),
    }
}

fn start_coll_eval(
    interp: &mut Interp,
    entry_depth: usize,
    op: Op,
    items: Vec<Value>,
) -> Result<Option<Value>, Value> {
    if items.is_empty() {
        let empty = finalize_coll(interp, op, &[])?;
        return s_return(interp, entry_depth, empty);
    }
    let exprs = interp.list(&items)?;
    let envir = interp.machine.envir;
    let first = coll::car(interp, exprs).unwrap_or(Value::Nil);
    let rest = coll::cdr(interp, exprs).unwrap_or(Value::Nil);
    interp.machine.push(op, Value::Nil, envir, rest);
    interp.machine.op = Op::Eval;
    interp.machine.code = first;
    Ok(None)
}

fn finalize_coll(interp: &mut Interp, op: Op, items: &[Value]) -> Result<Value, Value> {
    match op {
        Op::EvalVec => interp.vector(items.to_vec()),
        Op::EvalSet => coll::set_from_items(interp, items.to_vec()),
        Op::EvalMap => {
            let mut entries: Vec<(Value, Value)> = Vec::with_capacity(items.len() / 2);
            for pair in items.chunks(2) {
                let (k, v) = (pair[0], pair[1]);
                match entries.iter_mut().find(|(ek, _)| coll::equal(interp, *ek, k)) {
                    Some(entry) => entry.1 = v,
                    None => entries.push((k, v)),
                }
            }
            coll::map_from_entries(interp, entries)
        }
        _ => Ok(Value::Nil),
    }
}

fn step_eval_coll(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let op = interp.machine.op;
    let v = interp.machine.value;
    let args = interp.machine.args;
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    let new_args = interp.cons(v, args)?;
    if let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(code) {
        interp.machine.push(op, new_args, envir, cdr);
        interp.machine.op = Op::Eval;
        interp.machine.code = car;
        Ok(None)
    } else {
        interp.machine.args = new_args;
        let full = coll::reverse_list(interp, new_args)?;
        let items = coll::list_to_vec(interp, full).unwrap_or_default();
        interp.machine.args = full;
        let result = finalize_coll(interp, op, &items)?;
        s_return(interp, entry_depth, result)
    }
}

fn step_eval_args(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let v = interp.machine.value;
    let args = interp.machine.args;
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    let new_args = interp.cons(v, args)?;
    match interp.kind_of(code) {
        Some(CellKind::Pair { car, cdr, .. }) => {
            interp.machine.push(Op::EvalArgs, new_args, envir, cdr);
            interp.machine.op = Op::Eval;
            interp.machine.code = car;
            Ok(None)
        }
        _ if code.is_nil() => {
            interp.machine.args = new_args;
            let full = coll::reverse_list(interp, new_args)?;
            interp.machine.value = coll::car(interp, full).unwrap_or(Value::Nil);
            interp.machine.args = coll::cdr(interp, full).unwrap_or(Value::Nil);
            interp.machine.op = Op::Apply;
            let _ = entry_depth;
            Ok(None)
        }
        _ => Err(interp.runtime_error("malformed application: improper argument list")),
    }
}

// ── Apply ───────────────────────────────────────────────────────

fn step_apply(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let f = interp.machine.value;
    let args = interp.machine.args;
    match f {
        Value::Proc(op) => apply_proc(interp, entry_depth, op, args),
        Value::Keyword(_) | Value::Sym(_) => {
            if let Value::Sym(s) = f {
                if interp.symbols.is_class(s) {
                    return construct_exception(interp, entry_depth, s, args);
                }
            }
            let argv = expect_args(interp, args, "keyword lookup", 1, 2)?;
            let coll = argv[0];
            let default = argv.get(1).copied().unwrap_or(Value::Nil);
            let v = get_generic(interp, coll, f).unwrap_or(default);
            s_return(interp, entry_depth, v)
        }
        Value::Cell(r) => match interp.heap.cell(r).kind.clone() {
            CellKind::Closure(def) => apply_closure(interp, f, def, args),
            CellKind::Foreign {
                name, func, min, max,
            } => {
                let argv = match coll::list_to_vec(interp, args) {
                    Some(v) => v,
                    None => {
                        return Err(
                            interp.runtime_error("malformed application: improper argument list")
                        )
                    }
                };
                let n = argv.len();
                if (n as i32) < min || (max >= 0 && (n as i32) > max) {
                    let expected = if max < 0 {
                        format!("{min}+")
                    } else if min == max {
                        format!("{min}")
                    } else {
                        format!("{min}-{max}")
                    };
                    return Err(interp.arity_error(&name, &expected, n));
                }
                // The evaluated argument list stays anchored for the
                // duration of the foreign call.
                interp.heap.sink_push(args);
                let result = func(interp, &argv);
                interp.heap.sink_pop();
                let v = result?;
                s_return(interp, entry_depth, v)
            }
            CellKind::LazySeq { .. } | CellKind::Delay { .. } => {
                Err(interp.class_cast_error("value is not callable: force it first"))
            }
            _ => {
                let got = interp.type_name(f);
                Err(interp.class_cast_error(&format!("not callable: {got}")))
            }
        },
        _ => {
            let got = interp.type_name(f);
            Err(interp.class_cast_error(&format!("not callable: {got}")))
        }
    }
}

fn expect_args(
    interp: &mut Interp,
    args: Value,
    name: &str,
    min: usize,
    max: usize,
) -> Result<Vec<Value>, Value> {
    let argv = match coll::list_to_vec(interp, args) {
        Some(v) => v,
        None => return Err(interp.runtime_error("malformed application")),
    };
    if argv.len() < min || argv.len() > max {
        return Err(interp.arity_error(name, &format!("{min}-{max}"), argv.len()));
    }
    Ok(argv)
}

/// Collection access with a symbol/keyword in operator position, and the
/// generic `get` used by the stdlib.
pub fn get_generic(interp: &Interp, coll_v: Value, key: Value) -> Option<Value> {
    match interp.kind_of(coll_v) {
        Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
            coll::map_get(interp, coll_v, key)
        }
        Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
            if coll::set_contains(interp, coll_v, key) {
                Some(key)
            } else {
                None
            }
        }
        Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => match key {
            Value::Int(i) if i >= 0 => coll::vec_nth(interp, coll_v, i as usize),
            _ => None,
        },
        _ => None,
    }
}

fn construct_exception(
    interp: &mut Interp,
    entry_depth: usize,
    class: loam_core::SymId,
    args: Value,
) -> Result<Option<Value>, Value> {
    let argv = expect_args(interp, args, "exception constructor", 1, 2)?;
    let message = if coll::str_to_string(interp, argv[0]).is_some() {
        argv[0]
    } else {
        let rendered = print::display_str(interp, argv[0]);
        interp.string(&rendered)?
    };
    let data = argv.get(1).copied().unwrap_or(Value::Nil);
    interp.heap.sink_push(message);
    let exc = interp.alloc(CellKind::Exception {
        class,
        message,
        data,
    });
    interp.heap.sink_pop();
    let exc = exc?;
    s_return(interp, entry_depth, exc)
}

fn apply_proc(
    interp: &mut Interp,
    entry_depth: usize,
    op: Op,
    args: Value,
) -> Result<Option<Value>, Value> {
    match op {
        // (apply f a b coll) — spread the last argument.
        Op::Apply => {
            let argv = match coll::list_to_vec(interp, args) {
                Some(v) if v.len() >= 2 => v,
                Some(v) => return Err(interp.arity_error("apply", "2+", v.len())),
                None => return Err(interp.runtime_error("malformed application")),
            };
            let f = argv[0];
            let last = *argv.last().expect("len >= 2");
            let last = crate::force_now(interp, last)?;
            let mut spread: Vec<Value> = argv[1..argv.len() - 1].to_vec();
            match coll::seq_items(interp, last) {
                Some(items) => spread.extend(items),
                None if last.is_nil() => {}
                None => {
                    let got = interp.type_name(last);
                    return Err(interp.type_error("seqable last argument", got));
                }
            }
            let arg_list = interp.list(&spread)?;
            interp.machine.value = f;
            interp.machine.args = arg_list;
            interp.machine.op = Op::Apply;
            Ok(None)
        }
        // (eval expr) — evaluate in the user namespace.
        Op::Eval => {
            let argv = expect_args(interp, args, "eval", 1, 1)?;
            interp.machine.op = Op::Eval;
            interp.machine.code = argv[0];
            interp.machine.envir = interp.user_env;
            Ok(None)
        }
        // (read port) — reuse the reader opcodes.
        Op::ReadExpr => {
            let argv = expect_args(interp, args, "read", 1, 1)?;
            if !matches!(interp.kind_of(argv[0]), Some(CellKind::Port(_))) {
                let got = interp.type_name(argv[0]);
                return Err(interp.type_error("port", got));
            }
            interp.machine.op = Op::ReadExpr;
            interp.machine.code = argv[0];
            Ok(None)
        }
        // (force d) — run the producer, memoize in place.
        Op::Force => {
            let argv = expect_args(interp, args, "force", 1, 1)?;
            force_step(interp, entry_depth, argv[0])
        }
        _ => {
            let got = format!("{op:?}");
            Err(interp.class_cast_error(&format!("not callable: #<proc {got}>")))
        }
    }
}

/// Begin forcing a delay/lazy-seq on the machine: push a memoize frame and
/// apply the producer. Realized cells return their cached value; repeat
/// forcing is idempotent.
pub fn force_step(
    interp: &mut Interp,
    entry_depth: usize,
    v: Value,
) -> Result<Option<Value>, Value> {
    match interp.kind_of(v) {
        Some(CellKind::LazySeq {
            thunk,
            value,
            realized,
        })
        | Some(CellKind::Delay {
            thunk,
            value,
            realized,
        }) => {
            if realized {
                return s_return(interp, entry_depth, value);
            }
            let envir = interp.machine.envir;
            interp.machine.push(Op::Force, Value::Nil, envir, v);
            interp.machine.value = thunk;
            interp.machine.args = Value::Nil;
            interp.machine.op = Op::Apply;
            Ok(None)
        }
        _ => s_return(interp, entry_depth, v),
    }
}

fn step_force_store(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let produced = interp.machine.value;
    let cell_v = interp.machine.code;
    if let Some(r) = cell_v.as_cell() {
        match &mut interp.heap.cell_mut(r).kind {
            CellKind::LazySeq { value, realized, .. }
            | CellKind::Delay { value, realized, .. } => {
                *value = produced;
                *realized = true;
            }
            _ => {}
        }
    }
    s_return(interp, entry_depth, produced)
}

fn apply_closure(
    interp: &mut Interp,
    closure_val: Value,
    def: Rc<ClosureDef>,
    args: Value,
) -> Result<Option<Value>, Value> {
    let argv = match coll::list_to_vec(interp, args) {
        Some(v) => v,
        None => return Err(interp.runtime_error("malformed application")),
    };
    let n = argv.len();
    // First arity whose shape matches the call wins.
    let clause = def
        .clauses
        .iter()
        .find(|c| destructure::clause_matches(interp, c.params, n))
        .cloned();
    let clause = match clause {
        Some(c) => c,
        None => {
            let name = def
                .name
                .map(|s| interp.symbols.qualified_name(s))
                .unwrap_or_else(|| "fn".to_string());
            return Err(interp.arity_error(&name, "a matching arity", n));
        }
    };
    let frame = env::new_frame(interp, def.env)?;
    // Root the frame immediately; everything below may collect.
    interp.machine.envir = frame;
    if let Some(name) = def.name {
        env::define(interp, frame, name, closure_val)?;
    }
    destructure::bind_params(interp, frame, clause.params, &argv)?;
    let binders = destructure::recur_binders(interp, clause.params);
    let binders_list = interp.list(&binders)?;
    // Tail jump into the body — no dump growth for calls in tail position.
    interp.machine.push_recur_target(binders_list, clause.body, frame);
    interp.machine.op = Op::DoSeq;
    interp.machine.code = clause.body;
    interp.machine.args = Value::Nil;
    Ok(None)
}

// ── Sequencing and branching ────────────────────────────────────

fn step_do(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    match interp.kind_of(code) {
        Some(CellKind::Pair { car, cdr, .. }) => {
            if cdr.is_nil() {
                // Tail position: evaluate without pushing.
                interp.machine.op = Op::Eval;
                interp.machine.code = car;
            } else {
                interp.machine.push(Op::DoSeq, Value::Nil, envir, cdr);
                interp.machine.op = Op::Eval;
                interp.machine.code = car;
            }
            Ok(None)
        }
        _ => s_return(interp, entry_depth, Value::Nil),
    }
}

fn step_if_branch(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let test = interp.machine.value;
    let code = interp.machine.code;
    let then = coll::car(interp, code).unwrap_or(Value::Nil);
    let rest = coll::cdr(interp, code).unwrap_or(Value::Nil);
    if test.is_truthy() {
        interp.machine.op = Op::Eval;
        interp.machine.code = then;
        Ok(None)
    } else if let Some(else_expr) = coll::car(interp, rest) {
        interp.machine.op = Op::Eval;
        interp.machine.code = else_expr;
        Ok(None)
    } else {
        s_return(interp, entry_depth, Value::Nil)
    }
}

fn step_def_bind(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let value = interp.machine.value;
    let sym = match interp.machine.code.as_sym() {
        Some(s) => s,
        None => return Err(interp.illegal_argument("def: name must be a symbol")),
    };
    let ns = env::namespace_of(interp, interp.machine.envir);
    let slot = env::define(interp, ns, sym, value)?;
    s_return(interp, entry_depth, slot)
}

fn step_set_bind(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let value = interp.machine.value;
    let envir = interp.machine.envir;
    let sym = match interp.machine.code.as_sym() {
        Some(s) => s,
        None => return Err(interp.illegal_argument("set!: target must be a symbol")),
    };
    let slot = env::resolve_slot(interp, envir, sym)?;
    env::set_slot(interp, slot, value)?;
    s_return(interp, entry_depth, value)
}

/// Resume a `let`/`loop` binding step: bind the pattern whose init just
/// evaluated, then either evaluate the next init or enter the body.
fn step_let_bind(
    interp: &mut Interp,
    entry_depth: usize,
    is_loop: bool,
) -> Result<Option<Value>, Value> {
    let value = interp.machine.value;
    let envir = interp.machine.envir;
    let code = interp.machine.code;
    let patterns = interp.machine.args;
    let pairs = coll::car(interp, code).unwrap_or(Value::Nil);
    let body = coll::cdr(interp, code).unwrap_or(Value::Nil);
    let current = coll::car(interp, pairs).unwrap_or(Value::Nil);
    let pattern = coll::car(interp, current).unwrap_or(Value::Nil);
    destructure::bind(interp, envir, pattern, value)?;
    let rest = coll::cdr(interp, pairs).unwrap_or(Value::Nil);
    match interp.kind_of(rest) {
        Some(CellKind::Pair { car: next, .. }) => {
            let next_expr = coll::cdr(interp, next).unwrap_or(Value::Nil);
            let tail_code = interp.cons(rest, body)?;
            let op = if is_loop { Op::LoopBind } else { Op::LetBind };
            interp.machine.push(op, patterns, envir, tail_code);
            interp.machine.op = Op::Eval;
            interp.machine.code = next_expr;
            Ok(None)
        }
        _ => {
            if is_loop {
                interp.machine.push_recur_target(patterns, body, envir);
            }
            interp.machine.op = Op::DoSeq;
            interp.machine.code = body;
            let _ = entry_depth;
            Ok(None)
        }
    }
}

fn step_cond(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let test = interp.machine.value;
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    let then = coll::car(interp, code).unwrap_or(Value::Nil);
    let rest = coll::cdr(interp, code).unwrap_or(Value::Nil);
    if test.is_truthy() {
        interp.machine.op = Op::Eval;
        interp.machine.code = then;
        return Ok(None);
    }
    match interp.kind_of(rest) {
        Some(CellKind::Pair { car: next_test, cdr, .. }) => {
            let next_then = coll::car(interp, cdr).unwrap_or(Value::Nil);
            let after = coll::cdr(interp, cdr).unwrap_or(Value::Nil);
            let frame_code = interp.cons(next_then, after)?;
            interp.machine.push(Op::CondClauses, Value::Nil, envir, frame_code);
            interp.machine.op = Op::Eval;
            interp.machine.code = next_test;
            Ok(None)
        }
        _ => s_return(interp, entry_depth, Value::Nil),
    }
}

fn step_and_or(
    interp: &mut Interp,
    entry_depth: usize,
    is_and: bool,
) -> Result<Option<Value>, Value> {
    let v = interp.machine.value;
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    let short_circuit = if is_and { !v.is_truthy() } else { v.is_truthy() };
    if short_circuit {
        return s_return(interp, entry_depth, v);
    }
    match interp.kind_of(code) {
        Some(CellKind::Pair { car, cdr, .. }) => {
            if cdr.is_nil() {
                interp.machine.op = Op::Eval;
                interp.machine.code = car;
            } else {
                let op = if is_and { Op::AndNext } else { Op::OrNext };
                interp.machine.push(op, Value::Nil, envir, cdr);
                interp.machine.op = Op::Eval;
                interp.machine.code = car;
            }
            Ok(None)
        }
        _ => s_return(interp, entry_depth, v),
    }
}

fn step_recur_args(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let v = interp.machine.value;
    let args = interp.machine.args;
    let code = interp.machine.code;
    let envir = interp.machine.envir;
    let new_args = interp.cons(v, args)?;
    match interp.kind_of(code) {
        Some(CellKind::Pair { car, cdr, .. }) => {
            interp.machine.push(Op::RecurArgs, new_args, envir, cdr);
            interp.machine.op = Op::Eval;
            interp.machine.code = car;
            Ok(None)
        }
        _ => {
            interp.machine.args = new_args;
            let full = coll::reverse_list(interp, new_args)?;
            interp.machine.args = full;
            let values = coll::list_to_vec(interp, full).unwrap_or_default();
            jump_recur(interp, entry_depth, &values)
        }
    }
}

/// Rebind the nearest recur target's patterns and jump back into its body.
/// The dump stack does not grow: a million iterations run in constant
/// continuation depth.
fn jump_recur(
    interp: &mut Interp,
    _entry_depth: usize,
    values: &[Value],
) -> Result<Option<Value>, Value> {
    let target = match interp.machine.recur.last() {
        Some(t) => t.clone(),
        None => return Err(interp.runtime_error("recur with no enclosing loop or fn")),
    };
    let binders = coll::list_to_vec(interp, target.binders).unwrap_or_default();
    if binders.len() != values.len() {
        return Err(interp.arity_error("recur", &binders.len().to_string(), values.len()));
    }
    for (pat, val) in binders.iter().zip(values.iter()) {
        destructure::bind(interp, target.envir, *pat, *val)?;
    }
    interp.machine.envir = target.envir;
    interp.machine.op = Op::DoSeq;
    interp.machine.code = target.body;
    interp.machine.args = Value::Nil;
    Ok(None)
}

// ── Special forms ───────────────────────────────────────────────

fn special_form(
    interp: &mut Interp,
    entry_depth: usize,
    syntax: Syntax,
    rest: Value,
) -> Result<Option<Value>, Value> {
    let envir = interp.machine.envir;
    match syntax {
        Syntax::Quote => {
            let v = coll::car(interp, rest).unwrap_or(Value::Nil);
            s_return(interp, entry_depth, v)
        }
        Syntax::If => {
            let test = coll::car(interp, rest).unwrap_or(Value::Nil);
            let branches = coll::cdr(interp, rest).unwrap_or(Value::Nil);
            if branches.is_nil() {
                return Err(interp.arity_error("if", "2-3", 1));
            }
            interp.machine.push(Op::IfBranch, Value::Nil, envir, branches);
            interp.machine.op = Op::Eval;
            interp.machine.code = test;
            Ok(None)
        }
        Syntax::Do => {
            interp.machine.op = Op::DoSeq;
            interp.machine.code = rest;
            Ok(None)
        }
        Syntax::Def => {
            let sym_v = coll::car(interp, rest).unwrap_or(Value::Nil);
            if sym_v.as_sym().is_none() {
                return Err(interp.illegal_argument("def: name must be a symbol"));
            }
            let init = coll::cdr(interp, rest).unwrap_or(Value::Nil);
            match coll::car(interp, init) {
                Some(expr) => {
                    interp.machine.push(Op::DefBind, Value::Nil, envir, sym_v);
                    interp.machine.op = Op::Eval;
                    interp.machine.code = expr;
                    Ok(None)
                }
                None => {
                    let sym = sym_v.as_sym().expect("checked above");
                    let ns = env::namespace_of(interp, envir);
                    let slot = env::define(interp, ns, sym, Value::Nil)?;
                    s_return(interp, entry_depth, slot)
                }
            }
        }
        Syntax::SetBang => {
            let sym_v = coll::car(interp, rest).unwrap_or(Value::Nil);
            let expr = coll::car(interp, coll::cdr(interp, rest).unwrap_or(Value::Nil))
                .unwrap_or(Value::Nil);
            if sym_v.as_sym().is_none() {
                return Err(interp.illegal_argument("set!: target must be a symbol"));
            }
            interp.machine.push(Op::SetBind, Value::Nil, envir, sym_v);
            interp.machine.op = Op::Eval;
            interp.machine.code = expr;
            Ok(None)
        }
        Syntax::Let | Syntax::Loop => {
            start_let(interp, entry_depth, rest, syntax == Syntax::Loop)
        }
        Syntax::Cond => {
            let items = match coll::list_to_vec(interp, rest) {
                Some(v) => v,
                None => return Err(interp.runtime_error("cond: malformed clause list")),
            };
            if items.is_empty() {
                return s_return(interp, entry_depth, Value::Nil);
            }
            if items.len() % 2 != 0 {
                return Err(interp.illegal_argument("cond requires an even number of forms"));
            }
            let then = items[1];
            let after = interp.list(&items[2..])?;
            interp.heap.sink_push(after);
            let frame_code = interp.cons(then, after);
            interp.heap.sink_pop();
            let frame_code = frame_code?;
            interp.machine.push(Op::CondClauses, Value::Nil, envir, frame_code);
            interp.machine.op = Op::Eval;
            interp.machine.code = items[0];
            Ok(None)
        }
        Syntax::And | Syntax::Or => {
            let is_and = syntax == Syntax::And;
            match interp.kind_of(rest) {
                Some(CellKind::Pair { car, cdr, .. }) => {
                    if cdr.is_nil() {
                        interp.machine.op = Op::Eval;
                        interp.machine.code = car;
                    } else {
                        let op = if is_and { Op::AndNext } else { Op::OrNext };
                        interp.machine.push(op, Value::Nil, envir, cdr);
                        interp.machine.op = Op::Eval;
                        interp.machine.code = car;
                    }
                    Ok(None)
                }
                _ => s_return(interp, entry_depth, Value::Bool(is_and)),
            }
        }
        Syntax::Fn => {
            let closure = make_closure(interp, rest, false, envir)?;
            s_return(interp, entry_depth, closure)
        }
        Syntax::Macro => {
            let closure = make_closure(interp, rest, true, envir)?;
            s_return(interp, entry_depth, closure)
        }
        Syntax::LazySeq | Syntax::Delay => {
            let thunk = zero_arg_closure(interp, rest, envir)?;
            interp.heap.sink_push(thunk);
            let cell = if syntax == Syntax::LazySeq {
                interp.alloc(CellKind::LazySeq {
                    thunk,
                    value: Value::Nil,
                    realized: false,
                })
            } else {
                interp.alloc(CellKind::Delay {
                    thunk,
                    value: Value::Nil,
                    realized: false,
                })
            };
            interp.heap.sink_pop();
            let cell = cell?;
            s_return(interp, entry_depth, cell)
        }
        Syntax::Var => {
            let sym = match coll::car(interp, rest).and_then(|v| v.as_sym()) {
                Some(s) => s,
                None => return Err(interp.illegal_argument("var: expected a symbol")),
            };
            let slot = env::resolve_slot(interp, envir, sym)?;
            s_return(interp, entry_depth, slot)
        }
        Syntax::Try => start_try(interp, entry_depth, rest),
        Syntax::Catch => Err(interp.runtime_error("catch used outside try")),
        Syntax::Recur => {
            if interp.machine.recur.is_empty() {
                return Err(interp.runtime_error("recur with no enclosing loop or fn"));
            }
            match interp.kind_of(rest) {
                Some(CellKind::Pair { car, cdr, .. }) => {
                    interp.machine.push(Op::RecurArgs, Value::Nil, envir, cdr);
                    interp.machine.op = Op::Eval;
                    interp.machine.code = car;
                    Ok(None)
                }
                _ => jump_recur(interp, entry_depth, &[]),
            }
        }
        Syntax::Thread => spawn_thread(interp, entry_depth, rest),
    }
}

fn start_let(
    interp: &mut Interp,
    entry_depth: usize,
    rest: Value,
    is_loop: bool,
) -> Result<Option<Value>, Value> {
    let name = if is_loop { "loop" } else { "let" };
    let bindings_v = coll::car(interp, rest).unwrap_or(Value::Nil);
    let body = coll::cdr(interp, rest).unwrap_or(Value::Nil);
    let bindings = match coll::vec_items(interp, bindings_v) {
        Some(items) => items,
        None => {
            return Err(
                interp.illegal_argument(&format!("{name}: bindings must be a vector"))
            )
        }
    };
    if bindings.len() % 2 != 0 {
        return Err(interp.illegal_argument(&format!(
            "{name}: bindings require an even number of forms"
        )));
    }
    let envir = interp.machine.envir;
    let frame = env::new_frame(interp, envir)?;
    interp.machine.envir = frame;
    if bindings.is_empty() {
        if is_loop {
            interp.machine.push_recur_target(Value::Nil, body, frame);
        }
        interp.machine.op = Op::DoSeq;
        interp.machine.code = body;
        let _ = entry_depth;
        return Ok(None);
    }
    // Build ((pattern . init) ...) plus the flat pattern list for recur.
    let depth = interp.heap.sink_depth();
    let setup = (|| {
        let mut pairs: Vec<Value> = Vec::with_capacity(bindings.len() / 2);
        let mut patterns: Vec<Value> = Vec::with_capacity(bindings.len() / 2);
        for chunk in bindings.chunks(2) {
            let pair = interp.cons(chunk[0], chunk[1])?;
            interp.heap.sink_push(pair);
            pairs.push(pair);
            patterns.push(chunk[0]);
        }
        let pairs_list = interp.list(&pairs)?;
        interp.heap.sink_push(pairs_list);
        let patterns_list = interp.list(&patterns)?;
        interp.heap.sink_push(patterns_list);
        let frame_code = interp.cons(pairs_list, body)?;
        let first_init = coll::cdr(interp, pairs[0]).unwrap_or(Value::Nil);
        Ok((patterns_list, frame_code, first_init))
    })();
    interp.heap.sink_truncate(depth);
    let (patterns_list, frame_code, first_init) = setup?;
    let op = if is_loop { Op::LoopBind } else { Op::LetBind };
    interp.machine.push(op, patterns_list, frame, frame_code);
    interp.machine.op = Op::Eval;
    interp.machine.code = first_init;
    Ok(None)
}

fn start_try(
    interp: &mut Interp,
    entry_depth: usize,
    rest: Value,
) -> Result<Option<Value>, Value> {
    let items = match coll::list_to_vec(interp, rest) {
        Some(v) => v,
        None => return Err(interp.runtime_error("try: malformed body")),
    };
    let mut body = Vec::new();
    let mut catches = Vec::new();
    for item in items {
        if is_catch_clause(interp, item) {
            catches.push(item);
        } else if !catches.is_empty() {
            return Err(interp.illegal_argument("try: catch clauses must come last"));
        } else {
            body.push(item);
        }
    }
    let envir = interp.machine.envir;
    let body_list = interp.list(&body)?;
    interp.heap.sink_push(body_list);
    let catch_list = interp.list(&catches);
    interp.heap.sink_pop();
    let catch_list = catch_list?;
    interp.machine.push(Op::TryPop, Value::Nil, envir, catch_list);
    interp.machine.op = Op::DoSeq;
    interp.machine.code = body_list;
    let _ = entry_depth;
    Ok(None)
}

fn is_catch_clause(interp: &Interp, v: Value) -> bool {
    match interp.kind_of(v) {
        Some(CellKind::Pair { car, .. }) => match car.as_sym() {
            Some(s) => interp.symbols.syntax(s) == Some(Syntax::Catch),
            None => false,
        },
        _ => false,
    }
}

/// `(fn name? [params] body...)`, `(fn name? ([p] b) ([p q] b))`, or the
/// dotted-pair style `(fn name? (a b . rest) body...)`.
fn make_closure(
    interp: &mut Interp,
    rest: Value,
    is_macro: bool,
    envir: Value,
) -> Result<Value, Value> {
    let mut items = match coll::list_to_vec(interp, rest) {
        Some(v) => v,
        None => return Err(interp.runtime_error("fn: malformed form")),
    };
    let mut name = None;
    if let Some(first) = items.first() {
        if let Some(sym) = first.as_sym() {
            name = Some(sym);
            items.remove(0);
        }
    }
    let first = match items.first() {
        Some(v) => *v,
        None => return Err(interp.illegal_argument("fn: missing parameter list")),
    };
    let mut clauses = Vec::new();
    let depth = interp.heap.sink_depth();
    let is_vector = coll::vec_items(interp, first).is_some();
    let first_is_clause_list = matches!(interp.kind_of(first), Some(CellKind::Pair { car, .. })
        if coll::vec_items(interp, car).is_some());
    if is_vector {
        let body = interp.list(&items[1..])?;
        // Anchor the fresh body list until the closure cell owns it.
        interp.heap.sink_push(body);
        clauses.push(FnClause {
            params: first,
            body,
        });
    } else if first_is_clause_list {
        // Multi-arity: every item is ([params] body...).
        for item in &items {
            let params = match coll::car(interp, *item) {
                Some(p) if coll::vec_items(interp, p).is_some() => p,
                _ => {
                    return Err(interp.illegal_argument(
                        "fn: each arity clause must start with a parameter vector",
                    ))
                }
            };
            let body = coll::cdr(interp, *item).unwrap_or(Value::Nil);
            clauses.push(FnClause { params, body });
        }
    } else if matches!(interp.kind_of(first), Some(CellKind::Pair { .. })) || first.is_nil() {
        // Dotted-pair or plain list parameters.
        let body = interp.list(&items[1..])?;
        interp.heap.sink_push(body);
        clauses.push(FnClause {
            params: first,
            body,
        });
    } else {
        let got = interp.type_name(first);
        return Err(interp.illegal_argument(&format!(
            "fn: expected parameter vector or list, got {got}"
        )));
    }
    let closure = interp.alloc(CellKind::Closure(Rc::new(ClosureDef {
        clauses,
        env: envir,
        name,
        is_macro,
    })));
    interp.heap.sink_truncate(depth);
    closure
}

fn zero_arg_closure(interp: &mut Interp, body: Value, envir: Value) -> Result<Value, Value> {
    interp.alloc(CellKind::Closure(Rc::new(ClosureDef {
        clauses: vec![FnClause {
            params: Value::Nil,
            body,
        }],
        env: envir,
        name: None,
        is_macro: false,
    })))
}

// ── thread ──────────────────────────────────────────────────────

/// Is this expression pure printable data — something `pr-str` renders in
/// reader syntax? Closures, ports, vars and friends cannot cross a heap
/// boundary.
fn printable_data(interp: &Interp, root: Value) -> bool {
    let mut work = vec![root];
    while let Some(v) = work.pop() {
        match v {
            Value::Nil
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Char(_)
            | Value::Sym(_)
            | Value::Keyword(_) => {}
            Value::Proc(_) | Value::Eof => return false,
            Value::Cell(_) => match interp.kind_of(v) {
                Some(CellKind::Pair { car, cdr, meta }) => {
                    work.push(car);
                    work.push(cdr);
                    work.push(meta);
                }
                Some(
                    CellKind::VecSmall(_)
                    | CellKind::VecLarge { .. }
                    | CellKind::Queue { .. },
                ) => {
                    work.extend(coll::seq_items(interp, v).unwrap_or_default());
                }
                Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
                    work.extend(coll::set_items(interp, v).unwrap_or_default());
                }
                Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
                    for (k, val) in coll::map_entries(interp, v).unwrap_or_default() {
                        work.push(k);
                        work.push(val);
                    }
                }
                Some(
                    CellKind::StrSmall(_)
                    | CellKind::StrLarge { .. }
                    | CellKind::Ratio { .. }
                    | CellKind::Regex(_),
                ) => {}
                _ => return false,
            },
        }
    }
    true
}

/// `(thread expr)`: spawn an OS thread running a fresh interpreter over its
/// own heap. The unevaluated expression is rendered to source and re-read
/// in the spawned interpreter; every evaluator's roots are scanned by its
/// own collector. Fire-and-forget.
fn spawn_thread(
    interp: &mut Interp,
    entry_depth: usize,
    rest: Value,
) -> Result<Option<Value>, Value> {
    let expr = match coll::car(interp, rest) {
        Some(e) => e,
        None => return Err(interp.arity_error("thread", "1", 0)),
    };
    if !printable_data(interp, expr) {
        return Err(
            interp.illegal_argument("thread: expression must be printable data")
        );
    }
    let src = print::pr_str(interp, expr);
    let bootstrap = interp.thread_bootstrap;
    std::thread::spawn(move || {
        let mut child = Interp::new();
        if let Some(install) = bootstrap {
            install(&mut child);
        }
        let _ = crate::eval_str(&mut child, "<thread>", &src);
    });
    s_return(interp, entry_depth, Value::Nil)
}
