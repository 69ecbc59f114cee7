use std::cell::RefCell;
use std::rc::Rc;

use loam_core::port::PortState;
use loam_core::{coll, CellKind, Interp, Op, Value};

use crate::eval::s_return;
use crate::lexer::{self, reader_error, Delim, Token};

/// The reader is expressed as machine opcodes sharing the dump stack:
/// every nested aggregate pushes a resume frame and recurses into
/// "read expression", so deeply nested literals never touch the native
/// stack.
pub fn step_read(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    match interp.machine.op {
        Op::ReadExpr => step_read_expr(interp, entry_depth),
        Op::ReadList | Op::ReadVector | Op::ReadMap | Op::ReadSet | Op::ReadFnLit => {
            step_read_accumulate(interp)
        }
        Op::ReadListTail => step_read_list_tail(interp, entry_depth),
        Op::ReadWrap => step_read_wrap(interp, entry_depth),
        Op::ReadDiscard => {
            // Drop the #_-discarded form, read the next one.
            interp.machine.op = Op::ReadExpr;
            Ok(None)
        }
        Op::ReadTagged => step_read_tagged(interp, entry_depth),
        _ => unreachable!("non-reader opcode routed to step_read"),
    }
}

pub fn port_of(interp: &mut Interp, v: Value) -> Result<Rc<RefCell<PortState>>, Value> {
    match interp.kind_of(v) {
        Some(CellKind::Port(p)) => Ok(p),
        _ => {
            let got = interp.type_name(v);
            Err(interp.type_error("port", got))
        }
    }
}

fn is_read_frame(op: Op) -> bool {
    matches!(
        op,
        Op::ReadList
            | Op::ReadListTail
            | Op::ReadVector
            | Op::ReadMap
            | Op::ReadSet
            | Op::ReadFnLit
            | Op::ReadWrap
            | Op::ReadDiscard
            | Op::ReadTagged
    )
}

fn step_read_expr(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let port_v = interp.machine.code;
    let envir = interp.machine.envir;
    let port = port_of(interp, port_v)?;
    let tok = lexer::next_token(interp, &port)?;
    match tok {
        Token::Atom(v) => s_return(interp, entry_depth, v),
        Token::Open(Delim::Paren) => {
            interp.machine.push(Op::ReadList, Value::Nil, envir, port_v);
            Ok(None)
        }
        Token::Open(Delim::Bracket) => {
            interp.machine.push(Op::ReadVector, Value::Nil, envir, port_v);
            Ok(None)
        }
        Token::Open(Delim::Brace) => {
            interp.machine.push(Op::ReadMap, Value::Nil, envir, port_v);
            Ok(None)
        }
        Token::SetOpen => {
            interp.machine.push(Op::ReadSet, Value::Nil, envir, port_v);
            Ok(None)
        }
        Token::FnOpen => {
            interp.machine.push(Op::ReadFnLit, Value::Nil, envir, port_v);
            Ok(None)
        }
        Token::Close(delim) => {
            let top = interp.machine.dump.last().map(|f| f.op);
            let matches = matches!(
                (delim, top),
                (Delim::Paren, Some(Op::ReadList))
                    | (Delim::Paren, Some(Op::ReadFnLit))
                    | (Delim::Bracket, Some(Op::ReadVector))
                    | (Delim::Brace, Some(Op::ReadMap))
                    | (Delim::Brace, Some(Op::ReadSet))
            );
            if !matches {
                let c = match delim {
                    Delim::Paren => ')',
                    Delim::Bracket => ']',
                    Delim::Brace => '}',
                };
                return Err(reader_error(
                    interp,
                    &port,
                    &format!("unmatched delimiter {c}"),
                ));
            }
            let frame = interp.machine.dump.pop().expect("matched above");
            let result = finalize_aggregate(interp, frame.op, frame.args, &port)?;
            s_return(interp, entry_depth, result)
        }
        Token::Quote => push_wrap(interp, "quote", envir, port_v),
        Token::Quasiquote => push_wrap(interp, "quasiquote", envir, port_v),
        Token::Unquote => push_wrap(interp, "unquote", envir, port_v),
        Token::UnquoteSplice => push_wrap(interp, "unquote-splicing", envir, port_v),
        Token::Deref => push_wrap(interp, "deref", envir, port_v),
        Token::Discard => {
            interp.machine.push(Op::ReadDiscard, Value::Nil, envir, port_v);
            Ok(None)
        }
        Token::Tagged(tag) => {
            let tag_sym = interp.sym(&tag);
            interp.machine.push(Op::ReadTagged, tag_sym, envir, port_v);
            Ok(None)
        }
        Token::Dot => {
            // Only meaningful directly inside a list aggregate.
            if interp.machine.dump.last().map(|f| f.op) == Some(Op::ReadList) {
                let frame = interp.machine.dump.pop().expect("checked above");
                interp
                    .machine
                    .push(Op::ReadListTail, frame.args, envir, port_v);
                Ok(None)
            } else {
                Err(reader_error(interp, &port, "unexpected '.'"))
            }
        }
        Token::Eof => {
            if interp
                .machine
                .dump
                .last()
                .map(|f| is_read_frame(f.op))
                .unwrap_or(false)
            {
                Err(reader_error(
                    interp,
                    &port,
                    "unexpected end of input: unterminated form",
                ))
            } else {
                s_return(interp, entry_depth, Value::Eof)
            }
        }
    }
}

fn push_wrap(
    interp: &mut Interp,
    wrapper: &str,
    envir: Value,
    port_v: Value,
) -> Result<Option<Value>, Value> {
    let sym = interp.sym(wrapper);
    interp.machine.push(Op::ReadWrap, sym, envir, port_v);
    interp.machine.op = Op::ReadExpr;
    interp.machine.code = port_v;
    Ok(None)
}

/// An element arrived for an aggregate under construction: accumulate it
/// (reversed) in the `args` register and keep reading.
fn step_read_accumulate(interp: &mut Interp) -> Result<Option<Value>, Value> {
    let op = interp.machine.op;
    let v = interp.machine.value;
    let args = interp.machine.args;
    let envir = interp.machine.envir;
    let port_v = interp.machine.code;
    let new_args = interp.cons(v, args)?;
    interp.machine.push(op, new_args, envir, port_v);
    interp.machine.op = Op::ReadExpr;
    interp.machine.code = port_v;
    Ok(None)
}

fn step_read_list_tail(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let tail = interp.machine.value;
    let args = interp.machine.args;
    let port_v = interp.machine.code;
    let port = port_of(interp, port_v)?;
    match lexer::next_token(interp, &port)? {
        Token::Close(Delim::Paren) => {
            // Reverse the accumulated elements onto the dotted tail.
            let mut out = tail;
            let mut cur = args;
            while let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(cur) {
                interp.heap.sink_push(out);
                let next = interp.cons(car, out);
                interp.heap.sink_pop();
                out = next?;
                cur = cdr;
            }
            s_return(interp, entry_depth, out)
        }
        _ => Err(reader_error(
            interp,
            &port,
            "expected ) after dotted tail",
        )),
    }
}

fn step_read_wrap(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let v = interp.machine.value;
    let wrapper = interp.machine.args;
    let wrapper_sym = wrapper.as_sym();
    let is_quasiquote = wrapper_sym
        .map(|s| interp.symbols.name(s) == "quasiquote")
        .unwrap_or(false);
    if is_quasiquote {
        let expanded = expand_quasiquote(interp, v)?;
        return s_return(interp, entry_depth, expanded);
    }
    let wrapped = interp.list(&[wrapper, v])?;
    s_return(interp, entry_depth, wrapped)
}

fn step_read_tagged(interp: &mut Interp, entry_depth: usize) -> Result<Option<Value>, Value> {
    let v = interp.machine.value;
    let tag = interp.machine.args;
    let quote = interp.sym("quote");
    let quoted_tag = interp.list(&[quote, tag])?;
    interp.heap.sink_push(quoted_tag);
    let tagged = interp.sym("tagged-literal");
    let form = interp.list(&[tagged, quoted_tag, v]);
    interp.heap.sink_pop();
    let form = form?;
    s_return(interp, entry_depth, form)
}

fn finalize_aggregate(
    interp: &mut Interp,
    op: Op,
    args: Value,
    port: &Rc<RefCell<PortState>>,
) -> Result<Value, Value> {
    let reversed = coll::reverse_list(interp, args)?;
    interp.heap.sink_push(reversed);
    let result = finalize_items(interp, op, reversed, port);
    interp.heap.sink_pop();
    result
}

fn finalize_items(
    interp: &mut Interp,
    op: Op,
    items_list: Value,
    port: &Rc<RefCell<PortState>>,
) -> Result<Value, Value> {
    let items = coll::list_to_vec(interp, items_list).unwrap_or_default();
    match op {
        Op::ReadList => Ok(items_list),
        Op::ReadVector => interp.vector(items),
        Op::ReadSet => coll::set_from_items(interp, items),
        Op::ReadMap => {
            if items.len() % 2 != 0 {
                return Err(reader_error(
                    interp,
                    port,
                    "map literal must contain an even number of forms",
                ));
            }
            let mut entries: Vec<(Value, Value)> = Vec::with_capacity(items.len() / 2);
            for pair in items.chunks(2) {
                let (k, v) = (pair[0], pair[1]);
                match entries.iter_mut().find(|(ek, _)| coll::equal(interp, *ek, k)) {
                    Some(e) => e.1 = v,
                    None => entries.push((k, v)),
                }
            }
            coll::map_from_entries(interp, entries)
        }
        Op::ReadFnLit => fn_literal(interp, &items),
        _ => Ok(Value::Nil),
    }
}

/// `#(...)` anonymous-fn literal: rewrite `%`/`%N`/`%&` into a generated
/// `(fn [%1 ... %N & %&] (...))`.
fn fn_literal(interp: &mut Interp, body: &[Value]) -> Result<Value, Value> {
    let mut max_arg = 0usize;
    let mut has_rest = false;
    scan_percents(interp, body, &mut max_arg, &mut has_rest);
    let mut params: Vec<Value> = Vec::new();
    for i in 1..=max_arg {
        params.push(interp.sym(&format!("%{i}")));
    }
    if has_rest {
        params.push(interp.sym("&"));
        params.push(interp.sym("%&"));
    }
    let depth = interp.heap.sink_depth();
    let result = (|| {
        let call = interp.list(body)?;
        interp.heap.sink_push(call);
        let rewritten = rewrite_percent(interp, call)?;
        interp.heap.sink_push(rewritten);
        let params_vec = interp.vector(params)?;
        interp.heap.sink_push(params_vec);
        let fn_sym = interp.sym("fn");
        interp.list(&[fn_sym, params_vec, rewritten])
    })();
    interp.heap.sink_truncate(depth);
    result
}

fn scan_percents(interp: &Interp, items: &[Value], max_arg: &mut usize, has_rest: &mut bool) {
    let mut work: Vec<Value> = items.to_vec();
    while let Some(v) = work.pop() {
        match v {
            Value::Sym(s) => {
                let name = interp.symbols.name(s);
                if name == "%" {
                    *max_arg = (*max_arg).max(1);
                } else if name == "%&" {
                    *has_rest = true;
                } else if let Some(rest) = name.strip_prefix('%') {
                    if let Ok(n) = rest.parse::<usize>() {
                        *max_arg = (*max_arg).max(n);
                    }
                }
            }
            Value::Cell(_) => {
                if let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(v) {
                    work.push(car);
                    work.push(cdr);
                } else if let Some(items) = coll::vec_items(interp, v) {
                    work.extend(items);
                }
            }
            _ => {}
        }
    }
}

/// Replace bare `%` with `%1` throughout lists and vectors.
fn rewrite_percent(interp: &mut Interp, form: Value) -> Result<Value, Value> {
    match form {
        Value::Sym(s) => {
            if interp.symbols.name(s) == "%" {
                Ok(interp.sym("%1"))
            } else {
                Ok(form)
            }
        }
        Value::Cell(_) => match interp.kind_of(form) {
            Some(CellKind::Pair { .. }) => {
                let items = match coll::list_to_vec(interp, form) {
                    Some(items) => items,
                    None => return Ok(form),
                };
                let depth = interp.heap.sink_depth();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let r = rewrite_percent(interp, item);
                    let r = match r {
                        Ok(v) => v,
                        Err(e) => {
                            interp.heap.sink_truncate(depth);
                            return Err(e);
                        }
                    };
                    interp.heap.sink_push(r);
                    out.push(r);
                }
                let rebuilt = interp.list(&out);
                interp.heap.sink_truncate(depth);
                rebuilt
            }
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
                let items = coll::vec_items(interp, form).unwrap_or_default();
                let depth = interp.heap.sink_depth();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let r = rewrite_percent(interp, item);
                    let r = match r {
                        Ok(v) => v,
                        Err(e) => {
                            interp.heap.sink_truncate(depth);
                            return Err(e);
                        }
                    };
                    interp.heap.sink_push(r);
                    out.push(r);
                }
                let rebuilt = interp.vector(out);
                interp.heap.sink_truncate(depth);
                rebuilt
            }
            _ => Ok(form),
        },
        _ => Ok(form),
    }
}

/// Reader-side quasiquote expansion into `list`/`concat`/`quote`/`vec`
/// calls, so the evaluator's special-form set stays small.
fn expand_quasiquote(interp: &mut Interp, form: Value) -> Result<Value, Value> {
    let unquote = interp.symbols.intern(None, "unquote");
    let splice = interp.symbols.intern(None, "unquote-splicing");
    match form {
        Value::Sym(_) => {
            let quote = interp.sym("quote");
            interp.list(&[quote, form])
        }
        Value::Cell(_) => match interp.kind_of(form) {
            Some(CellKind::Pair { car, .. }) => {
                // (unquote x) -> x
                if car.as_sym() == Some(unquote) {
                    let inner = coll::car(interp, coll::cdr(interp, form).unwrap_or(Value::Nil));
                    return Ok(inner.unwrap_or(Value::Nil));
                }
                let items = match coll::list_to_vec(interp, form) {
                    Some(items) => items,
                    None => {
                        let quote = interp.sym("quote");
                        return interp.list(&[quote, form]);
                    }
                };
                expand_qq_seq(interp, &items, splice, false)
            }
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
                let items = coll::vec_items(interp, form).unwrap_or_default();
                expand_qq_seq(interp, &items, splice, true)
            }
            _ => {
                let quote = interp.sym("quote");
                interp.list(&[quote, form])
            }
        },
        _ => Ok(form),
    }
}

fn expand_qq_seq(
    interp: &mut Interp,
    items: &[Value],
    splice: loam_core::SymId,
    as_vector: bool,
) -> Result<Value, Value> {
    let depth = interp.heap.sink_depth();
    let result = (|| {
        let mut segments: Vec<Value> = Vec::new();
        for item in items {
            let is_splice = matches!(
                interp.kind_of(*item),
                Some(CellKind::Pair { car, .. }) if car.as_sym() == Some(splice)
            );
            let segment = if is_splice {
                coll::car(interp, coll::cdr(interp, *item).unwrap_or(Value::Nil))
                    .unwrap_or(Value::Nil)
            } else {
                let expanded = expand_quasiquote(interp, *item)?;
                interp.heap.sink_push(expanded);
                let list_sym = interp.sym("list");
                let seg = interp.list(&[list_sym, expanded]);
                interp.heap.sink_pop();
                seg?
            };
            interp.heap.sink_push(segment);
            segments.push(segment);
        }
        let concat_sym = interp.sym("concat");
        let mut full = Vec::with_capacity(segments.len() + 1);
        full.push(concat_sym);
        full.extend(segments);
        let concat_form = interp.list(&full)?;
        if as_vector {
            interp.heap.sink_push(concat_form);
            let vec_sym = interp.sym("vec");
            let r = interp.list(&[vec_sym, concat_form]);
            interp.heap.sink_pop();
            r
        } else {
            Ok(concat_form)
        }
    })();
    interp.heap.sink_truncate(depth);
    result
}
