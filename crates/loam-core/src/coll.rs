use std::cmp::Ordering;

use crate::buffer::{push_tail, val_buf};
use crate::cell::{CellKind, SMALL_MAX, SMALL_STR_MAX};
use crate::interp::Interp;
use crate::value::Value;

// ── lists ───────────────────────────────────────────────────────

/// Collect a proper list into a Vec. Returns `None` for non-lists or
/// improper tails.
pub fn list_to_vec(interp: &Interp, mut v: Value) -> Option<Vec<Value>> {
    let mut out = Vec::new();
    loop {
        match v {
            Value::Nil => return Some(out),
            Value::Cell(r) => match interp.heap.cell(r).kind {
                CellKind::Pair { car, cdr, .. } => {
                    out.push(car);
                    v = cdr;
                }
                _ => return None,
            },
            _ => return None,
        }
    }
}

pub fn list_len(interp: &Interp, mut v: Value) -> Option<usize> {
    let mut n = 0;
    loop {
        match v {
            Value::Nil => return Some(n),
            Value::Cell(r) => match interp.heap.cell(r).kind {
                CellKind::Pair { cdr, .. } => {
                    n += 1;
                    v = cdr;
                }
                _ => return None,
            },
            _ => return None,
        }
    }
}

pub fn car(interp: &Interp, v: Value) -> Option<Value> {
    match interp.kind_of(v) {
        Some(CellKind::Pair { car, .. }) => Some(car),
        _ => None,
    }
}

pub fn cdr(interp: &Interp, v: Value) -> Option<Value> {
    match interp.kind_of(v) {
        Some(CellKind::Pair { cdr, .. }) => Some(cdr),
        _ => None,
    }
}

pub fn reverse_list(interp: &mut Interp, mut v: Value) -> Result<Value, Value> {
    let mut acc = Value::Nil;
    let depth = interp.heap.sink_depth();
    interp.heap.sink_push(acc);
    while let Some(CellKind::Pair { car, cdr, .. }) = interp.kind_of(v) {
        let next = match interp.cons(car, acc) {
            Ok(n) => n,
            Err(e) => {
                interp.heap.sink_truncate(depth);
                return Err(e);
            }
        };
        acc = next;
        interp.heap.sink_pop();
        interp.heap.sink_push(acc);
        v = cdr;
    }
    interp.heap.sink_truncate(depth);
    Ok(acc)
}

// ── vectors ─────────────────────────────────────────────────────

pub fn vec_len(interp: &Interp, v: Value) -> Option<usize> {
    match interp.kind_of(v)? {
        CellKind::VecSmall(items) => Some(items.len()),
        CellKind::VecLarge { len, .. } => Some(len),
        _ => None,
    }
}

pub fn vec_nth(interp: &Interp, v: Value, idx: usize) -> Option<Value> {
    match interp.kind_of(v)? {
        CellKind::VecSmall(items) => items.get(idx).copied(),
        CellKind::VecLarge { buf, off, len } => {
            if idx < len {
                Some(buf.borrow()[off + idx])
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn vec_items(interp: &Interp, v: Value) -> Option<Vec<Value>> {
    match interp.kind_of(v)? {
        CellKind::VecSmall(items) => Some(items),
        CellKind::VecLarge { buf, off, len } => Some(buf.borrow()[off..off + len].to_vec()),
        _ => None,
    }
}

/// Append to a vector. Small vectors copy (promoting past the inline
/// threshold); large views extend the shared buffer in place only when they
/// are its tail.
pub fn vec_conj(interp: &mut Interp, v: Value, item: Value) -> Result<Value, Value> {
    match interp.kind_of(v) {
        Some(CellKind::VecSmall(mut items)) => {
            items.push(item);
            if items.len() <= SMALL_MAX {
                interp.alloc(CellKind::VecSmall(items))
            } else {
                let len = items.len();
                interp.alloc(CellKind::VecLarge {
                    buf: val_buf(items),
                    off: 0,
                    len,
                })
            }
        }
        Some(CellKind::VecLarge { buf, off, len }) => {
            let (buf, off, len) = push_tail(&buf, off, len, item);
            interp.alloc(CellKind::VecLarge { buf, off, len })
        }
        _ => {
            let got = interp.type_name(v);
            Err(interp.type_error("vector", got))
        }
    }
}

/// O(1) sub-view: shares the backing buffer, no element copy. Small vectors
/// are promoted to a (shared) large view first, which still copies at most
/// `SMALL_MAX` elements once.
pub fn subvec(interp: &mut Interp, v: Value, from: usize, to: usize) -> Result<Value, Value> {
    let len = match vec_len(interp, v) {
        Some(l) => l,
        None => {
            let got = interp.type_name(v);
            return Err(interp.type_error("vector", got));
        }
    };
    if from > to || to > len {
        let err = interp.illegal_argument(&format!(
            "subvec: range {from}..{to} out of bounds for length {len}"
        ));
        return Err(err);
    }
    match interp.kind_of(v) {
        Some(CellKind::VecSmall(items)) => {
            interp.alloc(CellKind::VecSmall(items[from..to].to_vec()))
        }
        Some(CellKind::VecLarge { buf, off, .. }) => interp.alloc(CellKind::VecLarge {
            buf,
            off: off + from,
            len: to - from,
        }),
        _ => unreachable!("vec_len accepted it"),
    }
}

// ── strings ─────────────────────────────────────────────────────

pub fn str_len(interp: &Interp, v: Value) -> Option<usize> {
    match interp.kind_of(v)? {
        CellKind::StrSmall(s) => Some(s.chars().count()),
        CellKind::StrLarge { len, .. } => Some(len),
        _ => None,
    }
}

/// Codepoint at `idx` — positional string operations are codepoint-indexed,
/// never byte-indexed.
pub fn str_nth(interp: &Interp, v: Value, idx: usize) -> Option<char> {
    match interp.kind_of(v)? {
        CellKind::StrSmall(s) => s.chars().nth(idx),
        CellKind::StrLarge { buf, off, len } => {
            if idx < len {
                Some(buf.borrow()[off + idx])
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Materialize the string contents.
pub fn str_chars(interp: &Interp, v: Value) -> Option<Vec<char>> {
    match interp.kind_of(v)? {
        CellKind::StrSmall(s) => Some(s.chars().collect()),
        CellKind::StrLarge { buf, off, len } => Some(buf.borrow()[off..off + len].to_vec()),
        _ => None,
    }
}

pub fn str_to_string(interp: &Interp, v: Value) -> Option<String> {
    match interp.kind_of(v)? {
        CellKind::StrSmall(s) => Some(s),
        CellKind::StrLarge { buf, off, len } => {
            Some(buf.borrow()[off..off + len].iter().collect())
        }
        _ => None,
    }
}

/// O(1) substring over large strings: a new view of the shared codepoint
/// buffer. Bounds are codepoint indices.
pub fn substring(interp: &mut Interp, v: Value, from: usize, to: usize) -> Result<Value, Value> {
    let len = match str_len(interp, v) {
        Some(l) => l,
        None => {
            let got = interp.type_name(v);
            return Err(interp.type_error("string", got));
        }
    };
    if from > to || to > len {
        let err = interp.illegal_argument(&format!(
            "substring: range {from}..{to} out of bounds for length {len}"
        ));
        return Err(err);
    }
    match interp.kind_of(v) {
        Some(CellKind::StrSmall(s)) => {
            let sub: String = s.chars().skip(from).take(to - from).collect();
            interp.alloc(CellKind::StrSmall(sub))
        }
        Some(CellKind::StrLarge { buf, off, .. }) => interp.alloc(CellKind::StrLarge {
            buf,
            off: off + from,
            len: to - from,
        }),
        _ => unreachable!("str_len accepted it"),
    }
}

/// Append one codepoint (string `conj`), tail-growing when possible.
pub fn str_conj(interp: &mut Interp, v: Value, c: char) -> Result<Value, Value> {
    match interp.kind_of(v) {
        Some(CellKind::StrSmall(mut s)) => {
            s.push(c);
            if s.chars().count() <= SMALL_STR_MAX {
                interp.alloc(CellKind::StrSmall(s))
            } else {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len();
                interp.alloc(CellKind::StrLarge {
                    buf: crate::buffer::char_buf(chars),
                    off: 0,
                    len,
                })
            }
        }
        Some(CellKind::StrLarge { buf, off, len }) => {
            let (buf, off, len) = push_tail(&buf, off, len, c);
            interp.alloc(CellKind::StrLarge { buf, off, len })
        }
        _ => {
            let got = interp.type_name(v);
            Err(interp.type_error("string", got))
        }
    }
}

// ── array maps ──────────────────────────────────────────────────

pub fn map_entries(interp: &Interp, v: Value) -> Option<Vec<(Value, Value)>> {
    match interp.kind_of(v)? {
        CellKind::MapSmall(entries) => Some(entries),
        CellKind::MapLarge { buf, off, len } => Some(buf.borrow()[off..off + len].to_vec()),
        _ => None,
    }
}

pub fn map_len(interp: &Interp, v: Value) -> Option<usize> {
    match interp.kind_of(v)? {
        CellKind::MapSmall(entries) => Some(entries.len()),
        CellKind::MapLarge { len, .. } => Some(len),
        _ => None,
    }
}

/// Linear-scan lookup — deliberately O(n); the array map trades lookup cost
/// for insertion-order iteration.
pub fn map_get(interp: &Interp, m: Value, key: Value) -> Option<Value> {
    let entries = map_entries(interp, m)?;
    entries
        .iter()
        .find(|(k, _)| equal(interp, *k, key))
        .map(|(_, v)| *v)
}

pub fn map_from_entries(interp: &mut Interp, entries: Vec<(Value, Value)>) -> Result<Value, Value> {
    if entries.len() <= SMALL_MAX {
        interp.alloc(CellKind::MapSmall(entries))
    } else {
        let len = entries.len();
        interp.alloc(CellKind::MapLarge {
            buf: crate::buffer::map_buf(entries),
            off: 0,
            len,
        })
    }
}

/// Associate a key. A brand-new key on a tail view extends the shared
/// buffer; replacing an existing key always copies, because overwriting a
/// shared slot would be visible through sibling views.
pub fn map_assoc(interp: &mut Interp, m: Value, key: Value, val: Value) -> Result<Value, Value> {
    match interp.kind_of(m) {
        Some(CellKind::MapSmall(mut entries)) => {
            match entries.iter_mut().find(|(k, _)| equal(interp, *k, key)) {
                Some(entry) => entry.1 = val,
                None => entries.push((key, val)),
            }
            map_from_entries(interp, entries)
        }
        Some(CellKind::MapLarge { buf, off, len }) => {
            let existing = {
                let data = buf.borrow();
                data[off..off + len]
                    .iter()
                    .position(|(k, _)| equal(interp, *k, key))
            };
            match existing {
                Some(i) => {
                    let mut fresh: Vec<(Value, Value)> = buf.borrow()[off..off + len].to_vec();
                    fresh[i].1 = val;
                    let len = fresh.len();
                    interp.alloc(CellKind::MapLarge {
                        buf: crate::buffer::map_buf(fresh),
                        off: 0,
                        len,
                    })
                }
                None => {
                    let (buf, off, len) = push_tail(&buf, off, len, (key, val));
                    interp.alloc(CellKind::MapLarge { buf, off, len })
                }
            }
        }
        _ => {
            let got = interp.type_name(m);
            Err(interp.type_error("map", got))
        }
    }
}

pub fn map_dissoc(interp: &mut Interp, m: Value, key: Value) -> Result<Value, Value> {
    let entries = match map_entries(interp, m) {
        Some(e) => e,
        None => {
            let got = interp.type_name(m);
            return Err(interp.type_error("map", got));
        }
    };
    let filtered: Vec<(Value, Value)> = entries
        .into_iter()
        .filter(|(k, _)| !equal(interp, *k, key))
        .collect();
    map_from_entries(interp, filtered)
}

// ── sorted sets ─────────────────────────────────────────────────

pub fn set_items(interp: &Interp, v: Value) -> Option<Vec<Value>> {
    match interp.kind_of(v)? {
        CellKind::SetSmall(items) => Some(items),
        CellKind::SetLarge { buf, off, len } => Some(buf.borrow()[off..off + len].to_vec()),
        _ => None,
    }
}

pub fn set_len(interp: &Interp, v: Value) -> Option<usize> {
    match interp.kind_of(v)? {
        CellKind::SetSmall(items) => Some(items.len()),
        CellKind::SetLarge { len, .. } => Some(len),
        _ => None,
    }
}

pub fn set_contains(interp: &Interp, s: Value, item: Value) -> bool {
    set_items(interp, s)
        .map(|items| items.iter().any(|v| equal(interp, *v, item)))
        .unwrap_or(false)
}

pub fn set_from_items(interp: &mut Interp, mut items: Vec<Value>) -> Result<Value, Value> {
    items.sort_by(|a, b| compare(interp, *a, *b));
    items.dedup_by(|a, b| equal(interp, *a, *b));
    if items.len() <= SMALL_MAX {
        interp.alloc(CellKind::SetSmall(items))
    } else {
        let len = items.len();
        interp.alloc(CellKind::SetLarge {
            buf: val_buf(items),
            off: 0,
            len,
        })
    }
}

/// Conj into a sorted set: full re-sort on every insert. Fine for the small
/// sets this engine expects; never grows a shared buffer in place because
/// sorting reorders.
pub fn set_conj(interp: &mut Interp, s: Value, item: Value) -> Result<Value, Value> {
    if set_contains(interp, s, item) {
        return Ok(s);
    }
    let mut items = match set_items(interp, s) {
        Some(i) => i,
        None => {
            let got = interp.type_name(s);
            return Err(interp.type_error("set", got));
        }
    };
    items.push(item);
    set_from_items(interp, items)
}

// ── queues ──────────────────────────────────────────────────────

pub fn queue_new(interp: &mut Interp) -> Result<Value, Value> {
    interp.alloc(CellKind::Queue {
        buf: val_buf(Vec::new()),
        off: 0,
        len: 0,
    })
}

pub fn queue_conj(interp: &mut Interp, q: Value, item: Value) -> Result<Value, Value> {
    match interp.kind_of(q) {
        Some(CellKind::Queue { buf, off, len }) => {
            let (buf, off, len) = push_tail(&buf, off, len, item);
            interp.alloc(CellKind::Queue { buf, off, len })
        }
        _ => {
            let got = interp.type_name(q);
            Err(interp.type_error("queue", got))
        }
    }
}

pub fn queue_peek(interp: &Interp, q: Value) -> Option<Value> {
    match interp.kind_of(q)? {
        CellKind::Queue { buf, off, len } => {
            if len > 0 {
                Some(buf.borrow()[off])
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Pop the head: O(1), the new view just starts one element later.
pub fn queue_pop(interp: &mut Interp, q: Value) -> Result<Value, Value> {
    match interp.kind_of(q) {
        Some(CellKind::Queue { buf, off, len }) => {
            if len == 0 {
                return Ok(q);
            }
            interp.alloc(CellKind::Queue {
                buf,
                off: off + 1,
                len: len - 1,
            })
        }
        _ => {
            let got = interp.type_name(q);
            Err(interp.type_error("queue", got))
        }
    }
}

// ── counting ────────────────────────────────────────────────────

pub fn count(interp: &Interp, v: Value) -> Option<usize> {
    match v {
        Value::Nil => Some(0),
        Value::Cell(_) => match interp.kind_of(v)? {
            CellKind::Pair { .. } => list_len(interp, v),
            CellKind::VecSmall(_) | CellKind::VecLarge { .. } => vec_len(interp, v),
            CellKind::StrSmall(_) | CellKind::StrLarge { .. } => str_len(interp, v),
            CellKind::MapSmall(_) | CellKind::MapLarge { .. } => map_len(interp, v),
            CellKind::SetSmall(_) | CellKind::SetLarge { .. } => set_len(interp, v),
            CellKind::Queue { len, .. } => Some(len),
            _ => None,
        },
        _ => None,
    }
}

// ── equality / ordering / hashing ───────────────────────────────

fn ratio_of(interp: &Interp, v: Value) -> Option<(i64, i64)> {
    match interp.kind_of(v)? {
        CellKind::Ratio { num, den } => Some((num, den)),
        _ => None,
    }
}

fn numeric_class(interp: &Interp, v: Value) -> Option<u8> {
    match v {
        Value::Int(_) => Some(0),
        Value::Float(_) => Some(2),
        Value::Cell(_) if ratio_of(interp, v).is_some() => Some(1),
        _ => None,
    }
}

fn as_f64(interp: &Interp, v: Value) -> f64 {
    match v {
        Value::Int(n) => n as f64,
        Value::Float(f) => f,
        _ => match ratio_of(interp, v) {
            Some((n, d)) => n as f64 / d as f64,
            None => f64::NAN,
        },
    }
}

/// Cross-promoting numeric comparison (`compare`/`<`/`equiv` semantics).
pub fn num_compare(interp: &Interp, a: Value, b: Value) -> Option<Ordering> {
    let (ca, cb) = (numeric_class(interp, a)?, numeric_class(interp, b)?);
    if ca <= 1 && cb <= 1 {
        // Exact comparison via cross-multiplication; denominators are
        // positive so the ordering is preserved.
        let (an, ad) = match a {
            Value::Int(n) => (n, 1),
            _ => ratio_of(interp, a)?,
        };
        let (bn, bd) = match b {
            Value::Int(n) => (n, 1),
            _ => ratio_of(interp, b)?,
        };
        let left = (an as i128) * (bd as i128);
        let right = (bn as i128) * (ad as i128);
        Some(left.cmp(&right))
    } else {
        as_f64(interp, a).partial_cmp(&as_f64(interp, b))
    }
}

/// Sequential elements of a list/vector/queue, `None` for anything else.
pub fn seq_items(interp: &Interp, v: Value) -> Option<Vec<Value>> {
    match v {
        Value::Nil => Some(Vec::new()),
        Value::Cell(_) => match interp.kind_of(v)? {
            CellKind::Pair { .. } => list_to_vec(interp, v),
            CellKind::VecSmall(_) | CellKind::VecLarge { .. } => vec_items(interp, v),
            CellKind::Queue { buf, off, len } => Some(buf.borrow()[off..off + len].to_vec()),
            _ => None,
        },
        _ => None,
    }
}

/// Structural, type-exact equality (`=`): `(= 1 1.0)` is false, but
/// sequential collections compare elementwise across list/vector/queue.
pub fn equal(interp: &Interp, a: Value, b: Value) -> bool {
    if a.ident_eq(&b) {
        return true;
    }
    match (a, b) {
        (Value::Cell(ra), Value::Cell(rb)) => {
            let ka = &interp.heap.cell(ra).kind;
            let kb = &interp.heap.cell(rb).kind;
            match (ka, kb) {
                (CellKind::Ratio { num: n1, den: d1 }, CellKind::Ratio { num: n2, den: d2 }) => {
                    n1 == n2 && d1 == d2
                }
                (
                    CellKind::StrSmall(_) | CellKind::StrLarge { .. },
                    CellKind::StrSmall(_) | CellKind::StrLarge { .. },
                ) => str_chars(interp, a) == str_chars(interp, b),
                (
                    CellKind::MapSmall(_) | CellKind::MapLarge { .. },
                    CellKind::MapSmall(_) | CellKind::MapLarge { .. },
                ) => {
                    let (ea, eb) = (
                        map_entries(interp, a).unwrap_or_default(),
                        map_entries(interp, b).unwrap_or_default(),
                    );
                    ea.len() == eb.len()
                        && ea.iter().all(|(k, v)| {
                            map_get(interp, b, *k)
                                .map(|bv| equal(interp, *v, bv))
                                .unwrap_or(false)
                        })
                }
                (
                    CellKind::SetSmall(_) | CellKind::SetLarge { .. },
                    CellKind::SetSmall(_) | CellKind::SetLarge { .. },
                ) => {
                    let (ia, ib) = (
                        set_items(interp, a).unwrap_or_default(),
                        set_items(interp, b).unwrap_or_default(),
                    );
                    ia.len() == ib.len()
                        && ia
                            .iter()
                            .zip(ib.iter())
                            .all(|(x, y)| equal(interp, *x, *y))
                }
                // Pair chains walk iteratively so improper (dotted) tails
                // compare structurally and long lists stay off the native
                // stack.
                (CellKind::Pair { .. }, CellKind::Pair { .. }) => {
                    let (mut x, mut y) = (a, b);
                    loop {
                        match (interp.kind_of(x), interp.kind_of(y)) {
                            (
                                Some(CellKind::Pair { car: xa, cdr: xd, .. }),
                                Some(CellKind::Pair { car: ya, cdr: yd, .. }),
                            ) => {
                                if !equal(interp, xa, ya) {
                                    return false;
                                }
                                x = xd;
                                y = yd;
                            }
                            _ => return equal(interp, x, y),
                        }
                    }
                }
                // Remaining sequential categories compare elementwise.
                _ => match (seq_items(interp, a), seq_items(interp, b)) {
                    (Some(ia), Some(ib)) => {
                        ia.len() == ib.len()
                            && ia
                                .iter()
                                .zip(ib.iter())
                                .all(|(x, y)| equal(interp, *x, *y))
                    }
                    _ => false,
                },
            }
        }
        _ => false,
    }
}

fn type_order(interp: &Interp, v: Value) -> u8 {
    match v {
        Value::Nil => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Char(_) => 3,
        Value::Sym(_) => 5,
        Value::Keyword(_) => 6,
        Value::Proc(_) => 13,
        Value::Eof => 14,
        Value::Cell(_) => match interp.kind_of(v) {
            Some(CellKind::Ratio { .. }) => 2,
            Some(CellKind::StrSmall(_) | CellKind::StrLarge { .. }) => 4,
            Some(CellKind::Pair { .. }) => 7,
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => 8,
            Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => 9,
            Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => 10,
            Some(CellKind::Queue { .. }) => 11,
            _ => 12,
        },
    }
}

/// Total order for sorted sets and `compare`. Numbers cross-promote; other
/// types order by category, then within category.
pub fn compare(interp: &Interp, a: Value, b: Value) -> Ordering {
    if let Some(ord) = num_compare(interp, a, b) {
        return ord;
    }
    let (ta, tb) = (type_order(interp, a), type_order(interp, b));
    if ta != tb {
        return ta.cmp(&tb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(&y),
        (Value::Char(x), Value::Char(y)) => x.cmp(&y),
        (Value::Sym(x), Value::Sym(y)) => interp
            .symbols
            .qualified_name(x)
            .cmp(&interp.symbols.qualified_name(y)),
        (Value::Keyword(x), Value::Keyword(y)) => interp
            .symbols
            .qualified_name(x)
            .cmp(&interp.symbols.qualified_name(y)),
        _ => {
            if let (Some(sa), Some(sb)) = (str_chars(interp, a), str_chars(interp, b)) {
                return sa.cmp(&sb);
            }
            if let (Some(ia), Some(ib)) = (seq_items(interp, a), seq_items(interp, b)) {
                for (x, y) in ia.iter().zip(ib.iter()) {
                    let ord = compare(interp, *x, *y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                return ia.len().cmp(&ib.len());
            }
            // Identity order as the last resort.
            a.scalar_hash().cmp(&b.scalar_hash())
        }
    }
}

/// Structural hash consistent with `equal`: `0.0`/`-0.0` hash 0, strings by
/// content, sequential collections by elements.
pub fn hash_value(interp: &Interp, v: Value) -> u64 {
    fn mix(h: u64, x: u64) -> u64 {
        (h ^ x).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }
    match v {
        Value::Cell(_) => {
            if let Some(chars) = str_chars(interp, v) {
                return chars.iter().fold(7u64, |h, c| mix(h, *c as u64));
            }
            if let Some((n, d)) = ratio_of(interp, v) {
                return mix(n as u64, d as u64);
            }
            if let Some(items) = seq_items(interp, v) {
                return items.iter().fold(11u64, |h, x| mix(h, hash_value(interp, *x)));
            }
            if let Some(entries) = map_entries(interp, v) {
                // Order-insensitive: xor of entry hashes.
                return entries.iter().fold(13u64, |h, (k, x)| {
                    h ^ mix(hash_value(interp, *k), hash_value(interp, *x))
                });
            }
            if let Some(items) = set_items(interp, v) {
                return items.iter().fold(17u64, |h, x| mix(h, hash_value(interp, *x)));
            }
            v.scalar_hash()
        }
        _ => v.scalar_hash(),
    }
}

// ── seq abstraction (non-lazy kinds) ────────────────────────────

/// First element of any seqable value; `Nil` when empty. Lazy sequences are
/// forced by the evaluator before this is consulted.
pub fn seq_first(interp: &mut Interp, v: Value) -> Result<Value, Value> {
    match v {
        Value::Nil => Ok(Value::Nil),
        _ => match interp.kind_of(v) {
            Some(CellKind::Pair { car, .. }) => Ok(car),
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
                Ok(vec_nth(interp, v, 0).unwrap_or(Value::Nil))
            }
            Some(CellKind::StrSmall(_) | CellKind::StrLarge { .. }) => {
                Ok(str_nth(interp, v, 0).map(Value::Char).unwrap_or(Value::Nil))
            }
            Some(CellKind::Queue { .. }) => Ok(queue_peek(interp, v).unwrap_or(Value::Nil)),
            Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
                let entries = map_entries(interp, v).unwrap_or_default();
                match entries.first() {
                    Some((k, val)) => interp.vector(vec![*k, *val]),
                    None => Ok(Value::Nil),
                }
            }
            Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
                let items = set_items(interp, v).unwrap_or_default();
                Ok(items.first().copied().unwrap_or(Value::Nil))
            }
            _ => {
                let got = interp.type_name(v);
                Err(interp.type_error("seqable", got))
            }
        },
    }
}

/// Rest of any seqable value. Vector/string rests are O(1) sub-views.
pub fn seq_rest(interp: &mut Interp, v: Value) -> Result<Value, Value> {
    match v {
        Value::Nil => Ok(Value::Nil),
        _ => match interp.kind_of(v) {
            Some(CellKind::Pair { cdr, .. }) => Ok(cdr),
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
                let len = vec_len(interp, v).unwrap_or(0);
                if len <= 1 {
                    Ok(Value::Nil)
                } else {
                    subvec(interp, v, 1, len)
                }
            }
            Some(CellKind::StrSmall(_) | CellKind::StrLarge { .. }) => {
                let len = str_len(interp, v).unwrap_or(0);
                if len <= 1 {
                    Ok(Value::Nil)
                } else {
                    substring(interp, v, 1, len)
                }
            }
            Some(CellKind::Queue { .. }) => queue_pop(interp, v),
            Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
                let entries = map_entries(interp, v).unwrap_or_default();
                if entries.len() <= 1 {
                    return Ok(Value::Nil);
                }
                let mut out = Value::Nil;
                for (k, val) in entries[1..].iter().rev() {
                    interp.heap.sink_push(out);
                    let entry = interp.vector(vec![*k, *val]);
                    let entry = match entry {
                        Ok(e) => e,
                        Err(err) => {
                            interp.heap.sink_pop();
                            return Err(err);
                        }
                    };
                    interp.heap.sink_push(entry);
                    let next = interp.cons(entry, out);
                    interp.heap.sink_pop();
                    interp.heap.sink_pop();
                    out = next?;
                }
                Ok(out)
            }
            Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
                let items = set_items(interp, v).unwrap_or_default();
                if items.len() <= 1 {
                    Ok(Value::Nil)
                } else {
                    interp.list(&items[1..])
                }
            }
            _ => {
                let got = interp.type_name(v);
                Err(interp.type_error("seqable", got))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn vec_of(interp: &mut Interp, items: &[i64]) -> Value {
        let items: Vec<Value> = items.iter().map(|n| Value::Int(*n)).collect();
        interp.vector(items).unwrap()
    }

    // 1. conj never mutates its input
    #[test]
    fn conj_is_persistent() {
        let mut interp = Interp::new();
        let v = vec_of(&mut interp, &[1, 2, 3]);
        let w = vec_conj(&mut interp, v, Value::Int(4)).unwrap();
        assert_eq!(vec_len(&interp, v), Some(3));
        assert_eq!(vec_len(&interp, w), Some(4));
        assert_eq!(vec_nth(&interp, w, 3).unwrap().as_int(), Some(4));
    }

    // 2. Tail-view conj shares the buffer; a conj on the stale view copies
    #[test]
    fn conj_tail_sharing_and_copy() {
        let mut interp = Interp::new();
        let v = vec_of(&mut interp, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let a = vec_conj(&mut interp, v, Value::Int(10)).unwrap();
        // v's view is no longer the tail, so a second conj on v must copy.
        let b = vec_conj(&mut interp, v, Value::Int(99)).unwrap();
        let (buf_a, buf_b) = match (interp.kind_of(a), interp.kind_of(b)) {
            (
                Some(CellKind::VecLarge { buf: ba, .. }),
                Some(CellKind::VecLarge { buf: bb, .. }),
            ) => (ba, bb),
            _ => panic!("expected large vectors"),
        };
        assert!(!Rc::ptr_eq(&buf_a, &buf_b));
        assert_eq!(vec_nth(&interp, a, 10).unwrap().as_int(), Some(10));
        assert_eq!(vec_nth(&interp, b, 10).unwrap().as_int(), Some(99));
        // The original is still intact.
        assert_eq!(vec_len(&interp, v), Some(10));
    }

    // 3. subvec is a view over the same buffer — no copy
    #[test]
    fn subvec_shares_buffer() {
        let mut interp = Interp::new();
        let v = vec_of(&mut interp, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let sub = subvec(&mut interp, v, 2, 6).unwrap();
        match (interp.kind_of(v), interp.kind_of(sub)) {
            (
                Some(CellKind::VecLarge { buf: b1, .. }),
                Some(CellKind::VecLarge { buf: b2, off, len }),
            ) => {
                assert!(Rc::ptr_eq(&b1, &b2));
                assert_eq!((off, len), (2, 4));
            }
            _ => panic!("expected large vectors"),
        }
        assert_eq!(vec_nth(&interp, sub, 0).unwrap().as_int(), Some(2));
    }

    // 4. substring is codepoint-indexed and O(1) on large strings
    #[test]
    fn substring_codepoints() {
        let mut interp = Interp::new();
        let s = interp
            .string("héllo wörld — long enough to be a large string")
            .unwrap();
        let sub = substring(&mut interp, s, 1, 5).unwrap();
        assert_eq!(str_to_string(&interp, sub), Some("éllo".to_string()));
        match (interp.kind_of(s), interp.kind_of(sub)) {
            (
                Some(CellKind::StrLarge { buf: b1, .. }),
                Some(CellKind::StrLarge { buf: b2, .. }),
            ) => assert!(Rc::ptr_eq(&b1, &b2)),
            _ => panic!("expected large strings"),
        }
    }

    // 5. ArrayMap preserves insertion order and stays linear
    #[test]
    fn map_insertion_order() {
        let mut interp = Interp::new();
        let kb = interp.keyword("b");
        let ka = interp.keyword("a");
        let kc = interp.keyword("c");
        let m = map_from_entries(
            &mut interp,
            vec![(kb, Value::Int(2)), (ka, Value::Int(1))],
        )
        .unwrap();
        let m2 = map_assoc(&mut interp, m, kc, Value::Int(3)).unwrap();
        let order: Vec<Value> = map_entries(&interp, m2)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert!(order[0].ident_eq(&kb));
        assert!(order[1].ident_eq(&ka));
        assert!(order[2].ident_eq(&kc));
        assert_eq!(map_get(&interp, m2, ka).unwrap().as_int(), Some(1));
        // Original unchanged.
        assert_eq!(map_len(&interp, m), Some(2));
    }

    // 6. Sets stay sorted through conj
    #[test]
    fn set_sorted() {
        let mut interp = Interp::new();
        let s = set_from_items(&mut interp, vec![Value::Int(3), Value::Int(1)]).unwrap();
        let s2 = set_conj(&mut interp, s, Value::Int(2)).unwrap();
        let items: Vec<i64> = set_items(&interp, s2)
            .unwrap()
            .into_iter()
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(items, vec![1, 2, 3]);
        // Conj of an existing element returns the set unchanged.
        let s3 = set_conj(&mut interp, s2, Value::Int(2)).unwrap();
        assert!(s3.ident_eq(&s2));
    }

    // 7. Queue pop is an O(1) view advance
    #[test]
    fn queue_fifo() {
        let mut interp = Interp::new();
        let q0 = queue_new(&mut interp).unwrap();
        let q1 = queue_conj(&mut interp, q0, Value::Int(1)).unwrap();
        let q2 = queue_conj(&mut interp, q1, Value::Int(2)).unwrap();
        assert_eq!(queue_peek(&interp, q2).unwrap().as_int(), Some(1));
        let q3 = queue_pop(&mut interp, q2).unwrap();
        assert_eq!(queue_peek(&interp, q3).unwrap().as_int(), Some(2));
        match (interp.kind_of(q2), interp.kind_of(q3)) {
            (Some(CellKind::Queue { buf: b1, .. }), Some(CellKind::Queue { buf: b2, off, .. })) => {
                assert!(Rc::ptr_eq(&b1, &b2));
                assert_eq!(off, 1);
            }
            _ => panic!("expected queues"),
        }
    }

    // 8. Type-exact = : int != float, but lists and vectors cross-equal
    #[test]
    fn equality_semantics() {
        let mut interp = Interp::new();
        assert!(!equal(&interp, Value::Int(1), Value::float(1.0)));
        let l = interp.list(&[Value::Int(1), Value::Int(2)]).unwrap();
        let v = vec_of(&mut interp, &[1, 2]);
        assert!(equal(&interp, l, v));
        let s1 = interp.string("abc").unwrap();
        let s2 = interp.string("abc").unwrap();
        assert!(equal(&interp, s1, s2));
        assert!(!equal(&interp, s1, v));
    }

    // 9. num_compare cross-promotes: 1/2 < 1, 1/2 == 0.5
    #[test]
    fn numeric_comparison() {
        let mut interp = Interp::new();
        let half = interp.alloc(CellKind::Ratio { num: 1, den: 2 }).unwrap();
        assert_eq!(
            num_compare(&interp, half, Value::Int(1)),
            Some(Ordering::Less)
        );
        assert_eq!(
            num_compare(&interp, half, Value::float(0.5)),
            Some(Ordering::Equal)
        );
    }

    // 10. seq over vectors and strings gives O(1) rests
    #[test]
    fn seq_views() {
        let mut interp = Interp::new();
        let v = vec_of(&mut interp, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let r = seq_rest(&mut interp, v).unwrap();
        assert_eq!(vec_len(&interp, r), Some(9));
        assert_eq!(seq_first(&mut interp, r).unwrap().as_int(), Some(2));
        let s = interp.string("héllo").unwrap();
        assert_eq!(
            seq_first(&mut interp, s).unwrap().as_char(),
            Some('h')
        );
        let sr = seq_rest(&mut interp, s).unwrap();
        assert_eq!(str_to_string(&interp, sr), Some("éllo".to_string()));
    }

    // 11. hash agrees with equality for 0.0/-0.0 and for equal strings
    #[test]
    fn hash_consistency() {
        let mut interp = Interp::new();
        assert_eq!(
            hash_value(&interp, Value::float(0.0)),
            hash_value(&interp, Value::float(-0.0))
        );
        let s1 = interp.string("twin").unwrap();
        let s2 = interp.string("twin").unwrap();
        assert_eq!(hash_value(&interp, s1), hash_value(&interp, s2));
    }
}
