use loam_core::{coll, CellKind, Interp, Value};
use loam_eval::force_now;

use crate::{collect_seq, register_fn, want_int, with_seq};

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    register_fn(interp, "list", 0, -1, |interp, args| interp.list(args))?;

    register_fn(interp, "cons", 2, 2, |interp, args| {
        let tail = force_now(interp, args[1])?;
        // cons onto a non-list seqable conses onto its realized seq.
        if tail.is_nil() || matches!(interp.kind_of(tail), Some(CellKind::Pair { .. })) {
            interp.cons(args[0], tail)
        } else {
            with_seq(interp, tail, |interp, items| {
                let rest = interp.list(items)?;
                interp.heap.sink_push(rest);
                let r = interp.cons(args[0], rest);
                interp.heap.sink_pop();
                r
            })
        }
    })?;

    register_fn(interp, "first", 1, 1, |interp, args| {
        let v = force_now(interp, args[0])?;
        coll::seq_first(interp, v)
    })?;

    register_fn(interp, "rest", 1, 1, |interp, args| {
        let v = force_now(interp, args[0])?;
        coll::seq_rest(interp, v)
    })?;

    register_fn(interp, "next", 1, 1, |interp, args| {
        let v = force_now(interp, args[0])?;
        let rest = coll::seq_rest(interp, v)?;
        let rest = force_now(interp, rest)?;
        match coll::count(interp, rest) {
            Some(0) => Ok(Value::Nil),
            _ => Ok(rest),
        }
    })?;

    register_fn(interp, "count", 1, 1, |interp, args| {
        let v = force_now(interp, args[0])?;
        match coll::count(interp, v) {
            Some(n) => Ok(Value::Int(n as i64)),
            None => with_seq(interp, v, |_, items| Ok(Value::Int(items.len() as i64))),
        }
    })?;

    register_fn(interp, "nth", 2, 3, |interp, args| {
        let v = force_now(interp, args[0])?;
        let idx = want_int(interp, args[1])?;
        if idx < 0 {
            return Err(interp.illegal_argument("nth: negative index"));
        }
        let idx = idx as usize;
        if let Some(item) = coll::vec_nth(interp, v, idx) {
            return Ok(item);
        }
        if let Some(c) = coll::str_nth(interp, v, idx) {
            return Ok(Value::Char(c));
        }
        with_seq(interp, v, |interp, items| match items.get(idx) {
            Some(item) => Ok(*item),
            None => match args.get(2) {
                Some(default) => Ok(*default),
                None => Err(interp.illegal_argument(&format!(
                    "nth: index {idx} out of bounds"
                ))),
            },
        })
    })?;

    register_fn(interp, "conj", 1, -1, |interp, args| {
        let mut acc = args[0];
        let depth = interp.heap.sink_depth();
        for item in &args[1..] {
            interp.heap.sink_push(acc);
            let next = conj_one(interp, acc, *item);
            match next {
                Ok(v) => acc = v,
                Err(e) => {
                    interp.heap.sink_truncate(depth);
                    return Err(e);
                }
            }
        }
        interp.heap.sink_truncate(depth);
        Ok(acc)
    })?;

    register_fn(interp, "concat", 0, -1, |interp, args| {
        let depth = interp.heap.sink_depth();
        let mut all: Vec<Value> = Vec::new();
        for arg in args {
            match collect_seq(interp, *arg) {
                Ok(items) => all.extend(items),
                Err(e) => {
                    interp.heap.sink_truncate(depth);
                    return Err(e);
                }
            }
        }
        let result = interp.list(&all);
        interp.heap.sink_truncate(depth);
        result
    })?;

    register_fn(interp, "reverse", 1, 1, |interp, args| {
        with_seq(interp, args[0], |interp, items| {
            let mut rev: Vec<Value> = items.to_vec();
            rev.reverse();
            interp.list(&rev)
        })
    })?;

    register_fn(interp, "seq", 1, 1, |interp, args| {
        let v = force_now(interp, args[0])?;
        if v.is_nil() {
            return Ok(Value::Nil);
        }
        match coll::count(interp, v) {
            Some(0) => Ok(Value::Nil),
            _ => {
                if matches!(interp.kind_of(v), Some(CellKind::Pair { .. })) {
                    Ok(v)
                } else {
                    with_seq(interp, v, |interp, items| {
                        if items.is_empty() {
                            Ok(Value::Nil)
                        } else {
                            interp.list(items)
                        }
                    })
                }
            }
        }
    })?;

    register_fn(interp, "vec", 1, 1, |interp, args| {
        with_seq(interp, args[0], |interp, items| interp.vector(items.to_vec()))
    })?;

    register_fn(interp, "vector", 0, -1, |interp, args| {
        interp.vector(args.to_vec())
    })?;

    register_fn(interp, "subvec", 2, 3, |interp, args| {
        let from = want_int(interp, args[1])? as usize;
        let to = match args.get(2) {
            Some(v) => want_int(interp, *v)? as usize,
            None => coll::vec_len(interp, args[0]).unwrap_or(0),
        };
        coll::subvec(interp, args[0], from, to)
    })?;

    register_fn(interp, "last", 1, 1, |interp, args| {
        with_seq(interp, args[0], |_, items| {
            Ok(items.last().copied().unwrap_or(Value::Nil))
        })
    })?;

    register_fn(interp, "take", 2, 2, |interp, args| {
        let n = want_int(interp, args[0])?.max(0) as usize;
        with_seq(interp, args[1], |interp, items| {
            interp.list(&items[..n.min(items.len())])
        })
    })?;

    register_fn(interp, "drop", 2, 2, |interp, args| {
        let n = want_int(interp, args[0])?.max(0) as usize;
        with_seq(interp, args[1], |interp, items| {
            interp.list(&items[n.min(items.len())..])
        })
    })?;

    register_fn(interp, "range", 1, 3, |interp, args| {
        let (start, end, step) = match args.len() {
            1 => (0, want_int(interp, args[0])?, 1),
            2 => (want_int(interp, args[0])?, want_int(interp, args[1])?, 1),
            _ => (
                want_int(interp, args[0])?,
                want_int(interp, args[1])?,
                want_int(interp, args[2])?,
            ),
        };
        if step == 0 {
            return Err(interp.illegal_argument("range: step must not be zero"));
        }
        let mut items = Vec::new();
        let mut i = start;
        while (step > 0 && i < end) || (step < 0 && i > end) {
            items.push(Value::Int(i));
            i += step;
        }
        interp.list(&items)
    })?;

    register_fn(interp, "repeat", 2, 2, |interp, args| {
        let n = want_int(interp, args[0])?.max(0) as usize;
        interp.list(&vec![args[1]; n])
    })?;

    register_fn(interp, "map", 2, -1, |interp, args| {
        let f = args[0];
        let depth = interp.heap.sink_depth();
        let result = (|| {
            let mut columns: Vec<Vec<Value>> = Vec::with_capacity(args.len() - 1);
            for coll_arg in &args[1..] {
                columns.push(collect_seq(interp, *coll_arg)?);
            }
            let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(shortest);
            for i in 0..shortest {
                let row: Vec<Value> = columns.iter().map(|c| c[i]).collect();
                let r = loam_eval::call_function(interp, f, &row)?;
                interp.heap.sink_push(r);
                out.push(r);
            }
            interp.list(&out)
        })();
        interp.heap.sink_truncate(depth);
        result
    })?;

    register_fn(interp, "filter", 2, 2, |interp, args| {
        let f = args[0];
        let depth = interp.heap.sink_depth();
        let result = (|| {
            let items = collect_seq(interp, args[1])?;
            let mut out = Vec::new();
            for item in items {
                let keep = loam_eval::call_function(interp, f, &[item])?;
                if keep.is_truthy() {
                    out.push(item);
                }
            }
            interp.list(&out)
        })();
        interp.heap.sink_truncate(depth);
        result
    })?;

    register_fn(interp, "reduce", 2, 3, |interp, args| {
        let f = args[0];
        let depth = interp.heap.sink_depth();
        let result = (|| {
            let (mut acc, items) = if args.len() == 3 {
                (args[1], collect_seq(interp, args[2])?)
            } else {
                let items = collect_seq(interp, args[1])?;
                match items.split_first() {
                    Some((first, rest)) => (*first, rest.to_vec()),
                    None => return loam_eval::call_function(interp, f, &[]),
                }
            };
            for item in items {
                interp.heap.sink_push(acc);
                let next = loam_eval::call_function(interp, f, &[acc, item]);
                interp.heap.sink_pop();
                acc = next?;
            }
            Ok(acc)
        })();
        interp.heap.sink_truncate(depth);
        result
    })?;

    register_fn(interp, "doall", 1, 1, |interp, args| {
        with_seq(interp, args[0], |interp, items| interp.list(items))
    })?;

    register_fn(interp, "queue", 0, -1, |interp, args| {
        let q = coll::queue_new(interp)?;
        let mut acc = q;
        let depth = interp.heap.sink_depth();
        for item in args {
            interp.heap.sink_push(acc);
            let next = coll::queue_conj(interp, acc, *item);
            match next {
                Ok(v) => acc = v,
                Err(e) => {
                    interp.heap.sink_truncate(depth);
                    return Err(e);
                }
            }
        }
        interp.heap.sink_truncate(depth);
        Ok(acc)
    })?;

    register_fn(interp, "peek", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Queue { .. }) => {
                Ok(coll::queue_peek(interp, args[0]).unwrap_or(Value::Nil))
            }
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
                let len = coll::vec_len(interp, args[0]).unwrap_or(0);
                if len == 0 {
                    Ok(Value::Nil)
                } else {
                    Ok(coll::vec_nth(interp, args[0], len - 1).unwrap_or(Value::Nil))
                }
            }
            _ => coll::seq_first(interp, args[0]),
        }
    })?;

    register_fn(interp, "pop", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Queue { .. }) => coll::queue_pop(interp, args[0]),
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
                let len = coll::vec_len(interp, args[0]).unwrap_or(0);
                if len == 0 {
                    Err(interp.illegal_state("pop on empty vector"))
                } else {
                    coll::subvec(interp, args[0], 0, len - 1)
                }
            }
            _ => coll::seq_rest(interp, args[0]),
        }
    })?;

    Ok(())
}

/// One step of `conj`, dispatching on the collection kind.
fn conj_one(interp: &mut Interp, target: Value, item: Value) -> Result<Value, Value> {
    if target.is_nil() {
        return interp.list(&[item]);
    }
    match interp.kind_of(target) {
        Some(CellKind::Pair { .. }) => interp.cons(item, target),
        Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
            coll::vec_conj(interp, target, item)
        }
        Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
            coll::set_conj(interp, target, item)
        }
        Some(CellKind::Queue { .. }) => coll::queue_conj(interp, target, item),
        Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
            // conj expects a [k v] entry.
            let entry = coll::vec_items(interp, item);
            match entry {
                Some(items) if items.len() == 2 => {
                    coll::map_assoc(interp, target, items[0], items[1])
                }
                _ => Err(interp.illegal_argument("conj on a map expects a [k v] entry")),
            }
        }
        _ => {
            let got = interp.type_name(target);
            Err(interp.type_error("collection", got))
        }
    }
}
