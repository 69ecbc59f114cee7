use loam_core::{coll, CellKind, Interp, Value};
use loam_eval::get_generic;

use crate::register_fn;

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    register_fn(interp, "array-map", 0, -1, |interp, args| {
        if args.len() % 2 != 0 {
            return Err(
                interp.illegal_argument("array-map requires an even number of arguments")
            );
        }
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(args.len() / 2);
        for pair in args.chunks(2) {
            match entries
                .iter_mut()
                .find(|(k, _)| coll::equal(interp, *k, pair[0]))
            {
                Some(e) => e.1 = pair[1],
                None => entries.push((pair[0], pair[1])),
            }
        }
        coll::map_from_entries(interp, entries)
    })?;

    register_fn(interp, "sorted-set", 0, -1, |interp, args| {
        coll::set_from_items(interp, args.to_vec())
    })?;

    register_fn(interp, "get", 2, 3, |interp, args| {
        let default = args.get(2).copied().unwrap_or(Value::Nil);
        Ok(get_generic(interp, args[0], args[1]).unwrap_or(default))
    })?;

    register_fn(interp, "assoc", 3, -1, |interp, args| {
        if (args.len() - 1) % 2 != 0 {
            return Err(
                interp.illegal_argument("assoc requires an even number of key/value forms")
            );
        }
        let mut acc = args[0];
        if acc.is_nil() {
            acc = coll::map_from_entries(interp, Vec::new())?;
        }
        let depth = interp.heap.sink_depth();
        for pair in args[1..].chunks(2) {
            interp.heap.sink_push(acc);
            let next = coll::map_assoc(interp, acc, pair[0], pair[1]);
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

    register_fn(interp, "dissoc", 2, -1, |interp, args| {
        let mut acc = args[0];
        let depth = interp.heap.sink_depth();
        for key in &args[1..] {
            interp.heap.sink_push(acc);
            let next = coll::map_dissoc(interp, acc, *key);
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

    register_fn(interp, "keys", 1, 1, |interp, args| {
        let entries = match coll::map_entries(interp, args[0]) {
            Some(e) => e,
            None => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("map", got));
            }
        };
        let keys: Vec<Value> = entries.iter().map(|(k, _)| *k).collect();
        interp.list(&keys)
    })?;

    register_fn(interp, "vals", 1, 1, |interp, args| {
        let entries = match coll::map_entries(interp, args[0]) {
            Some(e) => e,
            None => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("map", got));
            }
        };
        let vals: Vec<Value> = entries.iter().map(|(_, v)| *v).collect();
        interp.list(&vals)
    })?;

    register_fn(interp, "contains?", 2, 2, |interp, args| {
        let found = match interp.kind_of(args[0]) {
            Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
                coll::map_get(interp, args[0], args[1]).is_some()
            }
            Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. }) => {
                coll::set_contains(interp, args[0], args[1])
            }
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => match args[1] {
                Value::Int(i) => {
                    i >= 0 && (i as usize) < coll::vec_len(interp, args[0]).unwrap_or(0)
                }
                _ => false,
            },
            _ => false,
        };
        Ok(Value::Bool(found))
    })?;

    register_fn(interp, "merge", 1, -1, |interp, args| {
        let mut acc = args[0];
        if acc.is_nil() {
            acc = coll::map_from_entries(interp, Vec::new())?;
        }
        let depth = interp.heap.sink_depth();
        for m in &args[1..] {
            let entries = match coll::map_entries(interp, *m) {
                Some(e) => e,
                None if m.is_nil() => continue,
                None => {
                    interp.heap.sink_truncate(depth);
                    let got = interp.type_name(*m);
                    return Err(interp.type_error("map", got));
                }
            };
            for (k, v) in entries {
                interp.heap.sink_push(acc);
                let next = coll::map_assoc(interp, acc, k, v);
                match next {
                    Ok(nv) => acc = nv,
                    Err(e) => {
                        interp.heap.sink_truncate(depth);
                        return Err(e);
                    }
                }
            }
        }
        interp.heap.sink_truncate(depth);
        Ok(acc)
    })?;

    register_fn(interp, "disj", 2, -1, |interp, args| {
        let items = match coll::set_items(interp, args[0]) {
            Some(i) => i,
            None => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("set", got));
            }
        };
        let remaining: Vec<Value> = items
            .into_iter()
            .filter(|item| !args[1..].iter().any(|k| coll::equal(interp, *item, *k)))
            .collect();
        coll::set_from_items(interp, remaining)
    })?;

    Ok(())
}
