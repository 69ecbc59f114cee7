use loam_core::symbol::next_class_id;
use loam_core::{coll, env, gc, CellKind, Interp, Value};
use loam_eval::force_now;

use crate::{register_fn, want_string};

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    register_fn(interp, "identity", 1, 1, |_interp, args| Ok(args[0]))?;

    register_fn(interp, "gensym", 0, 1, |interp, args| {
        let prefix = match args.first() {
            Some(v) => want_string(interp, *v)?,
            None => "G".to_string(),
        };
        Ok(interp.gensym(&prefix))
    })?;

    register_fn(interp, "type", 1, 1, |interp, args| {
        let name = interp.type_name(args[0]).to_string();
        Ok(interp.keyword(&name))
    })?;

    // Single-inheritance class test over the closed exception hierarchy
    // plus any classes registered with defexception.
    register_fn(interp, "isa?", 2, 2, |interp, args| {
        let (child, parent) = match (args[0].as_sym(), args[1].as_sym()) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("class symbol", got));
            }
        };
        Ok(Value::Bool(interp.symbols.isa(child, parent)))
    })?;

    // (defexception Name Parent?) — extend the hierarchy with a new class.
    register_fn(interp, "defexception", 1, 2, |interp, args| {
        let class = match args[0].as_sym() {
            Some(s) => s,
            None => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("symbol", got));
            }
        };
        let parent = match args.get(1) {
            Some(v) => match v.as_sym() {
                Some(s) if interp.symbols.is_class(s) => s,
                _ => {
                    return Err(
                        interp.illegal_argument("defexception: parent must be a known class")
                    )
                }
            },
            None => interp.classes.throwable,
        };
        let _id = next_class_id();
        interp.symbols.register_class(class, Some(parent));
        Ok(args[0])
    })?;

    register_fn(interp, "throw", 1, 1, |interp, args| {
        let v = args[0];
        if matches!(interp.kind_of(v), Some(CellKind::Exception { .. })) {
            Err(v)
        } else {
            // Arbitrary values are wrapped as runtime exceptions carrying
            // the thrown value as data.
            let rendered = loam_core::print::pr_str(interp, v);
            let msg = interp.string(&format!("thrown value: {rendered}"))?;
            interp.heap.sink_push(msg);
            let class = interp.classes.runtime;
            let exc = interp.alloc(CellKind::Exception {
                class,
                message: msg,
                data: v,
            });
            interp.heap.sink_pop();
            Err(exc?)
        }
    })?;

    register_fn(interp, "ex-info", 2, 2, |interp, args| {
        let message = if coll::str_to_string(interp, args[0]).is_some() {
            args[0]
        } else {
            let got = interp.type_name(args[0]);
            return Err(interp.type_error("string", got));
        };
        let class = interp.classes.runtime;
        interp.alloc(CellKind::Exception {
            class,
            message,
            data: args[1],
        })
    })?;

    register_fn(interp, "ex-message", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Exception { message, .. }) => Ok(message),
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("exception", got))
            }
        }
    })?;

    register_fn(interp, "ex-data", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Exception { data, .. }) => Ok(data),
            _ => Ok(Value::Nil),
        }
    })?;

    register_fn(interp, "ex-class", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Exception { class, .. }) => Ok(Value::Sym(class)),
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("exception", got))
            }
        }
    })?;

    // deref: vars read their slot, delays/lazy-seqs force.
    register_fn(interp, "deref", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::VarSlot { value, .. }) => Ok(value),
            Some(CellKind::Delay { .. } | CellKind::LazySeq { .. }) => {
                force_now(interp, args[0])
            }
            _ => Ok(args[0]),
        }
    })?;

    register_fn(interp, "var-get", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::VarSlot { value, .. }) => Ok(value),
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("var", got))
            }
        }
    })?;

    register_fn(interp, "var-set", 2, 2, |interp, args| {
        env::set_slot(interp, args[0], args[1])?;
        Ok(args[1])
    })?;

    // (add-watch var key fn) — fn is invoked with (old new) on every set!.
    register_fn(interp, "add-watch", 3, 3, |interp, args| {
        env::add_watch(interp, args[0], args[1], args[2])?;
        Ok(args[0])
    })?;

    register_fn(interp, "with-meta", 2, 2, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Pair { car, cdr, .. }) => interp.alloc(CellKind::Pair {
                car,
                cdr,
                meta: args[1],
            }),
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("list", got))
            }
        }
    })?;

    register_fn(interp, "meta", 1, 1, |interp, args| {
        match interp.kind_of(args[0]) {
            Some(CellKind::Pair { meta, .. }) => Ok(meta),
            _ => Ok(Value::Nil),
        }
    })?;

    // Tagged literals surface as data: {:tag sym :form value}.
    register_fn(interp, "tagged-literal", 2, 2, |interp, args| {
        let tag_key = interp.keyword("tag");
        let form_key = interp.keyword("form");
        coll::map_from_entries(interp, vec![(tag_key, args[0]), (form_key, args[1])])
    })?;

    // (gc) — run a collection, returning the number of cells reclaimed.
    register_fn(interp, "gc", 0, 0, |interp, _args| {
        let freed = gc::collect(interp, &[]);
        Ok(Value::Int(freed as i64))
    })?;

    register_fn(interp, "heap-stats", 0, 0, |interp, _args| {
        let stats = interp.heap.stats;
        let capacity = interp.heap.capacity();
        let free = interp.heap.free_count();
        let entries = vec![
            (interp.keyword("collections"), Value::Int(stats.collections as i64)),
            (interp.keyword("live"), Value::Int(stats.live_cells as i64)),
            (interp.keyword("free"), Value::Int(free as i64)),
            (interp.keyword("capacity"), Value::Int(capacity as i64)),
            (
                interp.keyword("total-freed"),
                Value::Int(stats.total_freed as i64),
            ),
        ];
        coll::map_from_entries(interp, entries)
    })?;

    Ok(())
}
