use loam_core::{coll, CellKind, Interp, Value};
use loam_eval::force_now;

use crate::register_fn;

fn pred(
    interp: &mut Interp,
    name: &str,
    f: impl Fn(&Interp, Value) -> bool + 'static,
) -> Result<(), Value> {
    register_fn(interp, name, 1, 1, move |interp, args| {
        Ok(Value::Bool(f(interp, args[0])))
    })
}

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    pred(interp, "nil?", |_, v| v.is_nil())?;
    pred(interp, "true?", |_, v| matches!(v, Value::Bool(true)))?;
    pred(interp, "false?", |_, v| matches!(v, Value::Bool(false)))?;
    pred(interp, "boolean?", |_, v| matches!(v, Value::Bool(_)))?;
    pred(interp, "int?", |_, v| matches!(v, Value::Int(_)))?;
    pred(interp, "float?", |_, v| matches!(v, Value::Float(_)))?;
    pred(interp, "ratio?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::Ratio { .. }))
    })?;
    pred(interp, "number?", |i, v| {
        matches!(v, Value::Int(_) | Value::Float(_))
            || matches!(i.kind_of(v), Some(CellKind::Ratio { .. }))
    })?;
    pred(interp, "string?", |i, v| coll::str_len(i, v).is_some())?;
    pred(interp, "symbol?", |_, v| matches!(v, Value::Sym(_)))?;
    pred(interp, "keyword?", |_, v| matches!(v, Value::Keyword(_)))?;
    pred(interp, "char?", |_, v| matches!(v, Value::Char(_)))?;
    pred(interp, "list?", |i, v| {
        v.is_nil() || matches!(i.kind_of(v), Some(CellKind::Pair { .. }))
    })?;
    pred(interp, "vector?", |i, v| {
        matches!(
            i.kind_of(v),
            Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. })
        )
    })?;
    pred(interp, "map?", |i, v| {
        matches!(
            i.kind_of(v),
            Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. })
        )
    })?;
    pred(interp, "set?", |i, v| {
        matches!(
            i.kind_of(v),
            Some(CellKind::SetSmall(_) | CellKind::SetLarge { .. })
        )
    })?;
    pred(interp, "queue?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::Queue { .. }))
    })?;
    pred(interp, "fn?", |i, v| {
        matches!(v, Value::Proc(_))
            || matches!(
                i.kind_of(v),
                Some(CellKind::Closure(_) | CellKind::Foreign { .. })
            )
    })?;
    pred(interp, "var?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::VarSlot { .. }))
    })?;
    pred(interp, "delay?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::Delay { .. }))
    })?;
    pred(interp, "lazy-seq?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::LazySeq { .. }))
    })?;
    pred(interp, "realized?", |i, v| {
        match i.kind_of(v) {
            Some(CellKind::LazySeq { realized, .. } | CellKind::Delay { realized, .. }) => {
                realized
            }
            _ => true,
        }
    })?;
    pred(interp, "port?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::Port(_)))
    })?;
    pred(interp, "regex?", |i, v| {
        matches!(i.kind_of(v), Some(CellKind::Regex(_)))
    })?;
    pred(interp, "zero?", |_, v| match v {
        Value::Int(n) => n == 0,
        Value::Float(f) => f == 0.0,
        _ => false,
    })?;
    pred(interp, "pos?", |i, v| {
        coll::num_compare(i, v, Value::Int(0)) == Some(std::cmp::Ordering::Greater)
    })?;
    pred(interp, "neg?", |i, v| {
        coll::num_compare(i, v, Value::Int(0)) == Some(std::cmp::Ordering::Less)
    })?;
    pred(interp, "even?", |_, v| matches!(v, Value::Int(n) if n % 2 == 0))?;
    pred(interp, "odd?", |_, v| matches!(v, Value::Int(n) if n % 2 != 0))?;
    pred(interp, "eof?", |_, v| matches!(v, Value::Eof))?;

    register_fn(interp, "empty?", 1, 1, |interp, args| {
        let v = force_now(interp, args[0])?;
        if v.is_nil() {
            return Ok(Value::Bool(true));
        }
        match coll::count(interp, v) {
            Some(n) => Ok(Value::Bool(n == 0)),
            None => {
                let got = interp.type_name(v);
                Err(interp.type_error("collection", got))
            }
        }
    })?;

    register_fn(interp, "every?", 2, 2, |interp, args| {
        let f = args[0];
        crate::with_seq(interp, args[1], |interp, items| {
            for item in items {
                let r = loam_eval::call_function(interp, f, &[*item])?;
                if !r.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        })
    })?;

    register_fn(interp, "some", 2, 2, |interp, args| {
        let f = args[0];
        crate::with_seq(interp, args[1], |interp, items| {
            for item in items {
                let r = loam_eval::call_function(interp, f, &[*item])?;
                if r.is_truthy() {
                    return Ok(r);
                }
            }
            Ok(Value::Nil)
        })
    })?;

    Ok(())
}
