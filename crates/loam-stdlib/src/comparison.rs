use std::cmp::Ordering;

use loam_core::{coll, Interp, Value};

use crate::register_fn;

fn ordered(
    interp: &mut Interp,
    args: &[Value],
    pred: impl Fn(Ordering) -> bool,
) -> Result<Value, Value> {
    for pair in args.windows(2) {
        match coll::num_compare(interp, pair[0], pair[1]) {
            Some(ord) if pred(ord) => {}
            Some(_) => return Ok(Value::Bool(false)),
            None => {
                let got = interp.type_name(pair[0]);
                return Err(interp.type_error("number", got));
            }
        }
    }
    Ok(Value::Bool(true))
}

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    // Type-exact structural equality.
    register_fn(interp, "=", 1, -1, |interp, args| {
        let all = args
            .windows(2)
            .all(|p| coll::equal(interp, p[0], p[1]));
        Ok(Value::Bool(all))
    })?;

    register_fn(interp, "not=", 1, -1, |interp, args| {
        let all = args
            .windows(2)
            .all(|p| coll::equal(interp, p[0], p[1]));
        Ok(Value::Bool(!all))
    })?;

    // Cross-promoting approximate equality: (== 1 1.0) is true.
    register_fn(interp, "==", 1, -1, |interp, args| {
        ordered(interp, args, |o| o == Ordering::Equal)
    })?;

    register_fn(interp, "<", 1, -1, |interp, args| {
        ordered(interp, args, |o| o == Ordering::Less)
    })?;

    register_fn(interp, "<=", 1, -1, |interp, args| {
        ordered(interp, args, |o| o != Ordering::Greater)
    })?;

    register_fn(interp, ">", 1, -1, |interp, args| {
        ordered(interp, args, |o| o == Ordering::Greater)
    })?;

    register_fn(interp, ">=", 1, -1, |interp, args| {
        ordered(interp, args, |o| o != Ordering::Less)
    })?;

    // Total order over all values; numbers cross-promote.
    register_fn(interp, "compare", 2, 2, |interp, args| {
        let ord = coll::compare(interp, args[0], args[1]);
        Ok(Value::Int(match ord {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }))
    })?;

    // Reference identity.
    register_fn(interp, "identical?", 2, 2, |_interp, args| {
        Ok(Value::Bool(args[0].ident_eq(&args[1])))
    })?;

    register_fn(interp, "not", 1, 1, |_interp, args| {
        Ok(Value::Bool(!args[0].is_truthy()))
    })?;

    Ok(())
}
