use loam_core::{Interp, Value};
use loam_eval::numeric::{self, Num};

use crate::register_fn;

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    register_fn(interp, "+", 0, -1, |interp, args| {
        let mut acc = Value::Int(0);
        for arg in args {
            let a = numeric::num_of(interp, acc)?;
            let b = numeric::num_of(interp, *arg)?;
            acc = numeric::add(interp, a, b)?;
        }
        Ok(acc)
    })?;

    register_fn(interp, "-", 1, -1, |interp, args| {
        let first = numeric::num_of(interp, args[0])?;
        if args.len() == 1 {
            return numeric::negate(interp, first);
        }
        let mut acc = args[0];
        for arg in &args[1..] {
            let a = numeric::num_of(interp, acc)?;
            let b = numeric::num_of(interp, *arg)?;
            acc = numeric::sub(interp, a, b)?;
        }
        Ok(acc)
    })?;

    register_fn(interp, "*", 0, -1, |interp, args| {
        let mut acc = Value::Int(1);
        for arg in args {
            let a = numeric::num_of(interp, acc)?;
            let b = numeric::num_of(interp, *arg)?;
            acc = numeric::mul(interp, a, b)?;
        }
        Ok(acc)
    })?;

    register_fn(interp, "/", 1, -1, |interp, args| {
        if args.len() == 1 {
            let one = Num::Int(1);
            let b = numeric::num_of(interp, args[0])?;
            return numeric::div(interp, one, b);
        }
        let mut acc = args[0];
        for arg in &args[1..] {
            let a = numeric::num_of(interp, acc)?;
            let b = numeric::num_of(interp, *arg)?;
            acc = numeric::div(interp, a, b)?;
        }
        Ok(acc)
    })?;

    register_fn(interp, "quot", 2, 2, |interp, args| {
        let a = numeric::num_of(interp, args[0])?;
        let b = numeric::num_of(interp, args[1])?;
        numeric::quot(interp, a, b)
    })?;

    register_fn(interp, "rem", 2, 2, |interp, args| {
        let a = numeric::num_of(interp, args[0])?;
        let b = numeric::num_of(interp, args[1])?;
        numeric::rem(interp, a, b)
    })?;

    register_fn(interp, "mod", 2, 2, |interp, args| {
        let a = numeric::num_of(interp, args[0])?;
        let b = numeric::num_of(interp, args[1])?;
        numeric::modulo(interp, a, b)
    })?;

    register_fn(interp, "inc", 1, 1, |interp, args| {
        let a = numeric::num_of(interp, args[0])?;
        numeric::add(interp, a, Num::Int(1))
    })?;

    register_fn(interp, "dec", 1, 1, |interp, args| {
        let a = numeric::num_of(interp, args[0])?;
        numeric::sub(interp, a, Num::Int(1))
    })?;

    register_fn(interp, "abs", 1, 1, |interp, args| {
        match numeric::num_of(interp, args[0])? {
            Num::Int(n) if n < 0 => numeric::negate(interp, Num::Int(n)),
            Num::Ratio(n, d) if n < 0 => numeric::negate(interp, Num::Ratio(n, d)),
            Num::Real(f) => Ok(Value::float(f.abs())),
            _ => Ok(args[0]),
        }
    })?;

    register_fn(interp, "min", 1, -1, |interp, args| {
        let mut best = args[0];
        numeric::num_of(interp, best)?;
        for arg in &args[1..] {
            numeric::num_of(interp, *arg)?;
            if loam_core::coll::num_compare(interp, *arg, best)
                == Some(std::cmp::Ordering::Less)
            {
                best = *arg;
            }
        }
        Ok(best)
    })?;

    register_fn(interp, "max", 1, -1, |interp, args| {
        let mut best = args[0];
        numeric::num_of(interp, best)?;
        for arg in &args[1..] {
            numeric::num_of(interp, *arg)?;
            if loam_core::coll::num_compare(interp, *arg, best)
                == Some(std::cmp::Ordering::Greater)
            {
                best = *arg;
            }
        }
        Ok(best)
    })?;

    register_fn(interp, "numerator", 1, 1, |interp, args| {
        match numeric::num_of(interp, args[0])? {
            Num::Int(n) => Ok(Value::Int(n)),
            Num::Ratio(n, _) => Ok(Value::Int(n)),
            Num::Real(_) => {
                Err(interp.illegal_argument("numerator expects an exact number"))
            }
        }
    })?;

    register_fn(interp, "denominator", 1, 1, |interp, args| {
        match numeric::num_of(interp, args[0])? {
            Num::Int(_) => Ok(Value::Int(1)),
            Num::Ratio(_, d) => Ok(Value::Int(d)),
            Num::Real(_) => {
                Err(interp.illegal_argument("denominator expects an exact number"))
            }
        }
    })?;

    Ok(())
}
