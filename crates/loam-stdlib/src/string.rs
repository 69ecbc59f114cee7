use loam_core::{coll, print, Interp, Value};

use crate::{register_fn, want_int, want_string};

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    // Human-readable concatenation: nil prints as nothing.
    register_fn(interp, "str", 0, -1, |interp, args| {
        let mut out = String::new();
        for arg in args {
            if !arg.is_nil() {
                out.push_str(&print::display_str(interp, *arg));
            }
        }
        interp.string(&out)
    })?;

    register_fn(interp, "pr-str", 0, -1, |interp, args| {
        let rendered: Vec<String> = args.iter().map(|a| print::pr_str(interp, *a)).collect();
        interp.string(&rendered.join(" "))
    })?;

    // Codepoint-indexed substring; O(1) views over large strings.
    register_fn(interp, "subs", 2, 3, |interp, args| {
        let from = want_int(interp, args[1])?;
        if from < 0 {
            return Err(interp.illegal_argument("subs: negative start"));
        }
        let to = match args.get(2) {
            Some(v) => {
                let t = want_int(interp, *v)?;
                if t < 0 {
                    return Err(interp.illegal_argument("subs: negative end"));
                }
                t as usize
            }
            None => match coll::str_len(interp, args[0]) {
                Some(l) => l,
                None => {
                    let got = interp.type_name(args[0]);
                    return Err(interp.type_error("string", got));
                }
            },
        };
        coll::substring(interp, args[0], from as usize, to)
    })?;

    register_fn(interp, "name", 1, 1, |interp, args| {
        match args[0] {
            Value::Sym(s) | Value::Keyword(s) => {
                let name = interp.symbols.name(s).to_string();
                interp.string(&name)
            }
            _ => {
                if coll::str_to_string(interp, args[0]).is_some() {
                    Ok(args[0])
                } else {
                    let got = interp.type_name(args[0]);
                    Err(interp.type_error("symbol, keyword, or string", got))
                }
            }
        }
    })?;

    register_fn(interp, "namespace", 1, 1, |interp, args| {
        match args[0] {
            Value::Sym(s) | Value::Keyword(s) => match interp.symbols.namespace(s) {
                Some(ns) => {
                    let ns = ns.to_string();
                    interp.string(&ns)
                }
                None => Ok(Value::Nil),
            },
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("symbol or keyword", got))
            }
        }
    })?;

    register_fn(interp, "symbol", 1, 1, |interp, args| {
        let text = want_string(interp, args[0])?;
        Ok(interp.sym(&text))
    })?;

    register_fn(interp, "keyword", 1, 1, |interp, args| {
        match args[0] {
            Value::Keyword(_) => Ok(args[0]),
            Value::Sym(s) => {
                let name = interp.symbols.qualified_name(s);
                Ok(interp.keyword(&name))
            }
            _ => {
                let text = want_string(interp, args[0])?;
                Ok(interp.keyword(&text))
            }
        }
    })?;

    register_fn(interp, "char", 1, 1, |interp, args| {
        match args[0] {
            Value::Char(_) => Ok(args[0]),
            Value::Int(n) => match u32::try_from(n).ok().and_then(char::from_u32) {
                Some(c) => Ok(Value::Char(c)),
                None => Err(interp.illegal_argument(&format!(
                    "char: {n} is not a valid codepoint"
                ))),
            },
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("char or int", got))
            }
        }
    })?;

    register_fn(interp, "int", 1, 1, |interp, args| {
        match args[0] {
            Value::Int(_) => Ok(args[0]),
            Value::Char(c) => Ok(Value::Int(c as i64)),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            _ => {
                let got = interp.type_name(args[0]);
                Err(interp.type_error("number or char", got))
            }
        }
    })?;

    register_fn(interp, "string-upper", 1, 1, |interp, args| {
        let s = want_string(interp, args[0])?;
        interp.string(&s.to_uppercase())
    })?;

    register_fn(interp, "string-lower", 1, 1, |interp, args| {
        let s = want_string(interp, args[0])?;
        interp.string(&s.to_lowercase())
    })?;

    register_fn(interp, "string-trim", 1, 1, |interp, args| {
        let s = want_string(interp, args[0])?;
        interp.string(s.trim())
    })?;

    register_fn(interp, "string-split", 2, 2, |interp, args| {
        let s = want_string(interp, args[0])?;
        let sep = want_string(interp, args[1])?;
        let depth = interp.heap.sink_depth();
        let result = (|| {
            let mut parts = Vec::new();
            for part in s.split(&sep) {
                let p = interp.string(part)?;
                interp.heap.sink_push(p);
                parts.push(p);
            }
            interp.list(&parts)
        })();
        interp.heap.sink_truncate(depth);
        result
    })?;

    register_fn(interp, "string-join", 1, 2, |interp, args| {
        let (sep, coll_v) = if args.len() == 2 {
            (want_string(interp, args[0])?, args[1])
        } else {
            (String::new(), args[0])
        };
        crate::with_seq(interp, coll_v, |interp, items| {
            let rendered: Vec<String> = items
                .iter()
                .map(|v| print::display_str(interp, *v))
                .collect();
            interp.string(&rendered.join(&sep))
        })
    })?;

    Ok(())
}
