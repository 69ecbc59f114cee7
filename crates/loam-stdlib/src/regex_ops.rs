use std::rc::Rc;

use loam_core::{CellKind, Interp, Value};

use crate::{register_fn, want_string};

fn want_regex(interp: &mut Interp, v: Value) -> Result<Rc<regex::Regex>, Value> {
    match interp.kind_of(v) {
        Some(CellKind::Regex(re)) => Ok(re),
        _ => {
            let got = interp.type_name(v);
            Err(interp.type_error("regex", got))
        }
    }
}

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    register_fn(interp, "re-pattern", 1, 1, |interp, args| {
        let pat = want_string(interp, args[0])?;
        match regex::Regex::new(&pat) {
            Ok(re) => interp.alloc(CellKind::Regex(Rc::new(re))),
            Err(e) => Err(interp.illegal_argument(&format!("re-pattern: {e}"))),
        }
    })?;

    // Whole-string match: the matched text, or a vector with groups.
    register_fn(interp, "re-matches", 2, 2, |interp, args| {
        let re = want_regex(interp, args[0])?;
        let text = want_string(interp, args[1])?;
        match re.captures(&text) {
            Some(caps) if caps.get(0).map(|m| m.as_str()) == Some(text.as_str()) => {
                captures_value(interp, &caps)
            }
            _ => Ok(Value::Nil),
        }
    })?;

    // First match anywhere in the string.
    register_fn(interp, "re-find", 2, 2, |interp, args| {
        let re = want_regex(interp, args[0])?;
        let text = want_string(interp, args[1])?;
        match re.captures(&text) {
            Some(caps) => captures_value(interp, &caps),
            None => Ok(Value::Nil),
        }
    })?;

    // All matches, as a list.
    register_fn(interp, "re-seq", 2, 2, |interp, args| {
        let re = want_regex(interp, args[0])?;
        let text = want_string(interp, args[1])?;
        let matches: Vec<String> = re
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect();
        let depth = interp.heap.sink_depth();
        let result = (|| {
            let mut out = Vec::with_capacity(matches.len());
            for m in &matches {
                let s = interp.string(m)?;
                interp.heap.sink_push(s);
                out.push(s);
            }
            interp.list(&out)
        })();
        interp.heap.sink_truncate(depth);
        result
    })?;

    Ok(())
}

/// Clojure-shaped capture result: the whole match when there are no groups,
/// otherwise `[whole group1 group2 ...]` with nil for unmatched groups.
fn captures_value(interp: &mut Interp, caps: &regex::Captures<'_>) -> Result<Value, Value> {
    if caps.len() == 1 {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        return interp.string(whole);
    }
    let texts: Vec<Option<String>> = (0..caps.len())
        .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
        .collect();
    let depth = interp.heap.sink_depth();
    let result = (|| {
        let mut out = Vec::with_capacity(texts.len());
        for t in &texts {
            let v = match t {
                Some(s) => {
                    let s = interp.string(s)?;
                    interp.heap.sink_push(s);
                    s
                }
                None => Value::Nil,
            };
            out.push(v);
        }
        interp.vector(out)
    })();
    interp.heap.sink_truncate(depth);
    result
}
