use loam_core::{coll, env, CellKind, Interp, Value};

/// Sequential elements a pattern can bind against: lists, vectors, strings
/// (as chars), queues; lazy sequences are realized first.
fn bindable_items(interp: &mut Interp, value: Value) -> Result<Option<Vec<Value>>, Value> {
    let value = crate::force_now(interp, value)?;
    if value.is_nil() {
        return Ok(Some(Vec::new()));
    }
    if let Some(items) = coll::seq_items(interp, value) {
        return Ok(Some(items));
    }
    if let Some(chars) = coll::str_chars(interp, value) {
        return Ok(Some(chars.into_iter().map(Value::Char).collect()));
    }
    Ok(None)
}

/// Bind one pattern against a value in `frame`. Patterns are symbols
/// (`_` discards), vectors (`[a b & rest :as all]`, nested), or maps
/// (`{:keys [a b]}`, `{x :k}`, `:as`). Nested sequential destructuring is
/// lenient: missing positions bind nil.
pub fn bind(interp: &mut Interp, frame: Value, pattern: Value, value: Value) -> Result<(), Value> {
    if let Some(sym) = pattern.as_sym() {
        if interp.symbols.name(sym) != "_" {
            env::define(interp, frame, sym, value)?;
        }
        return Ok(());
    }
    match interp.kind_of(pattern) {
        Some(CellKind::VecSmall(_) | CellKind::VecLarge { .. }) => {
            bind_seq(interp, frame, pattern, value)
        }
        Some(CellKind::MapSmall(_) | CellKind::MapLarge { .. }) => {
            bind_map(interp, frame, pattern, value)
        }
        _ => {
            let got = interp.type_name(pattern);
            Err(interp.illegal_argument(&format!(
                "invalid binding pattern: expected symbol, vector, or map, got {got}"
            )))
        }
    }
}

fn bind_seq(
    interp: &mut Interp,
    frame: Value,
    pattern: Value,
    value: Value,
) -> Result<(), Value> {
    let pats = coll::vec_items(interp, pattern).unwrap_or_default();
    let items = match bindable_items(interp, value)? {
        Some(items) => items,
        None => {
            let got = interp.type_name(value);
            return Err(interp.illegal_argument(&format!(
                "cannot destructure {got} with a sequential pattern"
            )));
        }
    };
    let mut i = 0;
    let mut pos = 0;
    while i < pats.len() {
        let p = pats[i];
        if let Some(sym) = p.as_sym() {
            match interp.symbols.name(sym) {
                "&" => {
                    let rest_pat = match pats.get(i + 1) {
                        Some(p) => *p,
                        None => {
                            return Err(interp.illegal_argument(
                                "destructure: `&` must be followed by a rest pattern",
                            ));
                        }
                    };
                    let rest = interp.list(&items[pos.min(items.len())..])?;
                    bind(interp, frame, rest_pat, rest)?;
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        if let Some(kw) = p.as_keyword() {
            if interp.symbols.name(kw) == "as" {
                let as_pat = match pats.get(i + 1) {
                    Some(p) => *p,
                    None => {
                        return Err(interp
                            .illegal_argument("destructure: `:as` must be followed by a name"));
                    }
                };
                bind(interp, frame, as_pat, value)?;
                i += 2;
                continue;
            }
        }
        let item = items.get(pos).copied().unwrap_or(Value::Nil);
        bind(interp, frame, p, item)?;
        pos += 1;
        i += 1;
    }
    Ok(())
}

fn bind_map(
    interp: &mut Interp,
    frame: Value,
    pattern: Value,
    value: Value,
) -> Result<(), Value> {
    let value = crate::force_now(interp, value)?;
    let entries = coll::map_entries(interp, pattern).unwrap_or_default();
    for (k, v) in entries {
        if let Some(kw) = k.as_keyword() {
            match interp.symbols.name(kw) {
                "keys" => {
                    // {:keys [a b]} — bind each name to the keyword entry.
                    let names = coll::vec_items(interp, v).unwrap_or_default();
                    for name in names {
                        let sym = match name.as_sym() {
                            Some(s) => s,
                            None => {
                                return Err(interp
                                    .illegal_argument(":keys expects a vector of symbols"));
                            }
                        };
                        let name_str = interp.symbols.name(sym).to_string();
                        let key = interp.keyword(&name_str);
                        let bound = coll::map_get(interp, value, key).unwrap_or(Value::Nil);
                        env::define(interp, frame, sym, bound)?;
                    }
                    continue;
                }
                "as" => {
                    bind(interp, frame, v, value)?;
                    continue;
                }
                _ => {}
            }
        }
        // {pattern key} — bind pattern to (get value key).
        let bound = coll::map_get(interp, value, v).unwrap_or(Value::Nil);
        bind(interp, frame, k, bound)?;
    }
    Ok(())
}

/// List parameter forms: proper elements plus an optional dotted tail.
pub fn list_parts(interp: &Interp, mut v: Value) -> (Vec<Value>, Option<Value>) {
    let mut items = Vec::new();
    loop {
        match interp.kind_of(v) {
            Some(CellKind::Pair { car, cdr, .. }) => {
                items.push(car);
                v = cdr;
            }
            _ => {
                return if v.is_nil() {
                    (items, None)
                } else {
                    (items, Some(v))
                };
            }
        }
    }
}

/// Does a parameter form accept `n` arguments?
/// Vector params: exact count, or `>= fixed` with `&`. List params: exact,
/// or `>= fixed` when dotted. A bare symbol takes anything.
pub fn clause_matches(interp: &Interp, params: Value, n: usize) -> bool {
    if params.as_sym().is_some() {
        return true;
    }
    if let Some(pats) = coll::vec_items(interp, params) {
        let mut fixed = 0;
        let mut i = 0;
        while i < pats.len() {
            if let Some(sym) = pats[i].as_sym() {
                if interp.symbols.name(sym) == "&" {
                    return n >= fixed;
                }
            }
            if let Some(kw) = pats[i].as_keyword() {
                if interp.symbols.name(kw) == "as" {
                    i += 2;
                    continue;
                }
            }
            fixed += 1;
            i += 1;
        }
        return n == fixed;
    }
    let (fixed, tail) = list_parts(interp, params);
    match tail {
        Some(_) => n >= fixed.len(),
        None => n == fixed.len(),
    }
}

/// Bind a whole parameter form against a call's arguments. The clause has
/// already been shape-checked with [`clause_matches`].
pub fn bind_params(
    interp: &mut Interp,
    frame: Value,
    params: Value,
    args: &[Value],
) -> Result<(), Value> {
    if let Some(sym) = params.as_sym() {
        let whole = interp.list(args)?;
        if interp.symbols.name(sym) != "_" {
            env::define(interp, frame, sym, whole)?;
        }
        return Ok(());
    }
    if coll::vec_items(interp, params).is_some() {
        let whole = interp.list(args)?;
        interp.heap.sink_push(whole);
        let result = bind_seq(interp, frame, params, whole);
        interp.heap.sink_pop();
        return result;
    }
    // Dotted-pair style: (a b . rest)
    let (fixed, tail) = list_parts(interp, params);
    for (i, pat) in fixed.iter().enumerate() {
        let v = args.get(i).copied().unwrap_or(Value::Nil);
        bind(interp, frame, *pat, v)?;
    }
    if let Some(tail_pat) = tail {
        let rest = interp.list(&args[fixed.len().min(args.len())..])?;
        bind(interp, frame, tail_pat, rest)?;
    }
    Ok(())
}

/// Positional re-entry targets for `recur`: the binding patterns of a
/// parameter form, in order, with `&`/`:as` markers stripped (the rest
/// pattern receives its recur argument directly).
pub fn recur_binders(interp: &Interp, params: Value) -> Vec<Value> {
    if params.as_sym().is_some() {
        return vec![params];
    }
    if let Some(pats) = coll::vec_items(interp, params) {
        let mut out = Vec::new();
        let mut i = 0;
        while i < pats.len() {
            if let Some(sym) = pats[i].as_sym() {
                if interp.symbols.name(sym) == "&" {
                    i += 1;
                    continue;
                }
            }
            if let Some(kw) = pats[i].as_keyword() {
                if interp.symbols.name(kw) == "as" {
                    i += 2;
                    continue;
                }
            }
            out.push(pats[i]);
            i += 1;
        }
        return out;
    }
    let (mut fixed, tail) = list_parts(interp, params);
    if let Some(t) = tail {
        fixed.push(t);
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::env::new_frame;

    fn lookup(interp: &mut Interp, frame: Value, name: &str) -> Value {
        let sym = interp.symbols.intern(None, name);
        env::resolve(interp, frame, sym).unwrap()
    }

    // 1. Vector pattern with & rest and :as
    #[test]
    fn vector_pattern() {
        let mut interp = Interp::new();
        let env = interp.user_env;
        let frame = new_frame(&mut interp, env).unwrap();
        let a = interp.sym("a");
        let amp = interp.sym("&");
        let rest = interp.sym("rest");
        let as_kw = interp.keyword("as");
        let all = interp.sym("all");
        let pattern = interp.vector(vec![a, amp, rest, as_kw, all]).unwrap();
        let value = interp
            .list(&[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
        bind(&mut interp, frame, pattern, value).unwrap();
        assert_eq!(lookup(&mut interp, frame, "a").as_int(), Some(1));
        let r = lookup(&mut interp, frame, "rest");
        assert_eq!(coll::list_len(&interp, r), Some(2));
        let whole = lookup(&mut interp, frame, "all");
        assert!(whole.ident_eq(&value));
    }

    // 2. Nested patterns are lenient about missing positions
    #[test]
    fn nested_lenient() {
        let mut interp = Interp::new();
        let env = interp.user_env;
        let frame = new_frame(&mut interp, env).unwrap();
        let x = interp.sym("x");
        let y = interp.sym("y");
        let inner = interp.vector(vec![x, y]).unwrap();
        let pattern = interp.vector(vec![inner]).unwrap();
        let one = interp.vector(vec![Value::Int(1)]).unwrap();
        let value = interp.vector(vec![one]).unwrap();
        bind(&mut interp, frame, pattern, value).unwrap();
        assert_eq!(lookup(&mut interp, frame, "x").as_int(), Some(1));
        assert!(lookup(&mut interp, frame, "y").is_nil());
    }

    // 3. Map destructuring: {:keys [...]} and {sym :key}
    #[test]
    fn map_pattern() {
        let mut interp = Interp::new();
        let env = interp.user_env;
        let frame = new_frame(&mut interp, env).unwrap();
        let ka = interp.keyword("a");
        let kb = interp.keyword("b");
        let value =
            coll::map_from_entries(&mut interp, vec![(ka, Value::Int(1)), (kb, Value::Int(2))])
                .unwrap();
        let keys_kw = interp.keyword("keys");
        let a_sym = interp.sym("a");
        let names = interp.vector(vec![a_sym]).unwrap();
        let other = interp.sym("other");
        let pattern =
            coll::map_from_entries(&mut interp, vec![(keys_kw, names), (other, kb)]).unwrap();
        bind(&mut interp, frame, pattern, value).unwrap();
        assert_eq!(lookup(&mut interp, frame, "a").as_int(), Some(1));
        assert_eq!(lookup(&mut interp, frame, "other").as_int(), Some(2));
    }

    // 4. clause_matches across the three parameter conventions
    #[test]
    fn clause_matching() {
        let mut interp = Interp::new();
        let x = interp.sym("x");
        let y = interp.sym("y");
        let amp = interp.sym("&");
        let r = interp.sym("r");
        let fixed2 = interp.vector(vec![x, y]).unwrap();
        assert!(clause_matches(&interp, fixed2, 2));
        assert!(!clause_matches(&interp, fixed2, 3));
        let variadic = interp.vector(vec![x, amp, r]).unwrap();
        assert!(clause_matches(&interp, variadic, 1));
        assert!(clause_matches(&interp, variadic, 5));
        assert!(!clause_matches(&interp, variadic, 0));
        // Dotted list (x . r)
        let dotted = interp.cons(x, r).unwrap();
        assert!(clause_matches(&interp, dotted, 1));
        assert!(clause_matches(&interp, dotted, 4));
        // Bare symbol takes anything.
        assert!(clause_matches(&interp, x, 0));
        assert!(clause_matches(&interp, x, 9));
    }

    // 5. Dotted params bind the tail as a list
    #[test]
    fn dotted_binding() {
        let mut interp = Interp::new();
        let env = interp.user_env;
        let frame = new_frame(&mut interp, env).unwrap();
        let x = interp.sym("x");
        let r = interp.sym("r");
        let params = interp.cons(x, r).unwrap();
        bind_params(
            &mut interp,
            frame,
            params,
            &[Value::Int(1), Value::Int(2), Value::Int(3)],
        )
        .unwrap();
        assert_eq!(lookup(&mut interp, frame, "x").as_int(), Some(1));
        let rest = lookup(&mut interp, frame, "r");
        assert_eq!(coll::list_len(&interp, rest), Some(2));
    }

    // 6. recur binders strip & and :as
    #[test]
    fn recur_binder_extraction() {
        let mut interp = Interp::new();
        let x = interp.sym("x");
        let amp = interp.sym("&");
        let r = interp.sym("r");
        let as_kw = interp.keyword("as");
        let all = interp.sym("all");
        let params = interp.vector(vec![x, amp, r, as_kw, all]).unwrap();
        let binders = recur_binders(&interp, params);
        assert_eq!(binders.len(), 2);
        assert!(binders[0].ident_eq(&x));
        assert!(binders[1].ident_eq(&r));
    }
}
