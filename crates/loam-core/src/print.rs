use crate::cell::CellKind;
use crate::coll;
use crate::interp::Interp;
use crate::value::Value;

/// Readable (reader round-trippable) rendering, Clojure's `pr-str`.
pub fn pr_str(interp: &Interp, v: Value) -> String {
    let mut out = String::new();
    write_value(interp, &mut out, v, true);
    out
}

/// Human rendering, Clojure's `str`/`print`: strings unquoted, chars bare.
pub fn display_str(interp: &Interp, v: Value) -> String {
    let mut out = String::new();
    write_value(interp, &mut out, v, false);
    out
}

fn write_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("##NaN");
    } else if f == f64::INFINITY {
        out.push_str("##Inf");
    } else if f == f64::NEG_INFINITY {
        out.push_str("##-Inf");
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        out.push_str(&format!("{f:.1}"));
    } else {
        out.push_str(&format!("{f}"));
    }
}

fn write_char(out: &mut String, c: char, readable: bool) {
    if !readable {
        out.push(c);
        return;
    }
    match c {
        ' ' => out.push_str("\\space"),
        '\n' => out.push_str("\\newline"),
        '\t' => out.push_str("\\tab"),
        '\r' => out.push_str("\\return"),
        '\0' => out.push_str("\\nul"),
        _ => {
            out.push('\\');
            out.push(c);
        }
    }
}

fn write_string(out: &mut String, s: &str, readable: bool) {
    if !readable {
        out.push_str(s);
        return;
    }
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn write_seq(interp: &Interp, out: &mut String, items: &[Value], readable: bool) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_value(interp, out, *item, readable);
    }
}

pub fn write_value(interp: &Interp, out: &mut String, v: Value, readable: bool) {
    match v {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => write_float(out, f),
        Value::Char(c) => write_char(out, c, readable),
        Value::Sym(s) => out.push_str(&interp.symbols.qualified_name(s)),
        Value::Keyword(s) => {
            out.push(':');
            out.push_str(&interp.symbols.qualified_name(s));
        }
        Value::Proc(op) => out.push_str(&format!("#<proc {op:?}>")),
        Value::Eof => out.push_str("#<eof>"),
        Value::Cell(r) => match &interp.heap.cell(r).kind {
            CellKind::Free => out.push_str("#<free>"),
            CellKind::Pair { .. } => {
                out.push('(');
                let mut cur = v;
                let mut first = true;
                loop {
                    match interp.kind_of(cur) {
                        Some(CellKind::Pair { car, cdr, .. }) => {
                            if !first {
                                out.push(' ');
                            }
                            first = false;
                            write_value(interp, out, car, readable);
                            cur = cdr;
                        }
                        _ => {
                            if !cur.is_nil() {
                                out.push_str(" . ");
                                write_value(interp, out, cur, readable);
                            }
                            break;
                        }
                    }
                }
                out.push(')');
            }
            CellKind::VecSmall(_) | CellKind::VecLarge { .. } => {
                out.push('[');
                let items = coll::vec_items(interp, v).unwrap_or_default();
                write_seq(interp, out, &items, readable);
                out.push(']');
            }
            CellKind::StrSmall(_) | CellKind::StrLarge { .. } => {
                let s = coll::str_to_string(interp, v).unwrap_or_default();
                write_string(out, &s, readable);
            }
            CellKind::MapSmall(_) | CellKind::MapLarge { .. } => {
                out.push('{');
                let entries = coll::map_entries(interp, v).unwrap_or_default();
                for (i, (k, val)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_value(interp, out, *k, readable);
                    out.push(' ');
                    write_value(interp, out, *val, readable);
                }
                out.push('}');
            }
            CellKind::SetSmall(_) | CellKind::SetLarge { .. } => {
                out.push_str("#{");
                let items = coll::set_items(interp, v).unwrap_or_default();
                write_seq(interp, out, &items, readable);
                out.push('}');
            }
            CellKind::Queue { .. } => {
                out.push_str("#queue [");
                let items = coll::seq_items(interp, v).unwrap_or_default();
                write_seq(interp, out, &items, readable);
                out.push(']');
            }
            CellKind::Ratio { num, den } => out.push_str(&format!("{num}/{den}")),
            CellKind::Closure(def) => match def.name {
                Some(n) => {
                    out.push_str("#<fn ");
                    out.push_str(&interp.symbols.qualified_name(n));
                    out.push('>');
                }
                None => out.push_str("#<fn>"),
            },
            CellKind::Foreign { name, .. } => {
                out.push_str("#<foreign-fn ");
                out.push_str(name);
                out.push('>');
            }
            CellKind::Frame { .. } => out.push_str("#<frame>"),
            CellKind::VarSlot { value, .. } => {
                out.push_str("#<var ");
                write_value(interp, out, *value, readable);
                out.push('>');
            }
            CellKind::LazySeq { realized, .. } => {
                if *realized {
                    out.push_str("#<lazy-seq (realized)>")
                } else {
                    out.push_str("#<lazy-seq>")
                }
            }
            CellKind::Delay { realized, .. } => {
                if *realized {
                    out.push_str("#<delay (realized)>")
                } else {
                    out.push_str("#<delay>")
                }
            }
            CellKind::Port(_) => out.push_str("#<port>"),
            CellKind::Regex(re) => {
                out.push_str("#\"");
                out.push_str(re.as_str());
                out.push('"');
            }
            CellKind::Exception {
                class, message, ..
            } => {
                out.push_str("#<");
                out.push_str(&interp.symbols.qualified_name(*class));
                out.push_str(": ");
                write_value(interp, out, *message, false);
                out.push('>');
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1. Scalars print in reader syntax
    #[test]
    fn scalars() {
        let mut interp = Interp::new();
        assert_eq!(pr_str(&interp, Value::Nil), "nil");
        assert_eq!(pr_str(&interp, Value::Bool(true)), "true");
        assert_eq!(pr_str(&interp, Value::Int(-3)), "-3");
        assert_eq!(pr_str(&interp, Value::float(2.0)), "2.0");
        assert_eq!(pr_str(&interp, Value::float(f64::INFINITY)), "##Inf");
        assert_eq!(pr_str(&interp, Value::float(f64::NAN)), "##NaN");
        assert_eq!(pr_str(&interp, Value::Char(' ')), "\\space");
        let kw = interp.keyword("a");
        assert_eq!(pr_str(&interp, kw), ":a");
    }

    // 2. Strings: readable quotes and escapes, display raw
    #[test]
    fn strings() {
        let mut interp = Interp::new();
        let s = interp.string("a\"b\n").unwrap();
        assert_eq!(pr_str(&interp, s), "\"a\\\"b\\n\"");
        assert_eq!(display_str(&interp, s), "a\"b\n");
    }

    // 3. Nested collections round-trip shape
    #[test]
    fn nested() {
        let mut interp = Interp::new();
        let inner = interp.vector(vec![Value::Int(3), Value::Int(4)]).unwrap();
        let outer = interp
            .vector(vec![Value::Int(1), Value::Int(2), inner])
            .unwrap();
        assert_eq!(pr_str(&interp, outer), "[1 2 [3 4]]");
        let l = interp.list(&[Value::Int(1), outer]).unwrap();
        assert_eq!(pr_str(&interp, l), "(1 [1 2 [3 4]])");
    }

    // 4. Dotted pairs print with the dot
    #[test]
    fn dotted_pair() {
        let mut interp = Interp::new();
        let p = interp.cons(Value::Int(1), Value::Int(2)).unwrap();
        assert_eq!(pr_str(&interp, p), "(1 . 2)");
    }

    // 5. Ratios print as n/d
    #[test]
    fn ratios() {
        let mut interp = Interp::new();
        let r = interp
            .alloc(crate::cell::CellKind::Ratio { num: 3, den: 2 })
            .unwrap();
        assert_eq!(pr_str(&interp, r), "3/2");
    }
}
