use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use loam_core::port::PortState;
use loam_core::{print, CellKind, Interp, Value};

use crate::{register_fn, want_string};

fn stdout_write(interp: &mut Interp, s: &str) -> Result<(), Value> {
    let mut out = std::io::stdout();
    out.write_all(s.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| interp.runtime_error(&format!("io error: {e}")))
}

pub fn register(interp: &mut Interp) -> Result<(), Value> {
    register_fn(interp, "print", 0, -1, |interp, args| {
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&print::display_str(interp, *arg));
        }
        stdout_write(interp, &out)?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "println", 0, -1, |interp, args| {
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&print::display_str(interp, *arg));
        }
        out.push('\n');
        stdout_write(interp, &out)?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "pr", 0, -1, |interp, args| {
        let rendered: Vec<String> = args.iter().map(|a| print::pr_str(interp, *a)).collect();
        stdout_write(interp, &rendered.join(" "))?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "prn", 0, -1, |interp, args| {
        let rendered: Vec<String> = args.iter().map(|a| print::pr_str(interp, *a)).collect();
        let mut out = rendered.join(" ");
        out.push('\n');
        stdout_write(interp, &out)?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "newline", 0, 0, |interp, _args| {
        stdout_write(interp, "\n")?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "slurp", 1, 1, |interp, args| {
        let path = want_string(interp, args[0])?;
        match std::fs::read_to_string(Path::new(&path)) {
            Ok(text) => interp.string(&text),
            Err(e) => Err(interp.runtime_error(&format!("slurp: {path}: {e}"))),
        }
    })?;

    register_fn(interp, "spit", 2, 2, |interp, args| {
        let path = want_string(interp, args[0])?;
        let text = print::display_str(interp, args[1]);
        match std::fs::write(Path::new(&path), text) {
            Ok(()) => Ok(Value::Nil),
            Err(e) => Err(interp.runtime_error(&format!("spit: {path}: {e}"))),
        }
    })?;

    // (read-string "(+ 1 2)") — one form, via the reader opcodes.
    register_fn(interp, "read-string", 1, 1, |interp, args| {
        let src = want_string(interp, args[0])?;
        loam_eval::read_str(interp, &src)
    })?;

    // (load-string "...") — read and evaluate every form, like the
    // embedder's eval-string entry point.
    register_fn(interp, "load-string", 1, 1, |interp, args| {
        let src = want_string(interp, args[0])?;
        let port = loam_eval::string_port(interp, "<load-string>", &src)?;
        let depth = interp.heap.sink_depth();
        interp.heap.sink_push(port);
        let mut last = Value::Nil;
        interp.heap.sink_push(last);
        let result = loop {
            let expr = match loam_eval::read_port(interp, port) {
                Ok(e) => e,
                Err(e) => break Err(e),
            };
            if matches!(expr, Value::Eof) {
                break Ok(last);
            }
            last = match loam_eval::eval_expr(interp, expr) {
                Ok(v) => v,
                Err(e) => break Err(e),
            };
            interp.heap.sink_pop();
            interp.heap.sink_push(last);
        };
        interp.heap.sink_truncate(depth);
        result
    })?;

    // Ports as first-class values.
    register_fn(interp, "string-reader", 1, 1, |interp, args| {
        let text = want_string(interp, args[0])?;
        let state = PortState::string_input("<string-reader>", &text);
        interp.alloc(CellKind::Port(Rc::new(RefCell::new(state))))
    })?;

    register_fn(interp, "string-writer", 0, 0, |interp, _args| {
        let state = PortState::string_output("<string-writer>");
        interp.alloc(CellKind::Port(Rc::new(RefCell::new(state))))
    })?;

    register_fn(interp, "reader", 1, 1, |interp, args| {
        let path = want_string(interp, args[0])?;
        match PortState::file_input(Path::new(&path)) {
            Ok(state) => interp.alloc(CellKind::Port(Rc::new(RefCell::new(state)))),
            Err(e) => Err(interp.runtime_error(&format!("reader: {path}: {e}"))),
        }
    })?;

    register_fn(interp, "writer", 1, 1, |interp, args| {
        let path = want_string(interp, args[0])?;
        match PortState::file_output(Path::new(&path)) {
            Ok(state) => interp.alloc(CellKind::Port(Rc::new(RefCell::new(state)))),
            Err(e) => Err(interp.runtime_error(&format!("writer: {path}: {e}"))),
        }
    })?;

    register_fn(interp, "write", 2, 2, |interp, args| {
        let port = match interp.kind_of(args[0]) {
            Some(CellKind::Port(p)) => p,
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("port", got));
            }
        };
        let text = print::display_str(interp, args[1]);
        port.borrow_mut()
            .write_str(&text)
            .map_err(|e| interp.runtime_error(&e))?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "read-char", 1, 1, |interp, args| {
        let port = match interp.kind_of(args[0]) {
            Some(CellKind::Port(p)) => p,
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("port", got));
            }
        };
        let c = port.borrow_mut().read_codepoint();
        match c {
            Ok(Some(c)) => Ok(Value::Char(c)),
            Ok(None) => Ok(Value::Eof),
            Err(e) => Err(interp.runtime_error(&e)),
        }
    })?;

    register_fn(interp, "unread-char", 2, 2, |interp, args| {
        let port = match interp.kind_of(args[0]) {
            Some(CellKind::Port(p)) => p,
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("port", got));
            }
        };
        let c = match args[1] {
            Value::Char(c) => c,
            _ => {
                let got = interp.type_name(args[1]);
                return Err(interp.type_error("char", got));
            }
        };
        port.borrow_mut().unread_codepoint(c);
        Ok(Value::Nil)
    })?;

    register_fn(interp, "flush", 1, 1, |interp, args| {
        let port = match interp.kind_of(args[0]) {
            Some(CellKind::Port(p)) => p,
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("port", got));
            }
        };
        let r = port.borrow_mut().flush();
        r.map_err(|e| interp.runtime_error(&e))?;
        Ok(Value::Nil)
    })?;

    register_fn(interp, "close", 1, 1, |interp, args| {
        let port = match interp.kind_of(args[0]) {
            Some(CellKind::Port(p)) => p,
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("port", got));
            }
        };
        let r = port.borrow_mut().close();
        r.map_err(|e| interp.runtime_error(&e))?;
        Ok(Value::Nil)
    })?;

    // Captured output of a string-writer port.
    register_fn(interp, "writer-output", 1, 1, |interp, args| {
        let port = match interp.kind_of(args[0]) {
            Some(CellKind::Port(p)) => p,
            _ => {
                let got = interp.type_name(args[0]);
                return Err(interp.type_error("port", got));
            }
        };
        let captured = port.borrow().captured().map(str::to_string);
        match captured {
            Some(text) => interp.string(&text),
            None => Err(interp.illegal_argument("writer-output expects a string writer")),
        }
    })?;

    Ok(())
}
