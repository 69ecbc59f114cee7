pub mod destructure;
pub mod eval;
pub mod lexer;
pub mod numeric;
pub mod read;

use loam_core::port::PortState;
use loam_core::{CellKind, Interp, LoamError, Op, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub use eval::{get_generic, run};

struct SavedRegs {
    op: Op,
    args: Value,
    envir: Value,
    code: Value,
    value: Value,
}

fn save_regs(interp: &Interp) -> SavedRegs {
    SavedRegs {
        op: interp.machine.op,
        args: interp.machine.args,
        envir: interp.machine.envir,
        code: interp.machine.code,
        value: interp.machine.value,
    }
}

fn restore_regs(interp: &mut Interp, saved: SavedRegs) {
    interp.machine.op = saved.op;
    interp.machine.args = saved.args;
    interp.machine.envir = saved.envir;
    interp.machine.code = saved.code;
    interp.machine.value = saved.value;
}

/// Install the evaluator callback used by the core (watch invocation) and
/// by anything else that needs to call back in.
pub fn install_hooks(interp: &mut Interp) {
    interp.apply_hook = Some(call_function);
}

/// Apply `f` to `args` by running the machine to completion at the current
/// dump depth. The caller's registers are saved around the nested run —
/// this is also how lazy-seq/delay forcing works.
pub fn call_function(interp: &mut Interp, f: Value, args: &[Value]) -> Result<Value, Value> {
    let saved = save_regs(interp);
    let entry_depth = interp.machine.dump.len();
    interp.heap.sink_push(f);
    let arg_list = interp.list(args);
    interp.heap.sink_pop();
    let arg_list = match arg_list {
        Ok(l) => l,
        Err(e) => {
            restore_regs(interp, saved);
            return Err(e);
        }
    };
    interp.machine.value = f;
    interp.machine.args = arg_list;
    interp.machine.op = Op::Apply;
    let result = eval::run(interp, entry_depth);
    restore_regs(interp, saved);
    result
}

/// Realize a lazy-seq/delay chain to a concrete value, memoizing each link
/// in place. Idempotent on repeat forcing; plain values pass through.
pub fn force_now(interp: &mut Interp, v: Value) -> Result<Value, Value> {
    let mut cur = v;
    loop {
        match interp.kind_of(cur) {
            Some(CellKind::LazySeq {
                thunk,
                value,
                realized,
            })
            | Some(CellKind::Delay {
                thunk,
                value,
                realized,
            }) => {
                if realized {
                    cur = value;
                    continue;
                }
                let produced = call_function(interp, thunk, &[])?;
                if let Some(r) = cur.as_cell() {
                    match &mut interp.heap.cell_mut(r).kind {
                        CellKind::LazySeq { value, realized, .. }
                        | CellKind::Delay { value, realized, .. } => {
                            *value = produced;
                            *realized = true;
                        }
                        _ => {}
                    }
                }
                cur = produced;
            }
            _ => return Ok(cur),
        }
    }
}

/// Evaluate one expression in the user namespace.
pub fn eval_expr(interp: &mut Interp, expr: Value) -> Result<Value, Value> {
    let saved = save_regs(interp);
    let entry_depth = interp.machine.dump.len();
    interp.machine.op = Op::Eval;
    interp.machine.code = expr;
    interp.machine.envir = interp.user_env;
    let result = eval::run(interp, entry_depth);
    restore_regs(interp, saved);
    result
}

/// Read one expression from a port value; `Value::Eof` at end of input.
pub fn read_port(interp: &mut Interp, port_v: Value) -> Result<Value, Value> {
    let saved = save_regs(interp);
    let entry_depth = interp.machine.dump.len();
    interp.machine.op = Op::ReadExpr;
    interp.machine.code = port_v;
    let result = eval::run(interp, entry_depth);
    restore_regs(interp, saved);
    result
}

/// Allocate a string-input port cell.
pub fn string_port(interp: &mut Interp, name: &str, text: &str) -> Result<Value, Value> {
    let state = PortState::string_input(name, text);
    interp.alloc(CellKind::Port(Rc::new(RefCell::new(state))))
}

/// Read a single expression from source text.
pub fn read_str(interp: &mut Interp, src: &str) -> Result<Value, Value> {
    let port = string_port(interp, "<string>", src)?;
    interp.heap.sink_push(port);
    let result = read_port(interp, port);
    interp.heap.sink_pop();
    result
}

/// The embedder entry point: read and evaluate every form in `src`,
/// returning the last result. Uncaught exceptions surface as host errors.
pub fn eval_str(interp: &mut Interp, name: &str, src: &str) -> Result<Value, LoamError> {
    let port = string_port(interp, name, src).map_err(|e| interp.describe_exception(e))?;
    interp.heap.sink_push(port);
    let result = eval_port_loop(interp, port);
    interp.heap.sink_pop();
    result
}

/// Run every form from a file through the reader and evaluator.
pub fn eval_file(interp: &mut Interp, path: &std::path::Path) -> Result<Value, LoamError> {
    let state = PortState::file_input(path).map_err(LoamError::io)?;
    let port = interp
        .alloc(CellKind::Port(Rc::new(RefCell::new(state))))
        .map_err(|e| interp.describe_exception(e))?;
    interp.heap.sink_push(port);
    let result = eval_port_loop(interp, port);
    interp.heap.sink_pop();
    result
}

fn eval_port_loop(interp: &mut Interp, port: Value) -> Result<Value, LoamError> {
    // The previous form's result is anchored while the next form is read,
    // so a collection triggered by the lexer cannot reclaim it.
    let depth = interp.heap.sink_depth();
    let mut last = Value::Nil;
    interp.heap.sink_push(last);
    let result = loop {
        let expr = match read_port(interp, port) {
            Ok(e) => e,
            Err(e) => break Err(interp.describe_exception(e)),
        };
        if matches!(expr, Value::Eof) {
            break Ok(last);
        }
        last = match eval_expr(interp, expr) {
            Ok(v) => v,
            Err(e) => break Err(interp.describe_exception(e)),
        };
        interp.heap.sink_pop();
        interp.heap.sink_push(last);
    };
    interp.heap.sink_truncate(depth);
    result
}
