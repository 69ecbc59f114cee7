use loam_core::{print, Interp};

pub fn new_interp() -> Interp {
    let mut interp = Interp::new();
    loam_stdlib::install(&mut interp).expect("stdlib install");
    interp
}

/// Evaluate source in a fresh interpreter, rendering the result (or the
/// error) readably.
pub fn eval(src: &str) -> String {
    let mut interp = new_interp();
    eval_in(&mut interp, src)
}

pub fn eval_in(interp: &mut Interp, src: &str) -> String {
    match loam_eval::eval_str(interp, "<test>", src) {
        Ok(v) => print::pr_str(interp, v),
        Err(e) => format!("ERROR: {e}"),
    }
}
