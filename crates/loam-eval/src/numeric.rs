use loam_core::{CellKind, Interp, Value};

/// A number lifted out of its value representation: the three rungs of the
/// tower. Promotion is strictly `long -> ratio -> real`.
#[derive(Debug, Clone, Copy)]
pub enum Num {
    Int(i64),
    Ratio(i64, i64),
    Real(f64),
}

pub fn num_of(interp: &mut Interp, v: Value) -> Result<Num, Value> {
    match v {
        Value::Int(n) => Ok(Num::Int(n)),
        Value::Float(f) => Ok(Num::Real(f)),
        _ => match interp.kind_of(v) {
            Some(CellKind::Ratio { num, den }) => Ok(Num::Ratio(num, den)),
            _ => {
                let got = interp.type_name(v);
                Err(interp.type_error("number", got))
            }
        },
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Build a ratio value: reduced by gcd, denominator positive, and
/// denominator 1 collapsing to a plain integer. Zero denominators raise.
pub fn make_ratio(interp: &mut Interp, num: i64, den: i64) -> Result<Value, Value> {
    if den == 0 {
        return Err(interp.arithmetic_error("divide by zero"));
    }
    let sign = if den < 0 { -1 } else { 1 };
    let g = gcd(num, den);
    let (num, den) = (sign * (num / g), (den / g).abs());
    if den == 1 {
        Ok(Value::Int(num))
    } else {
        interp.alloc(CellKind::Ratio { num, den })
    }
}

fn overflow(interp: &mut Interp) -> Value {
    interp.arithmetic_error("integer overflow")
}

/// Narrow an i128 intermediate back into i64 or raise.
fn narrow(interp: &mut Interp, x: i128) -> Result<i64, Value> {
    i64::try_from(x).map_err(|_| overflow(interp))
}

fn ratio_from_i128(interp: &mut Interp, num: i128, den: i128) -> Result<Value, Value> {
    let n = narrow(interp, num)?;
    let d = narrow(interp, den)?;
    make_ratio(interp, n, d)
}

fn as_real(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Ratio(n, d) => n as f64 / d as f64,
        Num::Real(f) => f,
    }
}

/// Overflow-checked addition with promotion. Integer overflow raises an
/// arithmetic exception instead of wrapping or silently widening.
pub fn add(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_add(y) {
            Some(n) => Ok(Value::Int(n)),
            None => Err(overflow(interp)),
        },
        (Num::Real(_), _) | (_, Num::Real(_)) => {
            Ok(Value::float(as_real(a) + as_real(b)))
        }
        _ => {
            let (an, ad) = ratio_parts(a);
            let (bn, bd) = ratio_parts(b);
            let num = an as i128 * bd as i128 + bn as i128 * ad as i128;
            let den = ad as i128 * bd as i128;
            ratio_from_i128(interp, num, den)
        }
    }
}

pub fn sub(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_sub(y) {
            Some(n) => Ok(Value::Int(n)),
            None => Err(overflow(interp)),
        },
        (Num::Real(_), _) | (_, Num::Real(_)) => {
            Ok(Value::float(as_real(a) - as_real(b)))
        }
        _ => {
            let (an, ad) = ratio_parts(a);
            let (bn, bd) = ratio_parts(b);
            let num = an as i128 * bd as i128 - bn as i128 * ad as i128;
            let den = ad as i128 * bd as i128;
            ratio_from_i128(interp, num, den)
        }
    }
}

pub fn mul(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_mul(y) {
            Some(n) => Ok(Value::Int(n)),
            None => Err(overflow(interp)),
        },
        (Num::Real(_), _) | (_, Num::Real(_)) => {
            Ok(Value::float(as_real(a) * as_real(b)))
        }
        _ => {
            let (an, ad) = ratio_parts(a);
            let (bn, bd) = ratio_parts(b);
            ratio_from_i128(interp, an as i128 * bn as i128, ad as i128 * bd as i128)
        }
    }
}

/// Division. Exact operands produce exact results (`(/ 1 2)` is `1/2`);
/// exact division by zero raises, while float division by zero yields the
/// IEEE infinities/NaN.
pub fn div(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Real(_), _) | (_, Num::Real(_)) => {
            Ok(Value::float(as_real(a) / as_real(b)))
        }
        _ => {
            let (an, ad) = ratio_parts(a);
            let (bn, bd) = ratio_parts(b);
            if bn == 0 {
                return Err(interp.arithmetic_error("divide by zero"));
            }
            ratio_from_i128(interp, an as i128 * bd as i128, ad as i128 * bn as i128)
        }
    }
}

fn ratio_parts(n: Num) -> (i64, i64) {
    match n {
        Num::Int(i) => (i, 1),
        Num::Ratio(a, b) => (a, b),
        Num::Real(_) => unreachable!("reals never reach the exact path"),
    }
}

/// Truncating integer quotient; both operands must be longs.
pub fn quot(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                Err(interp.arithmetic_error("divide by zero"))
            } else {
                match x.checked_div(y) {
                    Some(n) => Ok(Value::Int(n)),
                    None => Err(overflow(interp)),
                }
            }
        }
        _ => Err(interp.illegal_argument("quot expects integers")),
    }
}

pub fn rem(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                Err(interp.arithmetic_error("divide by zero"))
            } else {
                match x.checked_rem(y) {
                    Some(n) => Ok(Value::Int(n)),
                    None => Err(overflow(interp)),
                }
            }
        }
        _ => Err(interp.illegal_argument("rem expects integers")),
    }
}

/// Floored modulus (result takes the divisor's sign).
pub fn modulo(interp: &mut Interp, a: Num, b: Num) -> Result<Value, Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                Err(interp.arithmetic_error("divide by zero"))
            } else {
                match x.checked_rem(y) {
                    Some(r) => {
                        let m = if r != 0 && (r < 0) != (y < 0) { r + y } else { r };
                        Ok(Value::Int(m))
                    }
                    None => Err(overflow(interp)),
                }
            }
        }
        _ => Err(interp.illegal_argument("mod expects integers")),
    }
}

pub fn negate(interp: &mut Interp, a: Num) -> Result<Value, Value> {
    match a {
        Num::Int(x) => match x.checked_neg() {
            Some(n) => Ok(Value::Int(n)),
            None => Err(overflow(interp)),
        },
        Num::Ratio(n, d) => make_ratio(interp, -n, d),
        Num::Real(f) => Ok(Value::float(-f)),
    }
}
