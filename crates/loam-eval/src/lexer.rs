use std::cell::RefCell;
use std::rc::Rc;

use loam_core::port::PortState;
use loam_core::{CellKind, Interp, Value};

use crate::numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delim {
    Paren,
    Bracket,
    Brace,
}

/// One token pulled from a port. Atoms arrive as finished values (strings,
/// ratios and regexes are allocated by the tokenizer).
pub enum Token {
    Open(Delim),
    Close(Delim),
    /// `#{`
    SetOpen,
    /// `#(`
    FnOpen,
    /// `#_`
    Discard,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplice,
    Deref,
    /// Bare `.` inside a list — dotted-pair tail marker.
    Dot,
    Atom(Value),
    /// `#tag` — tagged literal dispatch; payload is the tag symbol text.
    Tagged(String),
    Eof,
}

/// Build the runtime exception for a reader diagnostic, annotated with the
/// port's name/line/column.
pub fn reader_error(interp: &mut Interp, port: &Rc<RefCell<PortState>>, msg: &str) -> Value {
    let pos = port.borrow().pos();
    interp.runtime_error(&format!("{pos}: {msg}"))
}

fn read_cp(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<Option<char>, Value> {
    let r = port.borrow_mut().read_codepoint();
    r.map_err(|msg| reader_error(interp, port, &msg))
}

fn unread(port: &Rc<RefCell<PortState>>, c: char) {
    port.borrow_mut().unread_codepoint(c);
}

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace()
        && !matches!(
            c,
            '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\'' | '`' | '@' | '~' | ';' | ',' | '\\'
                | '#'
        )
}

fn is_symbol_start(c: char) -> bool {
    is_symbol_char(c) && !c.is_ascii_digit() && c != ':'
}

/// Pull the next token. Whitespace, commas, and `;` comments are skipped
/// transparently.
pub fn next_token(
    interp: &mut Interp,
    port: &Rc<RefCell<PortState>>,
) -> Result<Token, Value> {
    loop {
        let c = match read_cp(interp, port)? {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };
        match c {
            _ if c.is_whitespace() || c == ',' => continue,
            ';' => {
                // Line comment, transparently skipped.
                while let Some(c) = read_cp(interp, port)? {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => return Ok(Token::Open(Delim::Paren)),
            ')' => return Ok(Token::Close(Delim::Paren)),
            '[' => return Ok(Token::Open(Delim::Bracket)),
            ']' => return Ok(Token::Close(Delim::Bracket)),
            '{' => return Ok(Token::Open(Delim::Brace)),
            '}' => return Ok(Token::Close(Delim::Brace)),
            '\'' => return Ok(Token::Quote),
            '`' => return Ok(Token::Quasiquote),
            '~' => {
                return match read_cp(interp, port)? {
                    Some('@') => Ok(Token::UnquoteSplice),
                    Some(c) => {
                        unread(port, c);
                        Ok(Token::Unquote)
                    }
                    None => Ok(Token::Unquote),
                };
            }
            '@' => return Ok(Token::Deref),
            '"' => return read_string(interp, port).map(Token::Atom),
            '\\' => return read_char_literal(interp, port).map(Token::Atom),
            '#' => return read_dispatch(interp, port),
            ':' => return read_keyword(interp, port).map(Token::Atom),
            _ => {
                let mut text = String::new();
                text.push(c);
                while let Some(c) = read_cp(interp, port)? {
                    if is_symbol_char(c) || c == ':' {
                        text.push(c);
                    } else {
                        unread(port, c);
                        break;
                    }
                }
                if text == "." {
                    return Ok(Token::Dot);
                }
                if let Some(v) = parse_number(interp, &text)? {
                    return Ok(Token::Atom(v));
                }
                return Ok(Token::Atom(match text.as_str() {
                    "nil" => Value::Nil,
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => interp.sym(&text),
                }));
            }
        }
    }
}

fn read_keyword(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<Value, Value> {
    let mut name = String::new();
    while let Some(c) = read_cp(interp, port)? {
        if is_symbol_char(c) || c == ':' {
            name.push(c);
        } else {
            unread(port, c);
            break;
        }
    }
    if name.is_empty() {
        return Err(reader_error(interp, port, "expected keyword name after ':'"));
    }
    Ok(interp.keyword(&name))
}

/// String literals: a DFA over escape states.
fn read_string(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<Value, Value> {
    let mut out = String::new();
    loop {
        let c = match read_cp(interp, port)? {
            Some(c) => c,
            None => return Err(reader_error(interp, port, "unterminated string")),
        };
        match c {
            '"' => break,
            '\\' => {
                let e = match read_cp(interp, port)? {
                    Some(e) => e,
                    None => {
                        return Err(reader_error(interp, port, "unterminated string escape"))
                    }
                };
                match e {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    'u' => out.push(read_hex_escape(interp, port)?),
                    'o' => out.push(read_octal_escape(interp, port)?),
                    other => {
                        return Err(reader_error(
                            interp,
                            port,
                            &format!("unknown string escape \\{other}"),
                        ));
                    }
                }
            }
            _ => out.push(c),
        }
    }
    interp.string(&out)
}

/// `\uXXXX` — exactly four hex digits.
fn read_hex_escape(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<char, Value> {
    let mut hex = String::new();
    for _ in 0..4 {
        match read_cp(interp, port)? {
            Some(c) if c.is_ascii_hexdigit() => hex.push(c),
            _ => {
                return Err(reader_error(
                    interp,
                    port,
                    "\\u escape requires exactly 4 hex digits",
                ));
            }
        }
    }
    let code = u32::from_str_radix(&hex, 16)
        .map_err(|_| reader_error(interp, port, &format!("invalid hex escape \\u{hex}")))?;
    char::from_u32(code).ok_or_else(|| {
        reader_error(
            interp,
            port,
            &format!("invalid unicode scalar value \\u{hex}"),
        )
    })
}

/// `\oNNN` — one to three octal digits.
fn read_octal_escape(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<char, Value> {
    let mut oct = String::new();
    while oct.len() < 3 {
        match read_cp(interp, port)? {
            Some(c) if ('0'..='7').contains(&c) => oct.push(c),
            Some(c) => {
                unread(port, c);
                break;
            }
            None => break,
        }
    }
    if oct.is_empty() {
        return Err(reader_error(interp, port, "\\o escape requires octal digits"));
    }
    let code = u32::from_str_radix(&oct, 8)
        .map_err(|_| reader_error(interp, port, &format!("invalid octal escape \\o{oct}")))?;
    char::from_u32(code).ok_or_else(|| {
        reader_error(
            interp,
            port,
            &format!("invalid octal escape \\o{oct}"),
        )
    })
}

/// Character literals: `\a`, `\newline`, `\space`, `\tab`, `\return`,
/// `\nul`, `\uXXXX`, `\oNNN`.
fn read_char_literal(
    interp: &mut Interp,
    port: &Rc<RefCell<PortState>>,
) -> Result<Value, Value> {
    let first = match read_cp(interp, port)? {
        Some(c) => c,
        None => return Err(reader_error(interp, port, "unexpected end of input after \\")),
    };
    if !first.is_alphabetic() {
        return Ok(Value::Char(first));
    }
    let mut name = String::new();
    name.push(first);
    while let Some(c) = read_cp(interp, port)? {
        if is_symbol_char(c) {
            name.push(c);
        } else {
            unread(port, c);
            break;
        }
    }
    if name.chars().count() == 1 {
        return Ok(Value::Char(first));
    }
    match name.as_str() {
        "newline" => Ok(Value::Char('\n')),
        "space" => Ok(Value::Char(' ')),
        "tab" => Ok(Value::Char('\t')),
        "return" => Ok(Value::Char('\r')),
        "nul" => Ok(Value::Char('\0')),
        "backspace" => Ok(Value::Char('\u{8}')),
        "formfeed" => Ok(Value::Char('\u{c}')),
        _ if first == 'u' && name.len() == 5 => {
            let hex = &name[1..];
            let code = u32::from_str_radix(hex, 16).map_err(|_| {
                reader_error(interp, port, &format!("invalid char literal \\{name}"))
            })?;
            char::from_u32(code)
                .map(Value::Char)
                .ok_or_else(|| {
                    reader_error(interp, port, &format!("invalid char literal \\{name}"))
                })
        }
        _ if first == 'o' && name.len() >= 2 && name.len() <= 4 => {
            let oct = &name[1..];
            let code = u32::from_str_radix(oct, 8).map_err(|_| {
                reader_error(interp, port, &format!("invalid char literal \\{name}"))
            })?;
            char::from_u32(code)
                .map(Value::Char)
                .ok_or_else(|| {
                    reader_error(interp, port, &format!("invalid char literal \\{name}"))
                })
        }
        _ => Err(reader_error(
            interp,
            port,
            &format!("unknown character name: {name}"),
        )),
    }
}

/// `#`-dispatch: sets, anonymous fns, discard, sharp constants, regex
/// literals, tagged literals.
fn read_dispatch(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<Token, Value> {
    let c = match read_cp(interp, port)? {
        Some(c) => c,
        None => return Err(reader_error(interp, port, "unexpected end of input after #")),
    };
    match c {
        '{' => Ok(Token::SetOpen),
        '(' => Ok(Token::FnOpen),
        '_' => Ok(Token::Discard),
        '"' => read_regex(interp, port).map(Token::Atom),
        '#' => {
            // Sharp constants: ##Inf ##-Inf ##NaN
            let mut name = String::new();
            while let Some(c) = read_cp(interp, port)? {
                if is_symbol_char(c) {
                    name.push(c);
                } else {
                    unread(port, c);
                    break;
                }
            }
            match name.as_str() {
                "Inf" => Ok(Token::Atom(Value::float(f64::INFINITY))),
                "-Inf" => Ok(Token::Atom(Value::float(f64::NEG_INFINITY))),
                "NaN" => Ok(Token::Atom(Value::float(f64::NAN))),
                _ => Err(reader_error(
                    interp,
                    port,
                    &format!("unknown sharp constant ##{name}"),
                )),
            }
        }
        _ if is_symbol_start(c) => {
            let mut tag = String::new();
            tag.push(c);
            while let Some(c) = read_cp(interp, port)? {
                if is_symbol_char(c) {
                    tag.push(c);
                } else {
                    unread(port, c);
                    break;
                }
            }
            Ok(Token::Tagged(tag))
        }
        other => Err(reader_error(
            interp,
            port,
            &format!("unexpected character after #: '{other}'"),
        )),
    }
}

/// `#"..."` — compiled at read time through the regex crate; the engine
/// itself is an external collaborator.
fn read_regex(interp: &mut Interp, port: &Rc<RefCell<PortState>>) -> Result<Value, Value> {
    let mut pat = String::new();
    loop {
        let c = match read_cp(interp, port)? {
            Some(c) => c,
            None => return Err(reader_error(interp, port, "unterminated regex literal")),
        };
        match c {
            '"' => break,
            '\\' => {
                pat.push('\\');
                match read_cp(interp, port)? {
                    Some(e) => pat.push(e),
                    None => {
                        return Err(reader_error(interp, port, "unterminated regex literal"))
                    }
                }
            }
            _ => pat.push(c),
        }
    }
    match regex::Regex::new(&pat) {
        Ok(re) => interp.alloc(CellKind::Regex(Rc::new(re))),
        Err(e) => Err(reader_error(
            interp,
            port,
            &format!("invalid regex literal: {e}"),
        )),
    }
}

/// Numeric literal classification: a small transition scan over sign, radix
/// prefix, ratio slash, and float suffixes. Structural mismatches fall back
/// to symbols; overflow is a hard number-format error.
pub fn parse_number(interp: &mut Interp, text: &str) -> Result<Option<Value>, Value> {
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => match text.strip_prefix('+') {
            Some(rest) => (false, rest),
            None => (false, text),
        },
    };
    if digits.is_empty() || !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(None);
    }
    let sign: i64 = if neg { -1 } else { 1 };

    // Hex: 0x / 0X
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return match i64::from_str_radix(hex, 16) {
                Ok(n) => Ok(Some(Value::Int(sign.wrapping_mul(n)))),
                Err(_) => Err(interp.number_format_error(&format!("integer overflow: {text}"))),
            };
        }
        return Ok(None);
    }

    // Radix: NrDIGITS, radix 2..=36
    if let Some(idx) = digits.find(['r', 'R']) {
        let (radix_part, rest) = (&digits[..idx], &digits[idx + 1..]);
        if let Ok(radix) = radix_part.parse::<u32>() {
            if (2..=36).contains(&radix) && !rest.is_empty() {
                return match i64::from_str_radix(rest, radix) {
                    Ok(n) => Ok(Some(Value::Int(sign.wrapping_mul(n)))),
                    Err(_) => Ok(None),
                };
            }
        }
        return Ok(None);
    }

    // Ratio: n/d
    if let Some(idx) = digits.find('/') {
        let (n_part, d_part) = (&digits[..idx], &digits[idx + 1..]);
        if n_part.chars().all(|c| c.is_ascii_digit())
            && !d_part.is_empty()
            && d_part.chars().all(|c| c.is_ascii_digit())
        {
            let n = n_part
                .parse::<i64>()
                .map_err(|_| interp.number_format_error(&format!("integer overflow: {text}")))?;
            let d = d_part
                .parse::<i64>()
                .map_err(|_| interp.number_format_error(&format!("integer overflow: {text}")))?;
            return numeric::make_ratio(interp, sign * n, d).map(Some);
        }
        return Ok(None);
    }

    // Float: decimal point or exponent
    if digits.contains('.') || digits.contains(['e', 'E']) {
        if let Ok(f) = text.parse::<f64>() {
            return Ok(Some(Value::float(f)));
        }
        return Ok(None);
    }

    // Plain integer
    if digits.chars().all(|c| c.is_ascii_digit()) {
        return match text.parse::<i64>() {
            Ok(n) => Ok(Some(Value::Int(n))),
            Err(_) => Err(interp.number_format_error(&format!("integer overflow: {text}"))),
        };
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::coll;

    fn port_of(text: &str) -> Rc<RefCell<PortState>> {
        Rc::new(RefCell::new(PortState::string_input("<test>", text)))
    }

    fn atom(interp: &mut Interp, text: &str) -> Value {
        let port = port_of(text);
        match next_token(interp, &port).unwrap() {
            Token::Atom(v) => v,
            _ => panic!("expected atom for {text:?}"),
        }
    }

    // 1. Integers, floats, signs
    #[test]
    fn numbers() {
        let mut interp = Interp::new();
        assert_eq!(atom(&mut interp, "42").as_int(), Some(42));
        assert_eq!(atom(&mut interp, "-7").as_int(), Some(-7));
        assert_eq!(atom(&mut interp, "3.5").as_float(), Some(3.5));
        assert_eq!(atom(&mut interp, "1e3").as_float(), Some(1000.0));
    }

    // 2. Radix prefixes: hex and NrDIGITS
    #[test]
    fn radix_literals() {
        let mut interp = Interp::new();
        assert_eq!(atom(&mut interp, "0xff").as_int(), Some(255));
        assert_eq!(atom(&mut interp, "2r101").as_int(), Some(5));
        assert_eq!(atom(&mut interp, "36rz").as_int(), Some(35));
        assert_eq!(atom(&mut interp, "-0x10").as_int(), Some(-16));
    }

    // 3. Ratios reduce and carry a positive denominator
    #[test]
    fn ratio_literals() {
        let mut interp = Interp::new();
        let v = atom(&mut interp, "2/4");
        match interp.kind_of(v) {
            Some(CellKind::Ratio { num, den }) => assert_eq!((num, den), (1, 2)),
            _ => panic!("expected ratio"),
        }
        // 4/2 normalizes to an integer.
        assert_eq!(atom(&mut interp, "4/2").as_int(), Some(2));
    }

    // 4. Overflow is a number-format error, not silent wrap
    #[test]
    fn integer_overflow_errors() {
        let mut interp = Interp::new();
        let port = port_of("99999999999999999999999");
        assert!(next_token(&mut interp, &port).is_err());
    }

    // 5. Number-shaped-but-not-numbers fall back to symbols
    #[test]
    fn numeric_fallback_to_symbol() {
        let mut interp = Interp::new();
        let v = atom(&mut interp, "1x2z");
        assert!(v.as_sym().is_some());
    }

    // 6. String escapes: named, \uXXXX, \oNNN
    #[test]
    fn string_escapes() {
        let mut interp = Interp::new();
        let v = atom(&mut interp, r#""a\nA\o101b""#);
        assert_eq!(coll::str_to_string(&interp, v), Some("a\nAAb".to_string()));
    }

    // 7. A decodes to codepoint 65
    #[test]
    fn unicode_escape_is_codepoint_65() {
        let mut interp = Interp::new();
        let v = atom(&mut interp, r#""A""#);
        let chars = coll::str_chars(&interp, v).unwrap();
        assert_eq!(chars, vec!['A']);
        assert_eq!(chars[0] as u32, 65);
    }

    // 8. Char literals
    #[test]
    fn char_literals() {
        let mut interp = Interp::new();
        assert_eq!(atom(&mut interp, "\\a").as_char(), Some('a'));
        assert_eq!(atom(&mut interp, "\\newline").as_char(), Some('\n'));
        assert_eq!(atom(&mut interp, "\\u0041").as_char(), Some('A'));
        assert_eq!(atom(&mut interp, "\\o101").as_char(), Some('A'));
    }

    // 9. Sharp constants
    #[test]
    fn sharp_constants() {
        let mut interp = Interp::new();
        assert_eq!(atom(&mut interp, "##Inf").as_float(), Some(f64::INFINITY));
        assert_eq!(
            atom(&mut interp, "##-Inf").as_float(),
            Some(f64::NEG_INFINITY)
        );
        assert!(atom(&mut interp, "##NaN").as_float().unwrap().is_nan());
    }

    // 10. Comments and commas are invisible
    #[test]
    fn comments_and_commas() {
        let mut interp = Interp::new();
        let port = port_of("; comment\n , 42");
        match next_token(&mut interp, &port).unwrap() {
            Token::Atom(v) => assert_eq!(v.as_int(), Some(42)),
            _ => panic!("expected atom"),
        }
    }

    // 11. Quote family and deref markers
    #[test]
    fn quote_markers() {
        let mut interp = Interp::new();
        let port = port_of("' ` ~ ~@ @");
        assert!(matches!(next_token(&mut interp, &port).unwrap(), Token::Quote));
        assert!(matches!(
            next_token(&mut interp, &port).unwrap(),
            Token::Quasiquote
        ));
        assert!(matches!(
            next_token(&mut interp, &port).unwrap(),
            Token::Unquote
        ));
        assert!(matches!(
            next_token(&mut interp, &port).unwrap(),
            Token::UnquoteSplice
        ));
        assert!(matches!(next_token(&mut interp, &port).unwrap(), Token::Deref));
    }

    // 12. Dispatch tokens
    #[test]
    fn dispatch_tokens() {
        let mut interp = Interp::new();
        let port = port_of("#{ #( #_ #inst");
        assert!(matches!(
            next_token(&mut interp, &port).unwrap(),
            Token::SetOpen
        ));
        assert!(matches!(next_token(&mut interp, &port).unwrap(), Token::FnOpen));
        assert!(matches!(
            next_token(&mut interp, &port).unwrap(),
            Token::Discard
        ));
        match next_token(&mut interp, &port).unwrap() {
            Token::Tagged(tag) => assert_eq!(tag, "inst"),
            _ => panic!("expected tagged"),
        }
    }

    // 13. Regex literals compile at read time
    #[test]
    fn regex_literal() {
        let mut interp = Interp::new();
        let v = atom(&mut interp, r##"#"a+b""##);
        match interp.kind_of(v) {
            Some(CellKind::Regex(re)) => assert!(re.is_match("aab")),
            _ => panic!("expected regex"),
        }
        let port = port_of(r##"#"[unclosed""##);
        assert!(next_token(&mut interp, &port).is_err());
    }

    // 14. Keywords
    #[test]
    fn keywords() {
        let mut interp = Interp::new();
        let v = atom(&mut interp, ":max-depth");
        let id = v.as_keyword().unwrap();
        assert_eq!(interp.symbols.name(id), "max-depth");
    }
}
