mod common;

use common::eval;

#[test]
fn read_then_print_round_trips() {
    assert_eq!(eval("'[1 2 [3 4]]"), "[1 2 [3 4]]");
    assert_eq!(eval("'(a [b {:c 1}] #{2 1})"), "(a [b {:c 1}] #{1 2})");
    assert_eq!(eval("(read-string \"[1 2 [3 4]]\")"), "[1 2 [3 4]]");
}

#[test]
fn unicode_escape_is_codepoint_65() {
    assert_eq!(eval("\"\\u0041\""), "\"A\"");
    assert_eq!(eval("(int (first \"\\u0041\"))"), "65");
}

#[test]
fn reader_errors_carry_position() {
    let out = eval("(+ 1 2))");
    assert!(out.contains("unmatched delimiter"), "{out}");
    assert!(out.contains("<test>:1:"), "{out}");

    let out = eval("(+ 1");
    assert!(out.contains("unterminated"), "{out}");

    let out = eval("[1 2");
    assert!(out.contains("unterminated"), "{out}");
}

#[test]
fn mismatched_delimiters_error() {
    let out = eval("(]");
    assert!(out.contains("unmatched delimiter"), "{out}");
    let out = eval("[1)");
    assert!(out.contains("unmatched delimiter"), "{out}");
}

#[test]
fn map_literal_arity() {
    let out = eval("{:a}");
    assert!(out.contains("even number"), "{out}");
    assert_eq!(eval("{}"), "{}");
}

#[test]
fn discard_is_invisible() {
    assert_eq!(eval("(+ 1 #_999 2)"), "3");
    let out = eval("#_ (broken ( 42");
    assert!(out.contains("unterminated"), "{out}");
}

#[test]
fn comments_are_skipped() {
    assert_eq!(eval("; leading\n(+ 1 2) ; trailing"), "3");
}

#[test]
fn dotted_pairs_read_and_print() {
    assert_eq!(eval("'(1 . 2)"), "(1 . 2)");
    assert_eq!(eval("'(1 2 . 3)"), "(1 2 . 3)");
    let out = eval("'(1 . 2 3)");
    assert!(out.contains("expected )"), "{out}");
}

#[test]
fn tagged_literals_become_data() {
    assert_eq!(
        eval("(:tag #point [1 2])"),
        "point"
    );
    assert_eq!(eval("(:form #point [1 2])"), "[1 2]");
}

#[test]
fn sharp_constants_read() {
    assert_eq!(eval("##Inf"), "##Inf");
    assert_eq!(eval("##-Inf"), "##-Inf");
    assert_eq!(eval("(= ##NaN ##NaN)"), "false");
}

#[test]
fn deeply_nested_literals_do_not_touch_the_native_stack() {
    // The parser runs as machine opcodes over the dump stack, so literal
    // nesting depth is heap-bound.
    let depth = 20_000;
    let mut src = String::new();
    src.push_str("(count ");
    src.push_str(&"[".repeat(depth));
    src.push('1');
    src.push_str(&"]".repeat(depth));
    src.push(')');
    assert_eq!(eval(&src), "1");
}

#[test]
fn radix_and_ratio_literals() {
    assert_eq!(eval("0x10"), "16");
    assert_eq!(eval("2r1010"), "10");
    assert_eq!(eval("16rff"), "255");
    assert_eq!(eval("6/8"), "3/4");
}

#[test]
fn char_literals_read() {
    assert_eq!(eval("\\a"), "\\a");
    assert_eq!(eval("\\newline"), "\\newline");
    assert_eq!(eval("\\space"), "\\space");
    assert_eq!(eval("(= \\u0041 \\A)"), "true");
}

#[test]
fn quote_sugar() {
    assert_eq!(eval("''x"), "(quote x)");
    assert_eq!(eval("'@x"), "(deref x)");
}

#[test]
fn read_from_port() {
    assert_eq!(
        eval("(def p (string-reader \"(+ 1 2) 99\")) (list (eval (read p)) (read p) (read p))"),
        "(3 99 #<eof>)"
    );
}

#[test]
fn eof_value() {
    assert_eq!(eval("(eof? (read (string-reader \"\")))"), "true");
}
