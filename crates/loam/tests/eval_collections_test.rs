mod common;

use common::eval;

#[test]
fn vector_ops() {
    assert_eq!(eval("(conj [1 2] 3)"), "[1 2 3]");
    assert_eq!(eval("(nth [10 20 30] 1)"), "20");
    assert_eq!(eval("(count [1 2 3])"), "3");
    assert_eq!(eval("(subvec [0 1 2 3 4] 1 3)"), "[1 2]");
    assert_eq!(eval("(vec '(1 2 3))"), "[1 2 3]");
    assert_eq!(eval("(vector 1 2)"), "[1 2]");
}

#[test]
fn conj_never_mutates_the_original() {
    let src = "(def v [1 2 3])
               (def w (conj v 4))
               (list v w (conj v 9))";
    assert_eq!(eval(src), "([1 2 3] [1 2 3 4] [1 2 3 9])");
}

#[test]
fn subvec_views_are_independent_of_growth() {
    let src = "(def big [0 1 2 3 4 5 6 7 8 9 10 11])
               (def view (subvec big 2 6))
               (def grown (conj big 12))
               (list view (nth view 0) (count view))";
    assert_eq!(eval(src), "([2 3 4 5] 2 4)");
}

#[test]
fn list_ops() {
    assert_eq!(eval("(cons 1 '(2 3))"), "(1 2 3)");
    assert_eq!(eval("(first '(1 2 3))"), "1");
    assert_eq!(eval("(rest '(1 2 3))"), "(2 3)");
    assert_eq!(eval("(first nil)"), "nil");
    assert_eq!(eval("(rest nil)"), "nil");
    assert_eq!(eval("(reverse '(1 2 3))"), "(3 2 1)");
    assert_eq!(eval("(concat '(1 2) [3 4] nil)"), "(1 2 3 4)");
    assert_eq!(eval("(last '(1 2 3))"), "3");
    assert_eq!(eval("(take 2 (range 10))"), "(0 1)");
    assert_eq!(eval("(drop 8 (range 10))"), "(8 9)");
}

#[test]
fn array_map_preserves_insertion_order() {
    // Linear-scan association vector: iteration follows insertion, and
    // assoc of a new key appends.
    assert_eq!(eval("(keys {:b 1 :a 2})"), "(:b :a)");
    assert_eq!(eval("(keys (assoc {:b 1 :a 2} :c 3))"), "(:b :a :c)");
    assert_eq!(eval("(vals (assoc {:b 1} :b 9))"), "(9)");
}

#[test]
fn map_ops() {
    assert_eq!(eval("(get {:a 1} :a)"), "1");
    assert_eq!(eval("(get {:a 1} :b :missing)"), ":missing");
    assert_eq!(eval("(count (dissoc {:a 1 :b 2} :a))"), "1");
    assert_eq!(eval("(contains? {:a nil} :a)"), "true");
    assert_eq!(eval("(contains? {:a 1} :b)"), "false");
    assert_eq!(eval("(get (merge {:a 1} {:a 2 :b 3}) :a)"), "2");
    assert_eq!(eval("(conj {:a 1} [:b 2])"), "{:a 1, :b 2}");
    assert_eq!(eval("('x {'x 5})"), "5");
}

#[test]
fn map_equality_is_order_insensitive() {
    assert_eq!(eval("(= {:a 1 :b 2} {:b 2 :a 1})"), "true");
    assert_eq!(eval("(= {:a 1} {:a 2})"), "false");
}

#[test]
fn sorted_sets() {
    assert_eq!(eval("#{3 1 2}"), "#{1 2 3}");
    assert_eq!(eval("(conj #{1 3} 2)"), "#{1 2 3}");
    assert_eq!(eval("(conj #{1 2} 2)"), "#{1 2}");
    assert_eq!(eval("(contains? #{1 2} 2)"), "true");
    assert_eq!(eval("(disj #{1 2 3} 2)"), "#{1 3}");
    assert_eq!(eval("(:x #{:x :y})"), ":x");
}

#[test]
fn queues_are_fifo() {
    let src = "(def q (queue 1 2 3))
               (list (peek q) (peek (pop q)) (count (pop q)))";
    assert_eq!(eval(src), "(1 2 2)");
}

#[test]
fn strings_are_codepoint_indexed() {
    assert_eq!(eval("(count \"héllo\")"), "5");
    assert_eq!(eval("(nth \"héllo\" 1)"), "\\é");
    assert_eq!(eval("(subs \"héllo wörld\" 6 11)"), "\"wörld\"");
    assert_eq!(eval("(first \"abc\")"), "\\a");
    assert_eq!(eval("(rest \"abc\")"), "\"bc\"");
}

#[test]
fn string_builders() {
    assert_eq!(eval("(str \"a\" 1 nil :k)"), "\"a1:k\"");
    assert_eq!(eval("(string-upper \"abc\")"), "\"ABC\"");
    assert_eq!(eval("(string-split \"a,b,c\" \",\")"), "(\"a\" \"b\" \"c\")");
    assert_eq!(
        eval("(string-join \",\" [1 2 3])"),
        "\"1,2,3\""
    );
    assert_eq!(eval("(name :foo)"), "\"foo\"");
    assert_eq!(eval("(symbol \"abc\")"), "abc");
    assert_eq!(eval("(keyword \"abc\")"), ":abc");
    assert_eq!(eval("(int \\A)"), "65");
    assert_eq!(eval("(char 65)"), "\\A");
}

#[test]
fn seq_over_maps_and_sets() {
    assert_eq!(eval("(first {:a 1})"), "[:a 1]");
    assert_eq!(eval("(count (rest {:a 1 :b 2}))"), "1");
    assert_eq!(eval("(map first {:a 1 :b 2})"), "(:a :b)");
}

#[test]
fn regex_ops() {
    assert_eq!(eval("(re-find #\"[0-9]+\" \"abc123def\")"), "\"123\"");
    assert_eq!(eval("(re-matches #\"a+\" \"aaa\")"), "\"aaa\"");
    assert_eq!(eval("(re-matches #\"a+\" \"aab\")"), "nil");
    assert_eq!(
        eval("(re-seq #\"[0-9]+\" \"a1b22c333\")"),
        "(\"1\" \"22\" \"333\")"
    );
    assert_eq!(
        eval("(re-find #\"([a-z]+)-([0-9]+)\" \"id: abc-42\")"),
        "[\"abc-42\" \"abc\" \"42\"]"
    );
}

#[test]
fn ratio_printing_round_trips() {
    assert_eq!(eval("3/4"), "3/4");
    assert_eq!(eval("(+ 1/4 1/4)"), "1/2");
    assert_eq!(eval("(numerator 3/4)"), "3");
    assert_eq!(eval("(denominator 3/4)"), "4");
}
