mod common;

use common::{eval, eval_in, new_interp};

#[test]
fn self_evaluating_literals() {
    assert_eq!(eval("42"), "42");
    assert_eq!(eval("2.5"), "2.5");
    assert_eq!(eval("true"), "true");
    assert_eq!(eval("nil"), "nil");
    assert_eq!(eval(":kw"), ":kw");
    assert_eq!(eval("\"hi\""), "\"hi\"");
}

#[test]
fn arithmetic_basics() {
    assert_eq!(eval("(+ 1 2 3)"), "6");
    assert_eq!(eval("(- 10 3 2)"), "5");
    assert_eq!(eval("(* 2 3 4)"), "24");
    assert_eq!(eval("(+)"), "0");
    assert_eq!(eval("(*)"), "1");
    assert_eq!(eval("(- 5)"), "-5");
}

#[test]
fn numeric_promotion() {
    assert_eq!(eval("(+ 1 1/2)"), "3/2");
    assert_eq!(eval("(+ 1 2.0)"), "3.0");
    assert_eq!(eval("(/ 1 2)"), "1/2");
    assert_eq!(eval("(/ 4 2)"), "2");
    assert_eq!(eval("(/ 1.0 0.0)"), "##Inf");
    assert_eq!(eval("(* 1/3 3)"), "1");
}

#[test]
fn type_exact_equality() {
    assert_eq!(eval("(= 1 1.0)"), "false");
    assert_eq!(eval("(== 1 1.0)"), "true");
    assert_eq!(eval("(= 1/2 1/2)"), "true");
    assert_eq!(eval("(= [1 2] (list 1 2))"), "true");
    assert_eq!(eval("(< 1/2 1)"), "true");
}

#[test]
fn if_and_truthiness() {
    assert_eq!(eval("(if true 1 2)"), "1");
    assert_eq!(eval("(if false 1 2)"), "2");
    assert_eq!(eval("(if nil 1 2)"), "2");
    assert_eq!(eval("(if 0 1 2)"), "1");
    assert_eq!(eval("(if false 1)"), "nil");
}

#[test]
fn do_sequences() {
    assert_eq!(eval("(do 1 2 3)"), "3");
    assert_eq!(eval("(do)"), "nil");
}

#[test]
fn let_scoping() {
    assert_eq!(eval("(let [x 1] (let [x 2] x))"), "2");
    assert_eq!(eval("(let [x 1] (let [x 2] x) x)"), "1");
    assert_eq!(eval("(let [x 1 y (+ x 1)] y)"), "2");
    assert_eq!(eval("(let [] 7)"), "7");
}

#[test]
fn def_and_symbol_resolution() {
    assert_eq!(eval("(def x 41) (+ x 1)"), "42");
    let out = eval("unbound-name");
    assert!(out.contains("undeclared var"), "{out}");
}

#[test]
fn set_bang_mutates_existing() {
    assert_eq!(eval("(def counter 0) (set! counter 5) counter"), "5");
    let out = eval("(set! never-defined 1)");
    assert!(out.contains("undeclared var"), "{out}");
}

#[test]
fn closures_capture_environment() {
    assert_eq!(
        eval("(def add (fn [a] (fn [b] (+ a b)))) ((add 3) 4)"),
        "7"
    );
}

#[test]
fn named_fn_self_recursion() {
    assert_eq!(
        eval("((fn fact [n] (if (= n 0) 1 (* n (fact (- n 1))))) 5)"),
        "120"
    );
}

#[test]
fn multi_arity_dispatch() {
    let src = "(def f (fn ([x] :one) ([x y] :two) ([x y & more] :many)))
               (list (f 1) (f 1 2) (f 1 2 3))";
    assert_eq!(eval(src), "(:one :two :many)");
}

#[test]
fn variadic_params() {
    assert_eq!(eval("((fn [a & rest] rest) 1 2 3)"), "(2 3)");
    // The empty list is nil, classic-Lisp style.
    assert_eq!(eval("((fn [a & rest] rest) 1)"), "nil");
}

#[test]
fn dotted_pair_params() {
    assert_eq!(eval("((fn (a . rest) rest) 1 2 3)"), "(2 3)");
    assert_eq!(eval("((fn (a b) (+ a b)) 1 2)"), "3");
}

#[test]
fn destructuring_params() {
    assert_eq!(eval("((fn [[a b]] (+ a b)) [3 4])"), "7");
    assert_eq!(
        eval("((fn [[a & more :as all]] (list a more (count all))) [1 2 3])"),
        "(1 (2 3) 3)"
    );
    assert_eq!(eval("(let [{:keys [x y]} {:x 1 :y 2}] (+ x y))"), "3");
}

#[test]
fn cond_clauses() {
    let src = "(def classify (fn [n] (cond (< n 0) :neg (= n 0) :zero :else :pos)))
               (list (classify -1) (classify 0) (classify 9))";
    assert_eq!(eval(src), "(:neg :zero :pos)");
}

#[test]
fn and_or_short_circuit() {
    assert_eq!(eval("(and 1 2 3)"), "3");
    assert_eq!(eval("(and 1 nil 3)"), "nil");
    assert_eq!(eval("(and)"), "true");
    assert_eq!(eval("(or nil false 3)"), "3");
    assert_eq!(eval("(or nil false)"), "false");
    assert_eq!(eval("(or)"), "nil");
    // Short-circuit: the divide never runs.
    assert_eq!(eval("(or 1 (/ 1 0))"), "1");
    assert_eq!(eval("(and nil (/ 1 0))"), "nil");
}

#[test]
fn loop_recur_tail_calls() {
    assert_eq!(
        eval("(loop [i 0 acc 0] (if (= i 10) acc (recur (inc i) (+ acc i))))"),
        "45"
    );
}

#[test]
fn loop_recur_one_million_iterations() {
    // True tail-call elimination: constant continuation-stack depth.
    assert_eq!(
        eval("(loop [i 0] (if (< i 1000000) (recur (inc i)) i))"),
        "1000000"
    );
}

#[test]
fn recur_to_fn_params() {
    assert_eq!(
        eval("((fn [n acc] (if (= n 0) acc (recur (dec n) (* acc n)))) 10 1)"),
        "3628800"
    );
}

#[test]
fn quote_and_eval() {
    assert_eq!(eval("'(1 2 3)"), "(1 2 3)");
    assert_eq!(eval("(eval '(+ 1 2))"), "3");
    assert_eq!(eval("'sym"), "sym");
}

#[test]
fn apply_spreads_last() {
    assert_eq!(eval("(apply + '(1 2 3))"), "6");
    assert_eq!(eval("(apply + 1 2 [3 4])"), "10");
}

#[test]
fn macros_expand_unevaluated() {
    let src = "(def unless (macro [test then else] (list 'if test else then)))
               (unless false :yes :no)";
    assert_eq!(eval(src), ":yes");
}

#[test]
fn quasiquote_templates() {
    assert_eq!(eval("`(1 ~(+ 1 1) 3)"), "(1 2 3)");
    assert_eq!(eval("(def xs '(2 3)) `(1 ~@xs 4)"), "(1 2 3 4)");
    assert_eq!(eval("`[1 ~(+ 1 1)]"), "[1 2]");
    assert_eq!(eval("`x"), "x");
}

#[test]
fn fn_literals() {
    assert_eq!(eval("(#(+ % 1) 41)"), "42");
    assert_eq!(eval("(#(+ %1 %2) 40 2)"), "42");
    assert_eq!(eval("(#(count %&) 1 2 3)"), "3");
}

#[test]
fn keyword_as_accessor() {
    assert_eq!(eval("(:a {:a 1 :b 2})"), "1");
    assert_eq!(eval("(:missing {:a 1} :default)"), ":default");
}

#[test]
fn var_special_form_and_watches() {
    let mut interp = new_interp();
    assert_eq!(eval_in(&mut interp, "(def watched 1) (var? (var watched))"), "true");
    let src = "(def log [])
               (add-watch (var watched) :k (fn [old new] (set! log (conj log [old new]))))
               (set! watched 2)
               log";
    assert_eq!(eval_in(&mut interp, src), "[[1 2]]");
}

#[test]
fn lazy_seq_memoizes() {
    let mut interp = new_interp();
    let src = "(def evaluations 0)
               (def s (lazy-seq (do (set! evaluations (inc evaluations)) (list 1 2))))
               (list (first s) (first s) evaluations)";
    assert_eq!(eval_in(&mut interp, src), "(1 1 1)");
}

#[test]
fn delay_and_force() {
    let mut interp = new_interp();
    let src = "(def ticks 0)
               (def d (delay (do (set! ticks (inc ticks)) 42)))
               (list (force d) (force d) ticks)";
    assert_eq!(eval_in(&mut interp, src), "(42 42 1)");
}

#[test]
fn thread_spawns_and_returns_nil() {
    // Fire-and-forget: the spawned interpreter runs over its own heap.
    assert_eq!(eval("(thread (+ 1 2))"), "nil");
    assert_eq!(eval("(do (thread (println)) 7)"), "7");
}

#[test]
fn gensym_is_fresh() {
    assert_eq!(eval("(= (gensym \"g\") (gensym \"g\"))"), "false");
}

#[test]
fn higher_order_stdlib() {
    assert_eq!(eval("(map inc [1 2 3])"), "(2 3 4)");
    assert_eq!(eval("(filter odd? (range 10))"), "(1 3 5 7 9)");
    assert_eq!(eval("(reduce + 0 (range 101))"), "5050");
    assert_eq!(eval("(map + [1 2 3] [10 20 30])"), "(11 22 33)");
}
