mod common;

use common::{eval_in, new_interp};
use loam_core::Interp;

#[test]
fn gc_reclaims_garbage_made_by_evaluation() {
    let mut interp = new_interp();
    // Generate plenty of unreachable intermediate structure, then collect.
    eval_in(&mut interp, "(doall (map inc (range 2000)))");
    let freed = eval_in(&mut interp, "(gc)");
    let freed: i64 = freed.parse().expect("gc returns a count");
    assert!(freed > 0, "expected garbage to be reclaimed, got {freed}");
}

#[test]
fn live_definitions_survive_collection() {
    let mut interp = new_interp();
    eval_in(&mut interp, "(def keep (vec (range 100)))");
    eval_in(&mut interp, "(gc)");
    assert_eq!(eval_in(&mut interp, "(count keep)"), "100");
    assert_eq!(eval_in(&mut interp, "(nth keep 99)"), "99");
}

#[test]
fn accounting_balances_after_collection() {
    let mut interp = new_interp();
    eval_in(&mut interp, "(doall (map list (range 500)))");
    eval_in(&mut interp, "(gc)");
    assert_eq!(
        interp.heap.free_count() + interp.heap.stats.live_cells,
        interp.heap.capacity()
    );
}

#[test]
fn heap_stats_shape() {
    let mut interp = new_interp();
    assert_eq!(eval_in(&mut interp, "(pos? (:capacity (heap-stats)))"), "true");
    eval_in(&mut interp, "(gc)");
    assert_eq!(eval_in(&mut interp, "(pos? (:collections (heap-stats)))"), "true");
}

#[test]
fn repeated_evaluation_is_stable_under_gc_pressure() {
    let mut interp = new_interp();
    eval_in(
        &mut interp,
        "(def fib (fn [n] (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))",
    );
    for _ in 0..5 {
        assert_eq!(eval_in(&mut interp, "(fib 15)"), "610");
        eval_in(&mut interp, "(gc)");
    }
}

#[test]
fn exhausting_a_capped_heap_reports_out_of_memory() {
    let mut interp = Interp::with_max_segments(2);
    loam_stdlib::install(&mut interp).expect("stdlib install");
    // Retain everything through the loop bindings so collection cannot help.
    let out = eval_in(
        &mut interp,
        "(loop [xs nil i 0] (if (< i 1000000) (recur (cons i xs) (inc i)) xs))",
    );
    assert!(out.contains("OutOfMemoryError"), "{out}");
    assert!(out.contains("out of memory"), "{out}");
}

#[test]
fn interpreter_still_works_after_oom() {
    let mut interp = Interp::with_max_segments(2);
    loam_stdlib::install(&mut interp).expect("stdlib install");
    let out = eval_in(
        &mut interp,
        "(loop [xs nil i 0] (if (< i 1000000) (recur (cons i xs) (inc i)) xs))",
    );
    assert!(out.contains("OutOfMemoryError"), "{out}");
    // The failed computation's garbage is reclaimable; small work proceeds.
    assert_eq!(eval_in(&mut interp, "(+ 1 2)"), "3");
}
