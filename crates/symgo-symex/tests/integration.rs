//! End-to-end tests for the symbolic executor.
//!
//! Each test parses a small goto-program from source, runs the engine, and
//! inspects the emitted equation stream.

use symgo_ir::{Context, ExprKind, Name};
use symgo_symex::{Engine, Equation, RunSummary, Step, SymexOptions};

/// Parse, execute, and hand back the equation plus the run summary.
fn run_with(source: &str, options: SymexOptions) -> (Equation, RunSummary) {
    let program = symgo_syntax::parse(source).unwrap_or_else(|e| panic!("parse error: {e}"));
    let ctx = Context::new();
    let mut equation = Equation::new(options.equation_config());
    let summary = {
        let mut engine = Engine::new(&program, &ctx, &options, &mut equation);
        engine
            .run(&Name::new("main"))
            .unwrap_or_else(|e| panic!("symex error: {e}"))
    };
    (equation, summary)
}

fn run(source: &str) -> (Equation, RunSummary) {
    run_with(source, SymexOptions::default())
}

/// The (identifier, l1, l2) triple of an assignment's left-hand side.
fn lhs_triple(step: &Step) -> Option<(String, u32, u32)> {
    match step {
        Step::Assignment { lhs, .. } => {
            let sym = lhs.as_symbol()?;
            Some((sym.name.as_str().to_string(), sym.l1, sym.l2))
        }
        _ => None,
    }
}

// ============================================================================
// S1: straight-line assignment
// ============================================================================

#[test]
fn straight_line_assignments_in_ssa_order() {
    let (eq, summary) = run(
        r#"
        fn main() {
          decl x : i32
          x := 1
          x := x + 1
          assert x == 2, "x is two"
        }
        "#,
    );
    assert!(!summary.aborted);

    let assignments: Vec<_> = eq.visible_assignments().collect();
    assert_eq!(assignments.len(), 2);

    // x#1 := 1
    let (name, _, l2) = lhs_triple(assignments[0]).unwrap();
    assert_eq!(name, "main::x");
    assert_eq!(l2, 1);
    match assignments[0] {
        Step::Assignment { guard, rhs, .. } => {
            assert!(guard.is_true());
            assert_eq!(rhs.as_int_const(), Some(1));
        }
        _ => unreachable!(),
    }

    // x#2 := x#1 + 1, not constant-folded.
    let (_, _, l2) = lhs_triple(assignments[1]).unwrap();
    assert_eq!(l2, 2);
    match assignments[1] {
        Step::Assignment { rhs, .. } => {
            assert!(matches!(rhs.kind, ExprKind::Binary { .. }));
        }
        _ => unreachable!(),
    }

    // One assertion under the true guard, over the final SSA name.
    let assertions: Vec<_> = eq.assertions().collect();
    assert_eq!(assertions.len(), 1);
    match assertions[0] {
        Step::Assertion {
            guard,
            cond,
            message,
            ..
        } => {
            assert!(guard.is_true());
            assert_eq!(message, "x is two");
            let mut l2_seen = None;
            cond.each_symbol(&mut |sym| l2_seen = Some(sym.l2));
            assert_eq!(l2_seen, Some(2));
        }
        _ => unreachable!(),
    }
}

#[test]
fn ssa_lhs_triples_are_fresh() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl c : bool
          decl x : i32
          c := nondet(bool)
          x := 0
          goto else if !c
          x := 1
          goto join
        else:
          x := 2
        join:
          assert x <= 2
        }
        "#,
    );

    let mut seen = std::collections::HashSet::new();
    for step in eq.steps() {
        if let Some(triple) = lhs_triple(step) {
            assert!(seen.insert(triple.clone()), "duplicate SSA lhs {:?}", triple);
        }
    }
}

// ============================================================================
// S2: if-else merge
// ============================================================================

#[test]
fn if_else_merges_with_phi() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl c : bool
          decl x : i32
          c := nondet(bool)
          goto else if !c
          x := 1
          goto join
        else:
          x := 2
        join:
          assert x >= 1
        }
        "#,
    );

    // A hidden phi assignment with an if-then-else right-hand side exists.
    let phi = eq.steps().iter().find(|s| match s {
        Step::Assignment { rhs, .. } if s.is_hidden() => {
            matches!(rhs.kind, ExprKind::If { .. })
        }
        _ => false,
    });
    assert!(phi.is_some(), "no phi assignment found:\n{eq}");

    // The post-merge guard is true again: the two sides cancel.
    let assertion = eq.assertions().next().expect("assertion recorded");
    match assertion {
        Step::Assertion { guard, .. } => assert!(guard.is_true(), "guard: {guard}"),
        _ => unreachable!(),
    }

    // Branch-side assignments carry complementary guards.
    let guards: Vec<String> = eq
        .visible_assignments()
        .filter_map(|s| match s {
            Step::Assignment { guard, rhs, .. } if rhs.as_int_const().is_some() => {
                Some(guard.to_string())
            }
            _ => None,
        })
        .collect();
    assert_eq!(guards.len(), 2);
    assert_ne!(guards[0], guards[1]);
}

// ============================================================================
// S3 / S4: bounded loops
// ============================================================================

const LOOP_PROGRAM: &str = r#"
    fn main() {
      decl i : i32
      i := 0
    loop:
      goto done if !(i < 3)
      i := i + 1
      goto loop
    done:
      assert i == 3, "i reaches three"
    }
"#;

#[test]
fn loop_emits_three_iterations_at_bound_three() {
    let options = SymexOptions {
        max_unwind: 3,
        ..Default::default()
    };
    let (eq, _) = run_with(LOOP_PROGRAM, options);

    // Three body iterations before the bound cuts the loop.
    let increments = eq
        .visible_assignments()
        .filter(|s| matches!(s, Step::Assignment { rhs, .. } if matches!(rhs.kind, ExprKind::Binary { .. })))
        .count();
    assert_eq!(increments, 3);

    // The path continues past the bound: the user assertion is recorded,
    // under the disjunctive post-merge guard rather than plain true.
    let user = eq
        .assertions()
        .find(|s| matches!(s, Step::Assertion { message, .. } if message == "i reaches three"))
        .expect("final assertion recorded");
    match user {
        Step::Assertion { guard, .. } => assert!(!guard.is_true()),
        _ => unreachable!(),
    }
}

#[test]
fn loop_bound_emits_unwinding_claim() {
    let options = SymexOptions {
        max_unwind: 3,
        ..Default::default()
    };
    let (eq, _) = run_with(LOOP_PROGRAM, options);

    let unwinding: Vec<_> = eq
        .assertions()
        .filter(|s| matches!(s, Step::Assertion { message, .. } if message == "unwinding assertion loop 0"))
        .collect();
    assert_eq!(unwinding.len(), 1, "equation:\n{eq}");
}

#[test]
fn base_case_replaces_claim_with_assumption() {
    let options = SymexOptions {
        max_unwind: 3,
        base_case: true,
        ..Default::default()
    };
    let (eq, _) = run_with(LOOP_PROGRAM, options);

    assert!(eq
        .assertions()
        .all(|s| !matches!(s, Step::Assertion { message, .. } if message.starts_with("unwinding"))));
    let assumptions = eq
        .steps()
        .iter()
        .filter(|s| matches!(s, Step::Assumption { .. }))
        .count();
    assert!(assumptions >= 1, "expected an unwinding assumption:\n{eq}");
}

#[test]
fn partial_loops_keeps_the_path_alive() {
    let options = SymexOptions {
        max_unwind: 3,
        partial_loops: true,
        no_unwinding_assertions: true,
        ..Default::default()
    };
    let (eq, _) = run_with(LOOP_PROGRAM, options);

    // An unwinding assumption is recorded instead of a claim, and the final
    // user assertion is still reached.
    assert!(eq
        .assertions()
        .all(|s| !matches!(s, Step::Assertion { message, .. } if message.starts_with("unwinding"))));
    assert!(eq
        .steps()
        .iter()
        .any(|s| matches!(s, Step::Assumption { .. })));
    assert!(eq
        .assertions()
        .any(|s| matches!(s, Step::Assertion { message, .. } if message == "i reaches three")));
}

#[test]
fn unwindset_overrides_global_bound() {
    let mut options = SymexOptions {
        max_unwind: 1,
        ..Default::default()
    };
    options.unwind_set = SymexOptions::parse_unwind_set("0=4").unwrap();
    let (eq, _) = run_with(LOOP_PROGRAM, options);

    // Loop 0 runs to its own bound of 4 despite the global bound of 1.
    let increments = eq
        .visible_assignments()
        .filter(|s| matches!(s, Step::Assignment { rhs, .. } if matches!(rhs.kind, ExprKind::Binary { .. })))
        .count();
    assert_eq!(increments, 4);
}

#[test]
fn assume_all_states_marks_back_edges() {
    let options = SymexOptions {
        max_unwind: 2,
        assume_all_states: true,
        no_unwinding_assertions: true,
        ..Default::default()
    };
    let (eq, _) = run_with(LOOP_PROGRAM, options);

    // One wide assumption per back-edge visit, plus the unwinding assumption
    // at the bound.
    let assumptions = eq
        .steps()
        .iter()
        .filter(|s| matches!(s, Step::Assumption { .. }))
        .count();
    assert!(assumptions >= 2, "equation:\n{eq}");
}

#[test]
fn conflicting_modes_fail_at_run() {
    let program = symgo_syntax::parse("fn main() { skip }").unwrap();
    let ctx = Context::new();
    let options = SymexOptions {
        base_case: true,
        forward_condition: true,
        ..Default::default()
    };
    let mut equation = Equation::new(options.equation_config());
    let mut engine = Engine::new(&program, &ctx, &options, &mut equation);
    assert!(engine.run(&Name::new("main")).is_err());
}

// ============================================================================
// S5: pointer dereference over two targets
// ============================================================================

#[test]
fn deref_store_expands_over_value_set() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl a : i32
          decl b : i32
          decl p : ptr<i32>
          decl c : bool
          c := nondet(bool)
          goto else if !c
          p := &a
          goto join
        else:
          p := &b
        join:
          *p := 7
        }
        "#,
    );

    // The single store became guarded assignments to both candidates.
    let stores: Vec<_> = eq
        .visible_assignments()
        .filter_map(|s| lhs_triple(s))
        .filter(|(name, _, _)| name == "main::a" || name == "main::b")
        .collect();
    assert_eq!(stores.len(), 2, "equation:\n{eq}");

    // Each candidate assignment selects with same-object on its own side.
    let ites = eq
        .visible_assignments()
        .filter(|s| matches!(s, Step::Assignment { rhs, .. } if matches!(rhs.kind, ExprKind::If { .. })))
        .count();
    assert_eq!(ites, 2);

    // And the dereference produced a validity claim.
    assert!(eq
        .assertions()
        .any(|s| matches!(s, Step::Assertion { message, .. } if message.contains("dereference"))));
}

// ============================================================================
// S6: function call and return
// ============================================================================

#[test]
fn call_pushes_fresh_activation_and_returns_value() {
    let (eq, _) = run(
        r#"
        fn f(x : i32) -> i32 {
          return x + 1
        }
        fn main() {
          decl y : i32
          call y := f(3)
          assert y == 4
        }
        "#,
    );

    // Parameter binding in a fresh activation.
    let param = eq
        .visible_assignments()
        .filter_map(|s| lhs_triple(s))
        .find(|(name, _, _)| name == "f::x")
        .expect("parameter assignment recorded");
    assert!(param.1 > 1, "callee activation is fresh, got {:?}", param);

    // The return value lands in the caller's receptacle.
    let receptacle = eq
        .visible_assignments()
        .filter_map(|s| lhs_triple(s))
        .find(|(name, _, _)| name == "main::y");
    assert!(receptacle.is_some(), "equation:\n{eq}");

    // The receptacle's value flows from the callee's return symbol.
    let y_step = eq
        .visible_assignments()
        .find(|s| matches!(lhs_triple(s), Some((name, _, _)) if name == "main::y"))
        .unwrap();
    match y_step {
        Step::Assignment { rhs, .. } => {
            let mut names = Vec::new();
            rhs.each_symbol(&mut |sym| names.push(sym.name.as_str().to_string()));
            assert!(names.iter().any(|n| n.contains("#return_value")));
        }
        _ => unreachable!(),
    }
}

#[test]
fn recursion_distinguishes_activations() {
    let options = SymexOptions {
        max_unwind: 3,
        ..Default::default()
    };
    let (eq, _) = run_with(
        r#"
        fn dec(n : i32) -> i32 {
          decl r : i32
          goto base if n <= 0
          call r := dec(n - 1)
          return r
        base:
          return 0
        }
        fn main() {
          decl y : i32
          call y := dec(2)
        }
        "#,
        options,
    );

    // Each recursive call binds n in its own activation.
    let mut activations: Vec<u32> = eq
        .visible_assignments()
        .filter_map(|s| lhs_triple(s))
        .filter(|(name, _, _)| name == "dec::n")
        .map(|(_, l1, _)| l1)
        .collect();
    activations.dedup();
    assert!(
        activations.len() >= 2,
        "expected distinct activations, got {:?}",
        activations
    );
}

// ============================================================================
// Atomic sections, output, abort
// ============================================================================

#[test]
fn atomic_markers_and_output_are_recorded_in_order() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl x : i32
          atomic_begin
          x := 1
          output x
          atomic_end
        }
        "#,
    );

    let kinds: Vec<&str> = eq
        .steps()
        .iter()
        .map(|s| match s {
            Step::AtomicBegin { .. } => "begin",
            Step::AtomicEnd { .. } => "end",
            Step::Assignment { .. } => "assign",
            Step::Output { .. } => "output",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["begin", "assign", "output", "end"]);
}

#[test]
fn abort_predicate_stops_the_run() {
    let program = symgo_syntax::parse(
        r#"
        fn main() {
          decl i : i32
          i := 0
        loop:
          goto done if !(i < 100)
          i := i + 1
          goto loop
        done:
          skip
        }
        "#,
    )
    .unwrap();
    let ctx = Context::new();
    let options = SymexOptions::default();
    let mut equation = Equation::new(options.equation_config());

    let calls = std::cell::Cell::new(0u32);
    let summary = {
        let mut engine = Engine::new(&program, &ctx, &options, &mut equation)
            .with_abort(|| {
                calls.set(calls.get() + 1);
                calls.get() > 10
            });
        engine.run(&Name::new("main")).unwrap()
    };

    assert!(summary.aborted);
    assert!(summary.steps > 0);
    // The sink up to the abort point remains usable.
    for step in equation.steps() {
        let _ = step.to_string();
    }
}

// ============================================================================
// Assumptions and dead paths
// ============================================================================

#[test]
fn false_assumption_kills_the_path() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl x : i32
          x := 1
          assume false
          assert x == 99, "unreachable"
        }
        "#,
    );

    // The path dies at the false assumption; the later claim is never
    // recorded.
    assert_eq!(eq.assertions().count(), 0);
}

#[test]
fn symbolic_assumption_is_recorded() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl x : i32
          x := nondet(i32)
          assume x > 0
          assert x >= 1
        }
        "#,
    );

    assert!(eq
        .steps()
        .iter()
        .any(|s| matches!(s, Step::Assumption { .. })));
    assert_eq!(eq.assertions().count(), 1);
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn throw_dispatches_to_installed_handler() {
    let (eq, _) = run(
        r#"
        fn main() {
          decl x : i32
          catch overflow -> handler
          x := 1
          throw overflow
          x := 2
        handler:
          assert x == 1, "handler sees pre-throw state"
        }
        "#,
    );

    // The handler-side assertion is live again after the merge, while the
    // x := 2 after the throw ran only on the dead fall-through.
    let assertion = eq.assertions().next().expect("handler assertion");
    match assertion {
        Step::Assertion { guard, .. } => assert!(guard.is_true(), "equation:\n{eq}"),
        _ => unreachable!(),
    }
    let dead_store = eq
        .visible_assignments()
        .find(|s| matches!(s, Step::Assignment { rhs, .. } if rhs.as_int_const() == Some(2)))
        .expect("fall-through store recorded");
    match dead_store {
        Step::Assignment { guard, .. } => assert!(guard.is_false()),
        _ => unreachable!(),
    }
}

#[test]
fn unhandled_throw_records_a_claim() {
    let (eq, _) = run(
        r#"
        fn main() {
          throw overflow
        }
        "#,
    );

    assert!(eq
        .assertions()
        .any(|s| matches!(s, Step::Assertion { message, .. } if message.contains("unhandled exception"))));
}
