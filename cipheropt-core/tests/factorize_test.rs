//! Tests for common-factor extraction

mod utils;

use cipheropt_core::compiler::bet::{ExprArena, Operator};
use cipheropt_core::compiler::error::OptimizerError;
use cipheropt_core::compiler::ir::instruction::{ValueId, VarId};
use proptest::prelude::*;
use utils::{evaluate, var_leaf, Fixture, INT, SECRET};

#[test]
fn test_two_term_factorization() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", SECRET);
    let b = fixture.var("b", INT);
    let ax = fixture.mul(a, x);
    let bx = fixture.mul(b, x);
    let sum = fixture.add(ax, bx);
    let root = fixture.tree(sum);
    assert_eq!(fixture.bet.arena.count_ops(root, &Operator::Mul), 2);

    assert!(fixture.bet.reduce_all(root).unwrap());

    assert_eq!(fixture.bet.arena.count_ops(root, &Operator::Mul), 1);
    assert_eq!(fixture.display(root), "(__mul__ $1 (__add__ $2 $0))");

    // Expected shape: (a + b) * x
    let arena = &mut fixture.bet.arena;
    let (ea, eb, ex) = (var_leaf(arena, 0, Some(INT)), var_leaf(arena, 2, Some(INT)), var_leaf(arena, 1, Some(SECRET)));
    let expected_sum = arena.operation(Operator::Add, ea, Some(eb));
    let expected = arena.operation(Operator::Mul, expected_sum, Some(ex));
    assert!(fixture.equal(root, expected));
}

#[test]
fn test_factorization_types_are_realized() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", SECRET);
    let b = fixture.var("b", INT);
    let ax = fixture.mul(a, x);
    let bx = fixture.mul(b, x);
    let sum = fixture.add(ax, bx);
    let root = fixture.tree(sum);

    fixture.bet.reduce_all(root).unwrap();

    // x * (b + a): the left operand decides between non-ciphertensor types.
    let realized = fixture.bet.arena[root].ty.clone().unwrap();
    assert_eq!(realized.name(), SECRET);
    let inner = fixture.bet.arena[root].right.unwrap();
    assert_eq!(fixture.bet.arena[inner].ty.clone().unwrap().name(), INT);
}

#[test]
fn test_factorization_inside_larger_sum() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", INT);
    let b = fixture.var("b", INT);
    let c = fixture.var("c", INT);
    let ax = fixture.mul(a, x);
    let bx = fixture.mul(b, x);
    let terms = fixture.add(ax, bx);
    let sum = fixture.add(terms, c);
    let root = fixture.tree(sum);

    assert!(fixture.bet.reduce_all(root).unwrap());

    let arena = &fixture.bet.arena;
    assert_eq!(arena.count_ops(root, &Operator::Mul), 1);
    assert_eq!(arena.count_ops(root, &Operator::Add), 2);
    assert_eq!(fixture.display(root), "(__add__ (__mul__ $1 (__add__ $2 $0)) $3)");
}

#[test]
fn test_factorization_across_nested_sums() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", INT);
    let c = fixture.var("c", INT);
    let b = fixture.var("b", INT);
    let ax = fixture.mul(a, x);
    let bx = fixture.mul(b, x);
    let tail = fixture.add(c, bx);
    let sum = fixture.add(ax, tail);
    let root = fixture.tree(sum);

    assert!(fixture.bet.reduce_all(root).unwrap());

    // The outer addition collapses onto the inner one, which now holds the product.
    assert_eq!(fixture.display(root), "(__add__ $2 (__mul__ $1 (__add__ $3 $0)))");
}

#[test]
fn test_factor_found_deep_in_product_chain() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let b = fixture.var("b", INT);
    let x = fixture.var("x", INT);
    let c = fixture.var("c", INT);
    let ab = fixture.mul(a, b);
    let abx = fixture.mul(ab, x);
    let cx = fixture.mul(c, x);
    let sum = fixture.add(abx, cx);
    let root = fixture.tree(sum);
    let muls_before = fixture.bet.arena.count_ops(root, &Operator::Mul);

    assert!(fixture.bet.reduce_all(root).unwrap());

    assert_eq!(fixture.bet.arena.count_ops(root, &Operator::Mul), muls_before - 1);
    assert_eq!(fixture.display(root), "(__mul__ $2 (__add__ $3 (__mul__ $0 $1)))");
}

#[test]
fn test_repeated_factor_in_one_chain_is_not_a_pair() {
    let mut fixture = Fixture::new();
    let x = fixture.var("x", INT);
    let y = fixture.var("y", INT);
    let xx = fixture.mul(x, x);
    let sum = fixture.add(xx, y);
    let root = fixture.tree(sum);

    assert_eq!(fixture.bet.find_factors(root).unwrap(), None);
    assert!(!fixture.bet.reduce_all(root).unwrap());
    assert_eq!(fixture.display(root), "(__add__ (__mul__ $0 $0) $1)");
}

#[test]
fn test_no_common_factor_leaves_tree_unchanged() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", INT);
    let b = fixture.var("b", INT);
    let y = fixture.var("y", INT);
    let ax = fixture.mul(a, x);
    let by = fixture.mul(b, y);
    let sum = fixture.add(ax, by);
    let root = fixture.tree(sum);
    let before = fixture.display(root);

    assert!(!fixture.bet.reduce_all(root).unwrap());
    assert!(!fixture.bet.reduce_lvl(root).unwrap());
    assert_eq!(fixture.display(root), before);
}

#[test]
fn test_find_factors_reports_matching_pair() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", INT);
    let b = fixture.var("b", INT);
    let ax = fixture.mul(a, x);
    let bx = fixture.mul(b, x);
    let sum = fixture.add(ax, bx);
    let root = fixture.tree(sum);

    let (later, earlier) = fixture.bet.find_factors(root).unwrap().unwrap();
    assert_ne!(later, earlier);
    assert!(fixture.equal(later, earlier));
    assert_eq!(fixture.display(later), "$1");
}

#[test]
fn test_find_factors_requires_addition() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", INT);
    let ax = fixture.mul(a, x);
    let root = fixture.tree(ax);

    let err = fixture.bet.find_factors(root).unwrap_err();
    assert!(matches!(err, OptimizerError::Constraint { .. }));
}

#[test]
fn test_reduce_descends_through_other_operators() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let x = fixture.var("x", INT);
    let b = fixture.var("b", INT);
    let d = fixture.var("d", INT);
    let ax = fixture.mul(a, x);
    let bx = fixture.mul(b, x);
    let sum = fixture.add(ax, bx);
    let scaled = fixture.op("__sub__", d, sum);
    let root = fixture.tree(scaled);

    assert!(fixture.bet.reduce_all(root).unwrap());
    assert_eq!(fixture.display(root), "(__sub__ $3 (__mul__ $1 (__add__ $2 $0)))");
}

#[test]
fn test_constant_factors_match() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let b = fixture.var("b", INT);
    let two = fixture.int(2);
    let other_two = fixture.int(2);
    let a2 = fixture.mul(a, two);
    let b2 = fixture.mul(b, other_two);
    let sum = fixture.add(a2, b2);
    let root = fixture.tree(sum);

    assert!(fixture.bet.reduce_all(root).unwrap());
    assert_eq!(fixture.display(root), "(__mul__ 2 (__add__ $1 $0))");
}

#[test]
fn test_opaque_factors_never_match() {
    let mut arena = ExprArena::new();
    let a = arena.leaf(None);
    let b = arena.leaf(None);
    assert!(!arena.structurally_equal(a, b));
}

/// Random sum of products over a small pool of variables and constants, so that
/// common factors show up often.
#[derive(Debug, Clone)]
enum Term {
    Var(u32),
    Const(i64),
    Add(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
}

const POOL: [(&str, &str); 4] = [("x", SECRET), ("y", SECRET), ("a", INT), ("b", INT)];

fn term_strategy() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        (0..POOL.len() as u32).prop_map(Term::Var),
        (1i64..4).prop_map(Term::Const),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Term::Add(Box::new(l), Box::new(r))),
            (inner.clone(), inner).prop_map(|(l, r)| Term::Mul(Box::new(l), Box::new(r))),
        ]
    })
}

fn build(fixture: &mut Fixture, term: &Term) -> ValueId {
    match term {
        Term::Var(var) => fixture.read(VarId(*var)),
        Term::Const(v) => fixture.int(*v),
        Term::Add(left, right) => {
            let (left, right) = (build(fixture, left), build(fixture, right));
            fixture.add(left, right)
        }
        Term::Mul(left, right) => {
            let (left, right) = (build(fixture, left), build(fixture, right));
            fixture.mul(left, right)
        }
    }
}

proptest! {
    #[test]
    fn test_factorization_preserves_value(
        term in term_strategy(),
        env in prop::collection::vec(any::<i64>(), POOL.len()),
    ) {
        let mut fixture = Fixture::new();
        for (name, ty) in POOL {
            fixture.declare(name, ty);
        }
        let value = build(&mut fixture, &term);
        let root = fixture.tree(value);
        let before = evaluate(&fixture.bet.arena, root, &env);
        let muls_before = fixture.bet.arena.count_ops(root, &Operator::Mul);
        prop_assert!(before.is_some());

        let reduced = fixture.bet.reduce_all(root).unwrap();

        prop_assert_eq!(evaluate(&fixture.bet.arena, root, &env), before);
        let muls_after = fixture.bet.arena.count_ops(root, &Operator::Mul);
        if reduced {
            prop_assert!(muls_after < muls_before);
        } else {
            prop_assert_eq!(muls_after, muls_before);
        }
    }
}
