//! Tests for expression nodes and the tree registry

mod utils;

use cipheropt_core::compiler::bet::{Bet, ExprArena, NodeId, Operator, TreeKey};
use cipheropt_core::compiler::error::OptimizerError;
use cipheropt_core::compiler::ir::instruction::VarId;
use cipheropt_core::compiler::ir::types::{IrType, SecureTypes};
use proptest::prelude::*;
use utils::{int_leaf, var_leaf, Fixture, CIPHER, INT, PLAIN, SECRET};

#[test]
fn test_leaf_equality() {
    let mut arena = ExprArena::new();
    let x1 = var_leaf(&mut arena, 1, Some(INT));
    let x2 = var_leaf(&mut arena, 1, Some(SECRET));
    let y = var_leaf(&mut arena, 2, Some(INT));
    let three = int_leaf(&mut arena, 3);
    let other_three = int_leaf(&mut arena, 3);
    let four = int_leaf(&mut arena, 4);

    assert!(arena.structurally_equal(x1, x2));
    assert!(!arena.structurally_equal(x1, y));
    assert!(arena.structurally_equal(three, other_three));
    assert!(!arena.structurally_equal(three, four));
    assert!(!arena.structurally_equal(three, x1));
}

#[test]
fn test_leaf_never_equals_operation() {
    let mut arena = ExprArena::new();
    let a = var_leaf(&mut arena, 0, Some(INT));
    let b = var_leaf(&mut arena, 1, Some(INT));
    let sum = arena.operation(Operator::Add, a, Some(b));
    let lone = var_leaf(&mut arena, 0, Some(INT));

    assert!(!arena.structurally_equal(sum, lone));
    assert!(!arena.structurally_equal(lone, sum));
}

#[test]
fn test_only_commutative_operators_match_swapped() {
    let mut arena = ExprArena::new();
    let a = var_leaf(&mut arena, 0, Some(INT));
    let b = var_leaf(&mut arena, 1, Some(INT));
    let a2 = arena.copy(a);
    let b2 = arena.copy(b);

    let mul = arena.operation(Operator::Mul, a, Some(b));
    let swapped_mul = arena.operation(Operator::Mul, b2, Some(a2));
    assert!(arena.structurally_equal(mul, swapped_mul));

    let (a3, b3, a4, b4) = (arena.copy(a), arena.copy(b), arena.copy(a), arena.copy(b));
    let sub = arena.operation(Operator::Sub, a3, Some(b3));
    let swapped_sub = arena.operation(Operator::Sub, b4, Some(a4));
    assert!(!arena.structurally_equal(sub, swapped_sub));

    let (a5, b5) = (arena.copy(a), arena.copy(b));
    let add = arena.operation(Operator::Add, a5, Some(b5));
    assert!(!arena.structurally_equal(mul, add));
}

#[test]
fn test_consecutive_commutative() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let b = fixture.var("b", INT);
    let c = fixture.var("c", INT);
    let ab = fixture.add(a, b);
    let chain = fixture.add(ab, c);
    let ab2 = fixture.mul(a, b);
    let mixed = fixture.add(ab2, c);

    let chain = fixture.tree(chain);
    let mixed = fixture.tree(mixed);
    assert!(fixture.bet.arena.is_consecutive_commutative(chain));
    assert!(!fixture.bet.arena.is_consecutive_commutative(mixed));
}

#[test]
fn test_type_precedence() {
    let oracle = SecureTypes::new();
    let mut arena = ExprArena::new();

    let plain = var_leaf(&mut arena, 0, Some(PLAIN));
    let cipher = var_leaf(&mut arena, 1, Some(CIPHER));
    let both = arena.operation(Operator::Mul, plain, Some(cipher));
    assert_eq!(arena.realize_type(both, false, &oracle).unwrap(), IrType::new(CIPHER));

    let secret = var_leaf(&mut arena, 2, Some(SECRET));
    let plain2 = var_leaf(&mut arena, 3, Some(PLAIN));
    let mixed = arena.operation(Operator::Add, secret, Some(plain2));
    assert_eq!(arena.realize_type(mixed, false, &oracle).unwrap(), IrType::new(PLAIN));

    let int = var_leaf(&mut arena, 4, Some(INT));
    let secret2 = var_leaf(&mut arena, 5, Some(SECRET));
    let left_wins = arena.operation(Operator::Add, int, Some(secret2));
    assert_eq!(arena.realize_type(left_wins, false, &oracle).unwrap(), IrType::int());
}

#[test]
fn test_realized_type_is_memoized_until_forced() {
    let oracle = SecureTypes::new();
    let mut arena = ExprArena::new();
    let a = var_leaf(&mut arena, 0, Some(SECRET));
    let b = var_leaf(&mut arena, 1, Some(INT));
    let sum = arena.operation(Operator::Add, a, Some(b));
    assert_eq!(arena.realize_type(sum, false, &oracle).unwrap(), IrType::new(SECRET));

    let c = var_leaf(&mut arena, 2, Some(CIPHER));
    arena[sum].right = Some(c);
    assert_eq!(arena.realize_type(sum, false, &oracle).unwrap(), IrType::new(SECRET));
    assert_eq!(arena.realize_type(sum, true, &oracle).unwrap(), IrType::new(CIPHER));
}

#[test]
fn test_untypeable_leaf_fails_realization() {
    let oracle = SecureTypes::new();
    let mut arena = ExprArena::new();
    let untyped = var_leaf(&mut arena, 0, None);
    let typed = var_leaf(&mut arena, 1, Some(INT));
    let sum = arena.operation(Operator::Add, typed, Some(untyped));

    let err = arena.realize_type(untyped, false, &oracle).unwrap_err();
    assert!(matches!(err, OptimizerError::Type { .. }));
    let err = arena.realize_type(sum, false, &oracle).unwrap_err();
    assert!(matches!(err, OptimizerError::Type { .. }));
}

#[test]
fn test_registry_iterates_most_recent_first() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let b = fixture.var("b", INT);
    let first = fixture.tree(a);
    let second = fixture.tree(b);
    let sum = fixture.add(a, b);
    let third = fixture.tree(sum);

    let bet = &mut fixture.bet;
    bet.add_tree(TreeKey::Var(VarId(0)), first);
    bet.add_tree(TreeKey::NoVar, second);
    bet.add_tree(TreeKey::Return, third);

    let keys: Vec<TreeKey> = bet.trees().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![TreeKey::Return, TreeKey::NoVar, TreeKey::Var(VarId(0))]);

    // Re-registration replaces the tree and makes it the most recent one.
    bet.add_tree(TreeKey::Var(VarId(0)), second);
    let trees: Vec<(TreeKey, NodeId)> = bet.trees().collect();
    assert_eq!(trees[0], (TreeKey::Var(VarId(0)), second));
    assert_eq!(trees.len(), 3);

    let order: Vec<NodeId> = bet.nodes().collect();
    let mut expected = vec![second];
    expected.extend(bet.arena.preorder(third));
    expected.push(second);
    assert_eq!(order, expected);
    assert_eq!(bet.elements_count(), (1 + 3 + 1, 2));
}

#[test]
fn test_sentinel_keys() {
    assert_eq!(TreeKey::NoVar.as_i64(), -1);
    assert_eq!(TreeKey::Return.as_i64(), -2);
    assert_eq!(TreeKey::Var(VarId(7)).as_i64(), 7);
}

#[test]
fn test_expansion_substitutes_copies() {
    let mut fixture = Fixture::new();
    let a = fixture.var("a", INT);
    let b = fixture.var("b", INT);
    let y = fixture.declare("y", INT);

    let ab = fixture.mul(a, b);
    let y_tree = fixture.tree(ab);
    fixture.bet.add_tree(TreeKey::Var(y), y_tree);

    let y_read = fixture.read(y);
    let c = fixture.var("c", INT);
    let use_y = fixture.add(y_read, c);
    let root = fixture.tree(use_y);
    fixture.bet.expand_node(root);

    assert_eq!(fixture.display(root), "(__add__ (__mul__ $0 $1) $3)");
    let expanded_left = fixture.bet.arena[root].left.unwrap();
    assert_ne!(expanded_left, y_tree);
    assert!(fixture.bet.arena[root].expanded);

    // The registered tree is untouched by later rewrites of the copy.
    fixture.bet.arena[expanded_left].op = Some(Operator::Add);
    assert_eq!(fixture.display(y_tree), "(__mul__ $0 $1)");
}

#[test]
fn test_expansion_leaves_unregistered_variables() {
    let mut bet = Bet::new();
    let param = var_leaf(&mut bet.arena, 4, Some(SECRET));
    let one = int_leaf(&mut bet.arena, 1);
    let root = bet.arena.operation(Operator::Add, param, Some(one));
    bet.expand_node(root);

    assert_eq!(bet.arena.display(root).to_string(), "(__add__ $4 1)");
    assert!(bet.arena[param].expanded);
    assert!(bet.arena[one].expanded);
}

#[derive(Debug, Clone)]
enum Expr {
    Var(u32),
    Int(i64),
    Bin(u8, Box<Expr>, Box<Expr>),
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![(0u32..4).prop_map(Expr::Var), (0i64..3).prop_map(Expr::Int)];
    leaf.prop_recursive(4, 24, 2, |inner| {
        (0u8..3, inner.clone(), inner).prop_map(|(op, l, r)| Expr::Bin(op, Box::new(l), Box::new(r)))
    })
}

fn build(arena: &mut ExprArena, expr: &Expr) -> NodeId {
    match expr {
        Expr::Var(var) => var_leaf(arena, *var, Some(INT)),
        Expr::Int(value) => int_leaf(arena, *value),
        Expr::Bin(op, l, r) => {
            let op = [Operator::Add, Operator::Mul, Operator::Sub][*op as usize].clone();
            let l = build(arena, l);
            let r = build(arena, r);
            arena.operation(op, l, Some(r))
        }
    }
}

proptest! {
    #[test]
    fn test_commutative_operands_are_structurally_equal(x in expr_strategy(), y in expr_strategy(), mul in any::<bool>()) {
        let op = if mul { Operator::Mul } else { Operator::Add };
        let mut arena = ExprArena::new();
        let (x1, y1) = (build(&mut arena, &x), build(&mut arena, &y));
        let (x2, y2) = (build(&mut arena, &x), build(&mut arena, &y));
        let xy = arena.operation(op.clone(), x1, Some(y1));
        let yx = arena.operation(op, y2, Some(x2));

        prop_assert!(arena.structurally_equal(xy, yx));
        prop_assert!(arena.structurally_equal(yx, xy));
    }

    #[test]
    fn test_copy_is_structurally_equal(x in expr_strategy()) {
        let mut arena = ExprArena::new();
        let original = build(&mut arena, &x);
        let copy = arena.copy(original);

        prop_assert!(arena.structurally_equal(original, copy));
        prop_assert_eq!(arena.display(original).to_string(), arena.display(copy).to_string());
    }
}
