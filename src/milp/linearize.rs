//! Big-M linearization primitives
//!
//! Each "M" is taken from the interval of the expression being guarded
//! rather than from a global constant, so every encoding is as tight as the
//! variable bounds allow. All compared expressions are integral (values are
//! encoded in integer units), which is what makes strict comparisons exact.

use super::{Interval, LinExpr, MilpModel, Sense, VarId, VarKind};
use crate::ast::CompareOp;

/// A 0/1 quantity: folded to a constant when bounds decide it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Known value
    Const(bool),
    /// The binary variable itself
    Var(VarId),
    /// One minus the binary variable
    Not(VarId),
}

impl Indicator {
    /// The indicator as a linear expression over its variable
    pub fn expr(&self) -> LinExpr {
        match *self {
            Indicator::Const(b) => LinExpr::constant(if b { 1.0 } else { 0.0 }),
            Indicator::Var(v) => LinExpr::var(v),
            Indicator::Not(v) => LinExpr::constant(1.0) - LinExpr::var(v),
        }
    }

    /// Returns the value if the indicator is a constant
    pub fn as_const(&self) -> Option<bool> {
        match *self {
            Indicator::Const(b) => Some(b),
            _ => None,
        }
    }

    /// Reads the indicator from a solver assignment
    pub fn value(&self, assignment: &[f64]) -> bool {
        self.expr().evaluate(assignment) > 0.5
    }

    /// Logical negation
    pub fn not(self) -> Indicator {
        match self {
            Indicator::Const(b) => Indicator::Const(!b),
            Indicator::Var(v) => Indicator::Not(v),
            Indicator::Not(v) => Indicator::Var(v),
        }
    }
}

/// Indicator of `d ≤ 0` for an integral expression `d`
///
/// With `d ∈ [L, U]`, a binary `z` satisfies `d ≤ U(1 − z)` and
/// `d ≥ 1 − (1 − L)z`: `z = 1` forces `d ≤ 0`, `z = 0` forces `d ≥ 1`.
pub fn non_positive(model: &mut MilpModel, name: &str, d: &LinExpr) -> Indicator {
    let Interval { lo, hi } = model.interval(d);
    if hi <= 0.0 {
        return Indicator::Const(true);
    }
    if lo >= 1.0 {
        return Indicator::Const(false);
    }
    let z = model.add_binary(name);
    model.constrain(
        format!("{name}_on"),
        d.clone() + LinExpr::term(z, hi),
        Sense::Le,
        LinExpr::constant(hi),
    );
    model.constrain(
        format!("{name}_off"),
        d.clone() + LinExpr::term(z, 1.0 - lo),
        Sense::Ge,
        LinExpr::constant(1.0),
    );
    Indicator::Var(z)
}

/// Indicator of `lhs op rhs` for integral operands
pub fn compare(
    model: &mut MilpModel,
    name: &str,
    lhs: &LinExpr,
    op: CompareOp,
    rhs: &LinExpr,
) -> Indicator {
    let one = LinExpr::constant(1.0);
    match op {
        CompareOp::Le => non_positive(model, name, &(lhs.clone() - rhs.clone())),
        CompareOp::Lt => non_positive(model, name, &(lhs.clone() - rhs.clone() + one)),
        CompareOp::Ge => non_positive(model, name, &(rhs.clone() - lhs.clone())),
        CompareOp::Gt => non_positive(model, name, &(rhs.clone() - lhs.clone() + one)),
        CompareOp::Eq => equal(model, name, lhs, rhs),
        CompareOp::Ne => equal(model, name, lhs, rhs).not(),
    }
}

fn equal(model: &mut MilpModel, name: &str, lhs: &LinExpr, rhs: &LinExpr) -> Indicator {
    let le = non_positive(model, &format!("{name}_le"), &(lhs.clone() - rhs.clone()));
    let ge = non_positive(model, &format!("{name}_ge"), &(rhs.clone() - lhs.clone()));
    conjunction(model, name, &[le.expr(), ge.expr()])
}

/// Indicator of the conjunction of 0/1-valued expressions
///
/// Constant inputs are folded; a single remaining plain variable is reused.
/// Otherwise `z ≤ eᵢ` for every input and `z ≥ Σeᵢ − (k − 1)`.
pub fn conjunction(model: &mut MilpModel, name: &str, inputs: &[LinExpr]) -> Indicator {
    let mut open: Vec<&LinExpr> = Vec::with_capacity(inputs.len());
    for e in inputs {
        if e.is_constant() {
            if e.constant_part() < 0.5 {
                return Indicator::Const(false);
            }
        } else {
            open.push(e);
        }
    }
    match open.as_slice() {
        [] => return Indicator::Const(true),
        [single] => {
            if let Some(v) = single.as_var() {
                return Indicator::Var(v);
            }
        }
        _ => {}
    }

    let z = model.add_binary(name);
    let mut sum = LinExpr::default();
    for (i, e) in open.iter().enumerate() {
        model.constrain(
            format!("{name}_le{i}"),
            LinExpr::var(z),
            Sense::Le,
            (*e).clone(),
        );
        sum = sum + (*e).clone();
    }
    model.constrain(
        format!("{name}_ge"),
        LinExpr::var(z),
        Sense::Ge,
        sum - LinExpr::constant(open.len() as f64 - 1.0),
    );
    Indicator::Var(z)
}

/// Continuous `u = x·μ` for a 0/1 expression `x` and bounded `μ`
///
/// When `x = 1`, `u = μ` and `u` must lie in `selected`; when `x = 0`, `u = 0`.
/// The envelope is `L·x ≤ u ≤ U·x` over `selected = [L, U]` and
/// `μ − Mₕ(1 − x) ≤ u ≤ μ − Mₗ(1 − x)` over the interval `[Mₗ, Mₕ]` of `μ`.
pub fn product(
    model: &mut MilpModel,
    name: &str,
    x: &LinExpr,
    mu: &LinExpr,
    selected: Interval,
) -> VarId {
    let range = model.interval(mu);
    let u = model.add_variable(
        name,
        VarKind::Continuous,
        selected.lo.min(0.0),
        selected.hi.max(0.0),
    );
    let u_expr = LinExpr::var(u);
    let not_x = LinExpr::constant(1.0) - x.clone();

    model.constrain(
        format!("{name}_lo"),
        u_expr.clone(),
        Sense::Ge,
        x.clone() * selected.lo,
    );
    model.constrain(
        format!("{name}_hi"),
        u_expr.clone(),
        Sense::Le,
        x.clone() * selected.hi,
    );
    model.constrain(
        format!("{name}_env_hi"),
        u_expr.clone(),
        Sense::Le,
        mu.clone() - not_x.clone() * range.lo,
    );
    model.constrain(
        format!("{name}_env_lo"),
        u_expr,
        Sense::Ge,
        mu.clone() - not_x * range.hi,
    );
    u
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feasible(model: &MilpModel, assignment: &[f64]) -> bool {
        model.check(assignment, 1e-9).is_ok()
    }

    #[test]
    fn comparison_folds_decided_bounds() {
        let mut model = MilpModel::new();
        let five = LinExpr::constant(5.0);
        let seven = LinExpr::constant(7.0);
        assert_eq!(compare(&mut model, "a", &five, CompareOp::Lt, &seven), Indicator::Const(true));
        assert_eq!(compare(&mut model, "b", &five, CompareOp::Ge, &seven), Indicator::Const(false));
        assert_eq!(compare(&mut model, "c", &five, CompareOp::Eq, &five), Indicator::Const(true));
        assert_eq!(compare(&mut model, "d", &five, CompareOp::Ne, &five), Indicator::Const(false));
        assert_eq!(model.num_variables(), 0);
    }

    #[test]
    fn non_positive_is_exact_on_integers() {
        let mut model = MilpModel::new();
        let x = model.add_variable("x", VarKind::Integer, 0.0, 10.0);
        // z ⇔ x ≤ 4
        let z = match compare(
            &mut model,
            "z",
            &LinExpr::var(x),
            CompareOp::Le,
            &LinExpr::constant(4.0),
        ) {
            Indicator::Var(z) => z,
            other => panic!("expected a variable, got {other:?}"),
        };
        for value in 0..=10 {
            let truth = if value <= 4 { 1.0 } else { 0.0 };
            let mut assignment = vec![0.0; model.num_variables()];
            assignment[x.index()] = f64::from(value);
            assignment[z.index()] = truth;
            assert!(feasible(&model, &assignment), "x={value} z={truth}");
            assignment[z.index()] = 1.0 - truth;
            assert!(!feasible(&model, &assignment), "x={value} z={}", 1.0 - truth);
        }
    }

    #[test]
    fn equality_needs_both_sides() {
        let mut model = MilpModel::new();
        let x = model.add_variable("x", VarKind::Integer, 0.0, 3.0);
        let ind = compare(
            &mut model,
            "eq",
            &LinExpr::var(x),
            CompareOp::Eq,
            &LinExpr::constant(2.0),
        );
        let Indicator::Var(z) = ind else {
            panic!("expected a variable, got {ind:?}");
        };
        // exhaustive over x and all auxiliary binaries
        let aux: Vec<usize> = (0..model.num_variables()).filter(|&i| i != x.index()).collect();
        for value in 0..=3 {
            let mut seen = Vec::new();
            for mask in 0..(1u32 << aux.len()) {
                let mut assignment = vec![0.0; model.num_variables()];
                assignment[x.index()] = f64::from(value);
                for (bit, &i) in aux.iter().enumerate() {
                    assignment[i] = f64::from((mask >> bit) & 1);
                }
                if feasible(&model, &assignment) {
                    seen.push(assignment[z.index()]);
                }
            }
            let expected = if value == 2 { 1.0 } else { 0.0 };
            assert!(!seen.is_empty());
            assert!(seen.iter().all(|&s| s == expected), "x={value} saw {seen:?}");
        }
    }

    #[test]
    fn conjunction_folds_constants_and_reuses_single_var() {
        let mut model = MilpModel::new();
        let a = model.add_binary("a");
        let one = LinExpr::constant(1.0);
        let zero = LinExpr::constant(0.0);
        assert_eq!(conjunction(&mut model, "f", &[one.clone(), zero]), Indicator::Const(false));
        assert_eq!(conjunction(&mut model, "t", &[one.clone()]), Indicator::Const(true));
        assert_eq!(conjunction(&mut model, "s", &[one, LinExpr::var(a)]), Indicator::Var(a));
        assert_eq!(model.num_variables(), 1);
    }

    #[test]
    fn product_envelope_is_exact_for_binary_selector() {
        let mut model = MilpModel::new();
        let x = model.add_binary("x");
        let mu = model.add_variable("mu", VarKind::Integer, -5.0, 20.0);
        let u = product(
            &mut model,
            "u",
            &LinExpr::var(x),
            &LinExpr::var(mu),
            Interval::new(0.0, 10.0),
        );
        let check = |xv: f64, muv: f64, uv: f64| {
            let mut assignment = vec![0.0; 3];
            assignment[x.index()] = xv;
            assignment[mu.index()] = muv;
            assignment[u.index()] = uv;
            model.check(&assignment, 1e-9).is_ok()
        };
        assert!(check(1.0, 7.0, 7.0));
        assert!(!check(1.0, 7.0, 6.0));
        // selected values must fall inside [0, 10]
        assert!(!check(1.0, 15.0, 15.0));
        assert!(!check(1.0, -3.0, -3.0));
        assert!(check(0.0, 15.0, 0.0));
        assert!(check(0.0, -5.0, 0.0));
        assert!(!check(0.0, 15.0, 1.0));
    }
}
