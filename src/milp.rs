//! Mixed-integer linear program representation
//!
//! The translator emits a [`MilpModel`]: bounded variables (continuous,
//! integer or binary), linear constraints and a linear objective to minimize.
//! Any backend implementing [`crate::engine::MilpSolver`] can consume it.

pub mod linearize;
mod var_factory;

pub use linearize::Indicator;
pub use var_factory::{AttrKey, CellKey, LiteralKey, LiteralVar, Operand, VarFactory};

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Handle of a model variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    /// Position of the variable in the model (and in a solver assignment)
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Integrality of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Real-valued
    Continuous,
    /// Integer-valued
    Integer,
    /// 0 or 1
    Binary,
}

/// A model variable
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    kind: VarKind,
    lower: f64,
    upper: f64,
}

impl Variable {
    /// Returns the variable's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the variable's kind
    pub fn kind(&self) -> VarKind {
        self.kind
    }

    /// Returns the lower bound
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Returns the upper bound
    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// Closed interval of values an expression can take
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Lower end
    pub lo: f64,
    /// Upper end
    pub hi: f64,
}

impl Interval {
    /// Creates an interval
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }
}

/// `Σ coeff·var + constant`, terms sorted by variable with no zero coefficients
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    /// The constant `c`
    pub fn constant(c: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: c,
        }
    }

    /// The variable `v`
    pub fn var(v: VarId) -> Self {
        Self::term(v, 1.0)
    }

    /// The term `coeff·v`
    pub fn term(v: VarId, coeff: f64) -> Self {
        let mut e = Self::default();
        e.add_term(v, coeff);
        e
    }

    /// Returns the variable terms
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    /// Returns the constant part
    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    /// Returns true if there are no variable terms
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns `Some(v)` if the expression is exactly the variable `v`
    pub fn as_var(&self) -> Option<VarId> {
        match self.terms.as_slice() {
            [(v, c)] if *c == 1.0 && self.constant == 0.0 => Some(*v),
            _ => None,
        }
    }

    /// Adds `coeff·v`, merging with an existing term
    pub fn add_term(&mut self, v: VarId, coeff: f64) {
        match self.terms.binary_search_by_key(&v, |&(var, _)| var) {
            Ok(pos) => {
                self.terms[pos].1 += coeff;
                if self.terms[pos].1.abs() < 1e-12 {
                    self.terms.remove(pos);
                }
            }
            Err(pos) => {
                if coeff.abs() >= 1e-12 {
                    self.terms.insert(pos, (v, coeff));
                }
            }
        }
    }

    /// Adds a constant
    pub fn add_constant(&mut self, c: f64) {
        self.constant += c;
    }

    /// Evaluates the expression under an assignment indexed by [`VarId::index`]
    pub fn evaluate(&self, assignment: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * assignment.get(v.index()).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

impl From<VarId> for LinExpr {
    fn from(v: VarId) -> Self {
        LinExpr::var(v)
    }
}

impl From<f64> for LinExpr {
    fn from(c: f64) -> Self {
        LinExpr::constant(c)
    }
}

impl Add for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: LinExpr) -> LinExpr {
        for (v, c) in rhs.terms {
            self.add_term(v, c);
        }
        self.constant += rhs.constant;
        self
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;

    fn sub(self, rhs: LinExpr) -> LinExpr {
        self + (-rhs)
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> LinExpr {
        self * -1.0
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, k: f64) -> LinExpr {
        if k == 0.0 {
            return LinExpr::default();
        }
        for term in &mut self.terms {
            term.1 *= k;
        }
        self.constant *= k;
        self
    }
}

/// Relation between the two sides of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// `≤`
    Le,
    /// `≥`
    Ge,
    /// `=`
    Eq,
}

/// `terms sense rhs`, with all variables on the left
#[derive(Debug, Clone)]
pub struct Constraint {
    name: String,
    lhs: LinExpr,
    sense: Sense,
    rhs: f64,
}

impl Constraint {
    /// Returns the constraint's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the left-hand side (no constant part)
    pub fn lhs(&self) -> &LinExpr {
        &self.lhs
    }

    /// Returns the relation
    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Returns the right-hand side constant
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Returns true if the assignment satisfies the constraint within `tol`
    pub fn is_satisfied(&self, assignment: &[f64], tol: f64) -> bool {
        holds(self.lhs.evaluate(assignment), self.sense, self.rhs, tol)
    }
}

fn holds(lhs: f64, sense: Sense, rhs: f64, tol: f64) -> bool {
    match sense {
        Sense::Le => lhs <= rhs + tol,
        Sense::Ge => lhs >= rhs - tol,
        Sense::Eq => (lhs - rhs).abs() <= tol,
    }
}

/// A minimization MILP
#[derive(Debug, Clone, Default)]
pub struct MilpModel {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinExpr,
    infeasible: Option<String>,
}

impl MilpModel {
    /// Creates an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable with bounds `[lower, upper]`
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        kind: VarKind,
        lower: f64,
        upper: f64,
    ) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable {
            name: name.into(),
            kind,
            lower,
            upper,
        });
        id
    }

    /// Adds a 0/1 variable
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name, VarKind::Binary, 0.0, 1.0)
    }

    /// Returns a variable
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    /// Returns all variables in allocation order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Returns all constraints
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the number of variables
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Returns the number of constraints
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Adds `lhs sense rhs`
    ///
    /// A constraint without variables is checked immediately; if it fails the
    /// model is marked infeasible and the constraint is not stored.
    pub fn constrain(&mut self, name: impl Into<String>, lhs: LinExpr, sense: Sense, rhs: LinExpr) {
        let mut diff = lhs - rhs;
        let rhs = -diff.constant;
        diff.constant = 0.0;
        let name = name.into();
        if diff.is_constant() {
            if !holds(0.0, sense, rhs, 1e-9) && self.infeasible.is_none() {
                self.infeasible = Some(name);
            }
            return;
        }
        self.constraints.push(Constraint {
            name,
            lhs: diff,
            sense,
            rhs,
        });
    }

    /// Adds an expression to the objective
    pub fn add_objective(&mut self, expr: LinExpr) {
        let objective = std::mem::take(&mut self.objective);
        self.objective = objective + expr;
    }

    /// Returns the objective (minimized)
    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    /// Name of the first constant constraint found violated, if any
    pub fn infeasible_reason(&self) -> Option<&str> {
        self.infeasible.as_deref()
    }

    /// Range of an expression given the variable bounds
    pub fn interval(&self, expr: &LinExpr) -> Interval {
        let mut lo = expr.constant;
        let mut hi = expr.constant;
        for &(v, c) in &expr.terms {
            let var = self.variable(v);
            if c > 0.0 {
                lo += c * var.lower;
                hi += c * var.upper;
            } else {
                lo += c * var.upper;
                hi += c * var.lower;
            }
        }
        Interval { lo, hi }
    }

    /// Checks bounds, integrality and constraints of an assignment
    ///
    /// # Errors
    /// Returns a description of the first violation
    pub fn check(&self, assignment: &[f64], tol: f64) -> std::result::Result<(), String> {
        if assignment.len() != self.variables.len() {
            return Err(format!(
                "assignment has {} values for {} variables",
                assignment.len(),
                self.variables.len()
            ));
        }
        for (var, &value) in self.variables.iter().zip(assignment) {
            if value < var.lower - tol || value > var.upper + tol {
                return Err(format!("{} = {value} outside its bounds", var.name));
            }
            if var.kind != VarKind::Continuous && (value - value.round()).abs() > tol {
                return Err(format!("{} = {value} is not integral", var.name));
            }
        }
        match self.constraints.iter().find(|c| !c.is_satisfied(assignment, tol)) {
            Some(c) => Err(format!("constraint {} violated", c.name)),
            None => Ok(()),
        }
    }
}
