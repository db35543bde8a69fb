//! Adapter for the microlp branch-and-bound backend
//!
//! microlp solves to optimality in one blocking call and cannot be
//! interrupted, so a deadline is only checked before the call starts.

use microlp::{ComparisonOp, OptimizationDirection, Problem};
use std::time::Instant;
use tracing::debug;

use super::{MilpSolver, SolverOutcome, SolverStatus};
use crate::error::{RepairError, Result};
use crate::milp::{MilpModel, Sense, VarKind};

/// Default backend: pure-Rust MILP solving via microlp
///
/// # Example
///
/// ```
/// use query_repair::engine::{MicrolpSolver, MilpSolver, SolverStatus};
/// use query_repair::milp::{LinExpr, MilpModel, Sense, VarKind};
///
/// let mut model = MilpModel::new();
/// let x = model.add_variable("x", VarKind::Integer, 0.0, 10.0);
/// model.constrain("c", LinExpr::var(x), Sense::Ge, LinExpr::constant(3.5));
/// model.add_objective(LinExpr::var(x));
///
/// let outcome = MicrolpSolver::new().solve(&model, None)?;
/// assert_eq!(outcome.status, SolverStatus::Optimal);
/// assert_eq!(outcome.assignment.unwrap()[x.index()], 4.0);
/// # Ok::<(), query_repair::RepairError>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct MicrolpSolver {
    solves: usize,
}

impl MicrolpSolver {
    /// Creates a new adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of models handed to microlp so far
    pub fn solves(&self) -> usize {
        self.solves
    }
}

impl MilpSolver for MicrolpSolver {
    fn solve(&mut self, model: &MilpModel, deadline: Option<Instant>) -> Result<SolverOutcome> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(SolverOutcome::without_incumbent(SolverStatus::TimeLimitReached));
        }

        let mut costs = vec![0.0; model.num_variables()];
        for &(v, c) in model.objective().terms() {
            costs[v.index()] += c;
        }

        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let vars: Vec<microlp::Variable> = model
            .variables()
            .iter()
            .zip(&costs)
            .map(|(var, &cost)| match var.kind() {
                VarKind::Continuous => problem.add_var(cost, (var.lower(), var.upper())),
                VarKind::Integer => problem.add_integer_var(
                    cost,
                    (var.lower().ceil() as i32, var.upper().floor() as i32),
                ),
                VarKind::Binary => problem.add_binary_var(cost),
            })
            .collect();

        for constraint in model.constraints() {
            let op = match constraint.sense() {
                Sense::Le => ComparisonOp::Le,
                Sense::Ge => ComparisonOp::Ge,
                Sense::Eq => ComparisonOp::Eq,
            };
            let lhs: Vec<(microlp::Variable, f64)> = constraint
                .lhs()
                .terms()
                .iter()
                .map(|&(v, c)| (vars[v.index()], c))
                .collect();
            problem.add_constraint(lhs, op, constraint.rhs());
        }

        self.solves += 1;
        debug!(
            variables = model.num_variables(),
            constraints = model.num_constraints(),
            "handing model to microlp"
        );

        match problem.solve() {
            Ok(solution) => {
                let assignment = model
                    .variables()
                    .iter()
                    .zip(&vars)
                    .map(|(var, &v)| {
                        let value = *solution.var_value(v);
                        if var.kind() == VarKind::Continuous {
                            value
                        } else {
                            value.round()
                        }
                    })
                    .collect();
                Ok(SolverOutcome::optimal(assignment))
            }
            Err(microlp::Error::Infeasible) => Ok(SolverOutcome::infeasible()),
            Err(microlp::Error::Unbounded) => {
                Ok(SolverOutcome::without_incumbent(SolverStatus::Unbounded))
            }
            Err(microlp::Error::InternalError(msg)) => Err(RepairError::Solver(msg)),
        }
    }

    fn name(&self) -> &str {
        "microlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp::LinExpr;
    use std::time::Duration;

    #[test]
    fn solves_small_integer_program() {
        // min x + 2y  s.t.  x + y >= 3, x <= 2
        let mut model = MilpModel::new();
        let x = model.add_variable("x", VarKind::Integer, 0.0, 2.0);
        let y = model.add_variable("y", VarKind::Integer, 0.0, 10.0);
        model.constrain(
            "cover",
            LinExpr::var(x) + LinExpr::var(y),
            Sense::Ge,
            LinExpr::constant(3.0),
        );
        model.add_objective(LinExpr::var(x) + LinExpr::term(y, 2.0));

        let mut solver = MicrolpSolver::new();
        let outcome = solver.solve(&model, None).unwrap();
        assert_eq!(outcome.status, SolverStatus::Optimal);
        let assignment = outcome.assignment.unwrap();
        assert_eq!(assignment[x.index()], 2.0);
        assert_eq!(assignment[y.index()], 1.0);
        assert_eq!(solver.solves(), 1);
    }

    #[test]
    fn reports_infeasibility() {
        let mut model = MilpModel::new();
        let z = model.add_binary("z");
        model.constrain("lo", LinExpr::var(z), Sense::Ge, LinExpr::constant(0.5));
        model.constrain("hi", LinExpr::var(z), Sense::Le, LinExpr::constant(0.4));

        let outcome = MicrolpSolver::new().solve(&model, None).unwrap();
        assert_eq!(outcome.status, SolverStatus::Infeasible);
        assert!(outcome.assignment.is_none());
    }

    #[test]
    fn expired_deadline_skips_the_solve() {
        let mut model = MilpModel::new();
        model.add_binary("z");
        let past = Instant::now()
            .checked_sub(Duration::from_millis(1))
            .unwrap_or_else(Instant::now);

        let mut solver = MicrolpSolver::new();
        let outcome = solver.solve(&model, Some(past)).unwrap();
        assert_eq!(outcome.status, SolverStatus::TimeLimitReached);
        assert!(outcome.assignment.is_none());
        assert_eq!(solver.solves(), 0);
    }
}
