//! MILP solver trait, backends and the reference replay

mod microlp_adapter;
pub mod replay;

pub use microlp_adapter::MicrolpSolver;
pub use replay::{replay, State, Trace};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::milp::MilpModel;
use crate::Result;

/// Core MILP solver trait
///
/// A backend receives a minimization model and returns a status plus, when
/// it found one, a feasible assignment indexed by [`crate::milp::VarId::index`].
pub trait MilpSolver {
    /// Solves `model`, giving up once `deadline` has passed
    ///
    /// # Errors
    /// Returns [`crate::RepairError::Solver`] on an internal backend failure;
    /// infeasibility and early stops are statuses, not errors
    fn solve(&mut self, model: &MilpModel, deadline: Option<Instant>) -> Result<SolverOutcome>;

    /// Backend name, for logging
    fn name(&self) -> &str;
}

/// How a solve ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverStatus {
    /// Proven optimal
    Optimal,
    /// Proven infeasible
    Infeasible,
    /// Objective unbounded
    Unbounded,
    /// Stopped at the deadline
    TimeLimitReached,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::Unbounded => "unbounded",
            SolverStatus::TimeLimitReached => "time limit reached",
        })
    }
}

/// What a backend returns
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// How the solve ended
    pub status: SolverStatus,
    /// Best feasible assignment found, if any
    pub assignment: Option<Vec<f64>>,
    /// Best proven lower bound on the objective, if known
    pub best_bound: Option<f64>,
}

impl SolverOutcome {
    /// A proven optimum
    pub fn optimal(assignment: Vec<f64>) -> Self {
        Self {
            status: SolverStatus::Optimal,
            assignment: Some(assignment),
            best_bound: None,
        }
    }

    /// Proven infeasibility
    pub fn infeasible() -> Self {
        Self::without_incumbent(SolverStatus::Infeasible)
    }

    /// A stop with no feasible point
    pub fn without_incumbent(status: SolverStatus) -> Self {
        Self {
            status,
            assignment: None,
            best_bound: None,
        }
    }
}

/// A backend that replays a prepared outcome
///
/// Does not look at the model beyond checking the assignment length. Useful
/// for exercising early-stop handling without a real time limit.
#[derive(Debug, Clone)]
pub struct ScriptedSolver {
    outcome: SolverOutcome,
    calls: usize,
}

impl ScriptedSolver {
    /// Creates a backend that always returns `outcome`
    pub fn new(outcome: SolverOutcome) -> Self {
        Self { outcome, calls: 0 }
    }

    /// Number of times `solve` was called
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl MilpSolver for ScriptedSolver {
    fn solve(&mut self, model: &MilpModel, _deadline: Option<Instant>) -> Result<SolverOutcome> {
        self.calls += 1;
        if let Some(assignment) = &self.outcome.assignment {
            if assignment.len() != model.num_variables() {
                return Err(crate::RepairError::Solver(format!(
                    "scripted assignment has {} values for {} variables",
                    assignment.len(),
                    model.num_variables()
                )));
            }
        }
        Ok(self.outcome.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
