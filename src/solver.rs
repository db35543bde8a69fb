//! Main repair API
//!
//! A [`Repairer`] translates a [`RepairProblem`] to a MILP model, hands it to
//! a backend and decodes the assignment into a repaired log.

mod decoder;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::ast::Statement;
use crate::engine::{MicrolpSolver, MilpSolver, SolverOutcome, SolverStatus, State};
use crate::error::{RepairError, Result};
use crate::instance::RepairProblem;
use crate::translator::{Translation, Translator};

/// Repair options
///
/// There is no default flip weight: the trade-off between changing which
/// tuples a statement affects and changing literal values is the caller's.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    flip_weight: f64,
    time_limit: Option<Duration>,
}

impl Options {
    /// Options with flip weight `w` and no time limit
    pub fn new(flip_weight: f64) -> Self {
        Self {
            flip_weight,
            time_limit: None,
        }
    }

    /// Sets the time budget for the solve
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Cost of flipping whether one statement affects one tuple
    pub fn flip_weight(&self) -> f64 {
        self.flip_weight
    }

    /// Time budget for the solve
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    /// Checks the options
    ///
    /// # Errors
    /// Returns [`RepairError::InvalidArgument`] for a negative or non-finite
    /// weight
    pub fn validate(&self) -> Result<()> {
        if !self.flip_weight.is_finite() || self.flip_weight < 0.0 {
            return Err(RepairError::InvalidArgument(format!(
                "flip weight must be finite and non-negative, got {}",
                self.flip_weight
            )));
        }
        Ok(())
    }
}

/// Query log repairer (uses microlp by default)
#[derive(Debug, Clone)]
pub struct Repairer {
    options: Options,
}

impl Repairer {
    /// Creates a repairer with the given options
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Returns the options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Builds the MILP model without solving it
    ///
    /// # Errors
    /// Returns the construction errors of [`Translator::translate`]
    pub fn translate(&self, problem: &RepairProblem) -> Result<Translation> {
        self.options.validate()?;
        Translator::translate(problem, self.options.flip_weight)
    }

    /// Repairs a log using the microlp backend
    ///
    /// # Errors
    /// Construction errors, [`RepairError::NoRepairExists`] when no log edit
    /// satisfies the complaints, [`RepairError::NoIncumbent`] when the solve
    /// stopped early without a feasible repair
    pub fn repair(&self, problem: &RepairProblem) -> Result<Repair> {
        let mut backend = MicrolpSolver::new();
        self.repair_with(&mut backend, problem)
    }

    /// Repairs a log with a custom backend
    ///
    /// # Errors
    /// As for [`Repairer::repair`], plus backend failures
    pub fn repair_with<S: MilpSolver>(&self, backend: &mut S, problem: &RepairProblem) -> Result<Repair> {
        let translation_start = Instant::now();
        let translation = self.translate(problem)?;
        let translation_time = translation_start.elapsed();

        let solving_start = Instant::now();
        let outcome = match translation.model().infeasible_reason() {
            Some(constraint) => {
                debug!(constraint, "model infeasible before solving");
                SolverOutcome::infeasible()
            }
            None => {
                let deadline = self.options.time_limit.map(|limit| solving_start + limit);
                backend.solve(translation.model(), deadline)?
            }
        };
        let solving_time = solving_start.elapsed();
        info!(
            backend = backend.name(),
            status = %outcome.status,
            solving_ms = solving_time.as_millis() as u64,
            "solve finished"
        );

        let statistics = Statistics {
            translation_time,
            solving_time,
            num_variables: translation.model().num_variables(),
            num_constraints: translation.model().num_constraints(),
        };

        if outcome.status == SolverStatus::Infeasible {
            warn!("no repair satisfies the complaints");
            return Err(RepairError::NoRepairExists);
        }
        let Some(assignment) = outcome.assignment else {
            warn!(status = %outcome.status, "solve stopped without a feasible repair");
            return Err(RepairError::NoIncumbent(outcome.status));
        };

        let decoded = decoder::decode(problem, &translation, &assignment, self.options.flip_weight)?;
        let warning = (outcome.status != SolverStatus::Optimal).then(|| {
            let gap = outcome.best_bound.map_or(f64::INFINITY, |bound| {
                (decoded.objective - bound).abs() / decoded.objective.abs().max(1e-9)
            });
            warn!(status = %outcome.status, gap, "returning an unproven repair");
            OptimalityGapWarning {
                status: outcome.status,
                gap,
            }
        });

        Ok(Repair {
            statements: decoded.statements,
            objective: decoded.objective,
            status: outcome.status,
            warning,
            timeline: decoded.timeline,
            statistics,
        })
    }
}

/// What happened to one statement of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRepair {
    /// The statement as logged
    pub original: Statement,
    /// The statement in Q*
    pub repaired: Statement,
    /// True if any literal changed
    pub changed: bool,
    /// Tuples the repaired statement affects, in model order
    pub affected: Vec<crate::instance::TupleId>,
    /// True if the repaired statement affects nothing although the original did
    pub noop: bool,
}

/// A feasible repair whose optimality was not proven
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalityGapWarning {
    /// How the solve ended
    pub status: SolverStatus,
    /// Relative distance to the best bound (infinite without a bound)
    pub gap: f64,
}

/// A repaired log plus its report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repair {
    statements: Vec<StatementRepair>,
    objective: f64,
    status: SolverStatus,
    warning: Option<OptimalityGapWarning>,
    timeline: Vec<State>,
    statistics: Statistics,
}

impl Repair {
    /// Per-statement outcome, in log order
    pub fn statements(&self) -> &[StatementRepair] {
        &self.statements
    }

    /// Q*, the repaired log (same length as Q)
    pub fn repaired_log(&self) -> Vec<Statement> {
        self.statements.iter().map(|s| s.repaired.clone()).collect()
    }

    /// Cost of the repair under the objective
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Solver status
    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Returns true if the repair was proven optimal
    pub fn is_optimal(&self) -> bool {
        self.status == SolverStatus::Optimal
    }

    /// Set when the repair is feasible but not proven optimal
    pub fn warning(&self) -> Option<&OptimalityGapWarning> {
        self.warning.as_ref()
    }

    /// Every state of the repaired replay, as the model assigned it
    pub fn timeline(&self) -> &[State] {
        &self.timeline
    }

    /// The final state Dₙ of the repaired replay
    pub fn final_state(&self) -> &State {
        &self.timeline[self.timeline.len() - 1]
    }

    /// Number of statements whose literals changed
    pub fn changed_count(&self) -> usize {
        self.statements.iter().filter(|s| s.changed).count()
    }

    /// Returns the statistics
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

/// Statistics collected during a repair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    translation_time: Duration,
    solving_time: Duration,
    num_variables: usize,
    num_constraints: usize,
}

impl Statistics {
    /// Returns translation time in milliseconds
    pub fn translation_time(&self) -> u64 {
        self.translation_time.as_millis() as u64
    }

    /// Returns solving time in milliseconds
    pub fn solving_time(&self) -> u64 {
        self.solving_time.as_millis() as u64
    }

    /// Returns total time in milliseconds
    pub fn total_time(&self) -> u64 {
        self.translation_time() + self.solving_time()
    }

    /// Returns number of model variables
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Returns number of model constraints
    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }
}
