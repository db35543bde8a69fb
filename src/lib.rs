//! # query-repair
//!
//! Reconstructs a query log that is consistent with an initial database
//! state and a set of complaints about the final state.
//!
//! Given an initial state D₀, a log Q of INSERT / UPDATE / DELETE statements
//! and complaints C naming (tuple, attribute) cells of the final state whose
//! value should differ, the crate encodes the replay of Q as a mixed-integer
//! linear program, asks a MILP backend for a minimum-cost assignment, and
//! decodes that assignment into a repaired log Q* of the same length.
//!
//! ## Example
//!
//! ```rust
//! use query_repair::ast::{CompareOp, Condition, Literal, SetExpr, Statement};
//! use query_repair::instance::{Attribute, Complaint, Database, RepairProblem, Schema, TupleId};
//! use query_repair::solver::{Options, Repairer};
//!
//! let schema = Schema::new("T", vec![Attribute::numeric("x", 0.0, 100.0)])?;
//! let mut db = Database::new(schema);
//! db.insert(TupleId(1), vec![5.0.into()])?;
//!
//! let log = vec![Statement::update(
//!     "T",
//!     [("x", SetExpr::literal(Literal::repairable(10.0)))],
//!     vec![Condition::new("x", CompareOp::Eq, Literal::repairable(5.0))],
//! )];
//! let complaints = vec![Complaint::new(TupleId(1), "x", 20.0)];
//!
//! let problem = RepairProblem::new(db, log, complaints);
//! let repair = Repairer::new(Options::new(1.0)).repair(&problem)?;
//! assert_eq!(repair.repaired_log()[0].to_string(), "UPDATE T SET x = 20 WHERE x = 5");
//! # Ok::<(), query_repair::RepairError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2024_compatibility)]

/// Statement model (values, literals, predicates, assignments)
pub mod ast;

/// Relation schema, initial database, complaints and repair problems
pub mod instance;

/// Augmented history skeleton
pub mod history;

/// Mixed-integer linear program representation and linearization
pub mod milp;

/// Query log and complaints to MILP translation
pub mod translator;

/// Solver backends and reference replay
pub mod engine;

/// Main repair API
pub mod solver;

/// Error types
pub mod error {
    //! Error types for query-repair

    use crate::engine::SolverStatus;
    use crate::instance::TupleId;
    use thiserror::Error;

    /// Errors that can occur while building or solving a repair
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum RepairError {
        /// A log entry has a bad shape; carries its log index
        #[error("malformed statement at log index {index}: {reason}")]
        MalformedStatement {
            /// Position of the statement in the log
            index: usize,
            /// What is wrong with it
            reason: String,
        },

        /// An attribute domain is unusable, or a value does not fit it
        #[error("domain error: {0}")]
        DomainError(String),

        /// A complaint cannot be satisfied by any value assignment
        #[error("contradictory complaint on {tuple}.{attribute}: {reason}")]
        ContradictoryComplaint {
            /// Tuple the complaint is about
            tuple: TupleId,
            /// Attribute the complaint is about
            attribute: String,
            /// Why it cannot hold
            reason: String,
        },

        /// The backend proved that no repair satisfies the complaints
        #[error("no repair exists")]
        NoRepairExists,

        /// The backend stopped early without any feasible repair to report
        #[error("solver stopped with status {0:?} and no incumbent")]
        NoIncumbent(SolverStatus),

        /// The backend failed internally
        #[error("solver failure: {0}")]
        Solver(String),

        /// Invalid argument
        #[error("invalid argument: {0}")]
        InvalidArgument(String),
    }

    /// Result type for query-repair operations
    pub type Result<T> = std::result::Result<T, RepairError>;
}

// Re-export commonly used types
pub use error::{RepairError, Result};
