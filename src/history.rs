//! Augmented history skeleton
//!
//! State index 0 is D₀ and state `q + 1` is the database right after
//! statement `q`. A tuple is relevant from the state it first appears in up to
//! the final state; deleted tuples stay relevant and are pinned to the ghost
//! sentinel by the translator. Knowing the relevant (state, tuple) pairs up
//! front bounds the number of variables: a tuple inserted by statement 5 has
//! no cells before state 6.

use rustc_hash::FxHashMap;

use crate::ast::{Statement, StatementKind};
use crate::error::{RepairError, Result};
use crate::instance::{Database, TupleId};

/// The states a tuple is relevant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleSpan {
    /// Tuple id
    pub id: TupleId,
    /// First state the tuple exists in
    pub born: usize,
}

/// Which tuples exist at which state of the replay
#[derive(Debug, Clone)]
pub struct AugmentedHistory {
    num_statements: usize,
    tuples: Vec<TupleSpan>,
    positions: FxHashMap<TupleId, usize>,
}

impl AugmentedHistory {
    /// Builds the skeleton, validating every statement on the way
    ///
    /// # Errors
    /// Returns [`RepairError::MalformedStatement`] for the first bad statement,
    /// including an INSERT that reuses an existing tuple id
    pub fn build(database: &Database, log: &[Statement]) -> Result<Self> {
        let mut tuples = Vec::with_capacity(database.len() + log.len());
        let mut positions = FxHashMap::default();

        for (id, _) in database.rows() {
            positions.insert(id, tuples.len());
            tuples.push(TupleSpan { id, born: 0 });
        }

        for (q, stmt) in log.iter().enumerate() {
            stmt.validate(q, database.schema())?;
            if stmt.kind() != StatementKind::Insert {
                continue;
            }
            let Some(id) = stmt.inserted_tuple() else {
                continue;
            };
            if positions.contains_key(&id) {
                return Err(RepairError::MalformedStatement {
                    index: q,
                    reason: format!("INSERT reuses tuple id {id}"),
                });
            }
            positions.insert(id, tuples.len());
            tuples.push(TupleSpan { id, born: q + 1 });
        }

        Ok(Self {
            num_statements: log.len(),
            tuples,
            positions,
        })
    }

    /// Number of statements in the log
    pub fn num_statements(&self) -> usize {
        self.num_statements
    }

    /// Number of states (statements + 1)
    pub fn num_states(&self) -> usize {
        self.num_statements + 1
    }

    /// Index of the final state
    pub fn final_state(&self) -> usize {
        self.num_statements
    }

    /// All tuples: D₀ first in id order, then inserted tuples in log order
    pub fn tuples(&self) -> &[TupleSpan] {
        &self.tuples
    }

    /// Looks up a tuple
    pub fn span(&self, id: TupleId) -> Option<&TupleSpan> {
        self.positions.get(&id).map(|&i| &self.tuples[i])
    }

    /// Returns true if the tuple has a cell at `state`
    pub fn exists_at(&self, id: TupleId, state: usize) -> bool {
        self.span(id)
            .is_some_and(|s| s.born <= state && state <= self.num_statements)
    }

    /// Tuples statement `query` may read or affect (those existing before it runs)
    pub fn candidates(&self, query: usize) -> impl Iterator<Item = &TupleSpan> + '_ {
        self.tuples.iter().filter(move |s| s.born <= query)
    }

    /// Tuple created by statement `query`, if it is an INSERT
    pub fn inserted_at(&self, query: usize) -> Option<TupleId> {
        self.tuples
            .iter()
            .find(|s| s.born == query + 1)
            .map(|s| s.id)
    }

    /// Number of (state, tuple) pairs with cells
    pub fn num_cells(&self) -> usize {
        self.tuples
            .iter()
            .map(|s| self.num_states() - s.born)
            .sum()
    }
}
