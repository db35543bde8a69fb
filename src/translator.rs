//! Query log and complaints to MILP translation
//!
//! The translator walks the log once, state by state, keeping one linear
//! expression per cell of the augmented history and one ghost flag per
//! (state, tuple). A cell that a statement cannot change shares its
//! predecessor's expression; only cells a statement may write get a fresh
//! `t` variable. Per-kind statement encoding lives in `statements`,
//! complaints in `corrections`, the edit-distance objective in `objective`.

mod codec;
mod corrections;
mod objective;
mod statements;

pub use codec::{Domain, ValueCodec};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::engine::{replay, Trace};
use crate::error::{RepairError, Result};
use crate::history::AugmentedHistory;
use crate::instance::{Database, RepairProblem, Schema, TupleId};
use crate::milp::{AttrKey, CellKey, LinExpr, MilpModel, VarFactory};

/// Translator from repair problems to MILP models
pub struct Translator;

impl Translator {
    /// Builds the MILP model of a repair problem
    ///
    /// `flip_weight` is the cost of changing whether one statement affects
    /// one tuple, relative to one value unit of literal deviation.
    ///
    /// # Errors
    /// Fails fast with [`RepairError::MalformedStatement`],
    /// [`RepairError::DomainError`], [`RepairError::ContradictoryComplaint`]
    /// or [`RepairError::InvalidArgument`]; no partial model is returned
    pub fn translate(problem: &RepairProblem, flip_weight: f64) -> Result<Translation> {
        if !flip_weight.is_finite() || flip_weight < 0.0 {
            return Err(RepairError::InvalidArgument(format!(
                "flip weight must be finite and non-negative, got {flip_weight}"
            )));
        }
        let history = AugmentedHistory::build(problem.database(), problem.log())?;
        let codec = ValueCodec::build(problem)?;
        let reference = replay(problem.database(), problem.log())?;
        let corrections = corrections::resolve(problem, &codec, &reference)?;

        let mut encoder = Encoder::new(problem.schema(), &codec, &history);
        encoder.encode_initial_state(problem.database())?;
        for (query, stmt) in problem.log().iter().enumerate() {
            encoder.encode_statement(query, stmt)?;
        }
        encoder.encode_corrections(&corrections);
        encoder.encode_objective(&reference, flip_weight);

        let Encoder {
            model,
            factory,
            cells,
            ghosts,
            ..
        } = encoder;
        debug!(
            statements = problem.log().len(),
            cells = history.num_cells(),
            variables = model.num_variables(),
            constraints = model.num_constraints(),
            repairable = factory.repairable_literals().len(),
            "translated repair problem"
        );

        Ok(Translation {
            model,
            factory,
            history,
            codec,
            cells,
            ghosts,
            reference,
        })
    }
}

/// A translated repair problem: the model plus everything needed to decode it
#[derive(Debug)]
pub struct Translation {
    model: MilpModel,
    factory: VarFactory,
    history: AugmentedHistory,
    codec: ValueCodec,
    cells: FxHashMap<AttrKey, LinExpr>,
    ghosts: FxHashMap<CellKey, LinExpr>,
    reference: Trace,
}

impl Translation {
    /// Returns the MILP model
    pub fn model(&self) -> &MilpModel {
        &self.model
    }

    /// Returns the variable index
    pub fn factory(&self) -> &VarFactory {
        &self.factory
    }

    /// Returns the augmented history skeleton
    pub fn history(&self) -> &AugmentedHistory {
        &self.history
    }

    /// Returns the value encoding
    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    /// Returns the replay of the original log
    pub fn reference(&self) -> &Trace {
        &self.reference
    }

    /// Expression for the value of `tuple.attr` at `state`, in units
    pub fn cell(&self, state: usize, tuple: TupleId, attr: usize) -> Option<&LinExpr> {
        self.cells.get(&AttrKey { state, tuple, attr })
    }

    /// Expression that is 1 iff `tuple` is deleted at `state`
    pub fn ghost_flag(&self, state: usize, tuple: TupleId) -> Option<&LinExpr> {
        self.ghosts.get(&CellKey { state, tuple })
    }
}

/// Model under construction
struct Encoder<'a> {
    schema: &'a Schema,
    codec: &'a ValueCodec,
    history: &'a AugmentedHistory,
    model: MilpModel,
    factory: VarFactory,
    cells: FxHashMap<AttrKey, LinExpr>,
    ghosts: FxHashMap<CellKey, LinExpr>,
}

impl<'a> Encoder<'a> {
    fn new(schema: &'a Schema, codec: &'a ValueCodec, history: &'a AugmentedHistory) -> Self {
        Self {
            schema,
            codec,
            history,
            model: MilpModel::new(),
            factory: VarFactory::new(history.num_statements()),
            cells: FxHashMap::default(),
            ghosts: FxHashMap::default(),
        }
    }

    /// D₀ cells are constants
    fn encode_initial_state(&mut self, database: &Database) -> Result<()> {
        for (tuple, row) in database.rows() {
            for (attr, value) in row.iter().enumerate() {
                let units = self.codec.encode(attr, value)?;
                self.cells
                    .insert(AttrKey { state: 0, tuple, attr }, LinExpr::constant(units as f64));
            }
            self.ghosts
                .insert(CellKey { state: 0, tuple }, LinExpr::constant(0.0));
        }
        Ok(())
    }

    fn attr_index(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .ok_or_else(|| RepairError::InvalidArgument(format!("unknown attribute {name}")))
    }

    fn cell(&self, state: usize, tuple: TupleId, attr: usize) -> LinExpr {
        self.cells[&AttrKey { state, tuple, attr }].clone()
    }

    fn ghost(&self, state: usize, tuple: TupleId) -> LinExpr {
        self.ghosts[&CellKey { state, tuple }].clone()
    }

    /// Shares every cell of `tuple` at `state - 1` with `state`
    fn carry_forward(&mut self, state: usize, tuple: TupleId) {
        for attr in 0..self.schema.len() {
            let value = self.cell(state - 1, tuple, attr);
            self.cells.insert(AttrKey { state, tuple, attr }, value);
        }
        let flag = self.ghost(state - 1, tuple);
        self.ghosts.insert(CellKey { state, tuple }, flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Condition, Literal, SetExpr, Statement};
    use crate::instance::{Attribute, Complaint};
    use crate::milp::Operand;

    fn database(values: &[f64]) -> Database {
        let schema = Schema::new("T", vec![Attribute::numeric("x", 0.0, 100.0)]).unwrap();
        let mut db = Database::new(schema);
        for (i, v) in values.iter().enumerate() {
            db.insert(TupleId(i as u64 + 1), vec![(*v).into()]).unwrap();
        }
        db
    }

    #[test]
    fn untouched_cells_share_expressions() {
        let log = vec![Statement::update(
            "T",
            [("x", SetExpr::literal(Literal::fixed(10.0)))],
            vec![Condition::new("x", CompareOp::Eq, Literal::fixed(5.0))],
        )];
        let problem = RepairProblem::new(database(&[5.0, 7.0]), log, vec![]);
        let translation = Translator::translate(&problem, 1.0).unwrap();

        // t2 never matches the fixed predicate, so its cell is carried forward
        assert_eq!(
            translation.cell(1, TupleId(2), 0),
            translation.cell(0, TupleId(2), 0)
        );
        assert_eq!(
            translation.cell(0, TupleId(1), 0),
            Some(&LinExpr::constant(5.0))
        );
        assert!(translation.cell(1, TupleId(1), 0).is_some());
        assert!(translation.factory().repairable_literals().is_empty());
    }

    #[test]
    fn repairable_literals_become_integer_variables() {
        let log = vec![Statement::update(
            "T",
            [("x", SetExpr::literal(Literal::repairable(10.0)))],
            vec![Condition::new("x", CompareOp::Eq, Literal::fixed(5.0))],
        )];
        let complaints = vec![Complaint::new(TupleId(1), "x", 20.0)];
        let problem = RepairProblem::new(database(&[5.0]), log, complaints);
        let translation = Translator::translate(&problem, 1.0).unwrap();

        let literals = translation.factory().repairable_literals();
        assert_eq!(literals.len(), 1);
        assert_eq!(literals[0].original, 10);
        let fixed = crate::milp::LiteralKey { query: 0, ordinal: 0 };
        assert_eq!(translation.factory().operand(fixed), Some(Operand::Const(5.0)));
        assert!(translation.model().infeasible_reason().is_none());
        assert!(translation
            .model()
            .constraints()
            .iter()
            .any(|c| c.name().starts_with("complaint_")));
    }

    #[test]
    fn delete_raises_the_ghost_flag() {
        let log = vec![Statement::delete(
            "T",
            vec![Condition::new("x", CompareOp::Ge, Literal::repairable(6.0))],
        )];
        let problem = RepairProblem::new(database(&[5.0, 7.0]), log, vec![]);
        let translation = Translator::translate(&problem, 1.0).unwrap();

        assert_eq!(translation.ghost_flag(0, TupleId(2)), Some(&LinExpr::constant(0.0)));
        let flag = translation.ghost_flag(1, TupleId(2)).unwrap();
        assert!(!flag.is_constant());
        assert_eq!(translation.reference().affected(0), &[TupleId(2)]);
    }

    #[test]
    fn negative_flip_weight_is_rejected() {
        let problem = RepairProblem::new(database(&[1.0]), vec![], vec![]);
        assert!(matches!(
            Translator::translate(&problem, -1.0),
            Err(RepairError::InvalidArgument(_))
        ));
    }
}
