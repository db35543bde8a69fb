//! Complaint encoding
//!
//! Complaints are checked against the replay of the original log before any
//! constraint is emitted, then each becomes `cell[n, tuple, attr] = expected`.

use super::{Encoder, ValueCodec};
use crate::engine::Trace;
use crate::error::{RepairError, Result};
use crate::instance::{RepairProblem, TupleId};
use crate::milp::{LinExpr, Sense};

/// A complaint resolved against the schema and the value encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Correction {
    tuple: TupleId,
    attr: usize,
    units: i64,
}

/// Validates every complaint
///
/// # Errors
/// [`RepairError::InvalidArgument`] for an unknown attribute,
/// [`RepairError::ContradictoryComplaint`] for a tuple that is missing or
/// deleted in the final state, [`RepairError::DomainError`] for an expected
/// value the attribute cannot hold
pub(super) fn resolve(
    problem: &RepairProblem,
    codec: &ValueCodec,
    reference: &Trace,
) -> Result<Vec<Correction>> {
    let schema = problem.schema();
    let final_state = reference.final_state();
    problem
        .complaints()
        .iter()
        .map(|complaint| {
            let attr = schema.index_of(&complaint.attribute).ok_or_else(|| {
                RepairError::InvalidArgument(format!(
                    "complaint names unknown attribute {}",
                    complaint.attribute
                ))
            })?;
            let contradiction = |reason: &str| RepairError::ContradictoryComplaint {
                tuple: complaint.tuple,
                attribute: complaint.attribute.clone(),
                reason: reason.to_string(),
            };
            let row = final_state
                .get(&complaint.tuple)
                .ok_or_else(|| contradiction("tuple does not exist in the final state"))?;
            if row.iter().any(|v| v.is_ghost()) {
                return Err(contradiction("tuple is deleted in the final state"));
            }
            let units = codec.encode(attr, &complaint.expected)?;
            Ok(Correction {
                tuple: complaint.tuple,
                attr,
                units,
            })
        })
        .collect()
}

impl Encoder<'_> {
    pub(super) fn encode_corrections(&mut self, corrections: &[Correction]) {
        let state = self.history.final_state();
        for c in corrections {
            let cell = self.cell(state, c.tuple, c.attr);
            let name = format!(
                "complaint_{}_{}",
                c.tuple,
                self.schema.attributes()[c.attr].name
            );
            self.model
                .constrain(name, cell, Sense::Eq, LinExpr::constant(c.units as f64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Condition, Literal, Statement};
    use crate::engine::replay;
    use crate::instance::{Attribute, Complaint, Database, Schema};

    fn problem(log: Vec<Statement>, complaints: Vec<Complaint>) -> RepairProblem {
        let schema = Schema::new("T", vec![Attribute::numeric("x", 0.0, 10.0)]).unwrap();
        let mut db = Database::new(schema);
        db.insert(TupleId(1), vec![5.0.into()]).unwrap();
        RepairProblem::new(db, log, complaints)
    }

    fn check(problem: &RepairProblem) -> Result<Vec<Correction>> {
        let codec = ValueCodec::build(problem)?;
        let reference = replay(problem.database(), problem.log())?;
        resolve(problem, &codec, &reference)
    }

    #[test]
    fn complaint_on_deleted_tuple_is_contradictory() {
        let delete = Statement::delete(
            "T",
            vec![Condition::new("x", CompareOp::Eq, Literal::fixed(5.0))],
        );
        let p = problem(vec![delete], vec![Complaint::new(TupleId(1), "x", 5.0)]);
        assert!(matches!(
            check(&p),
            Err(RepairError::ContradictoryComplaint { tuple: TupleId(1), .. })
        ));
    }

    #[test]
    fn complaint_on_unknown_tuple_is_contradictory() {
        let p = problem(vec![], vec![Complaint::new(TupleId(9), "x", 5.0)]);
        assert!(matches!(
            check(&p),
            Err(RepairError::ContradictoryComplaint { .. })
        ));
    }

    #[test]
    fn complaint_values_are_checked() {
        let p = problem(vec![], vec![Complaint::new(TupleId(1), "y", 5.0)]);
        assert!(matches!(check(&p), Err(RepairError::InvalidArgument(_))));
        let p = problem(vec![], vec![Complaint::new(TupleId(1), "x", 50.0)]);
        assert!(matches!(check(&p), Err(RepairError::DomainError(_))));
        let p = problem(vec![], vec![Complaint::new(TupleId(1), "x", "five")]);
        assert!(matches!(check(&p), Err(RepairError::DomainError(_))));
        let p = problem(vec![], vec![Complaint::new(TupleId(1), "x", 7.0)]);
        assert_eq!(
            check(&p).unwrap(),
            vec![Correction {
                tuple: TupleId(1),
                attr: 0,
                units: 7
            }]
        );
    }
}
