//! Solution decoding
//!
//! Reads repaired literal values and targeting indicators back from a solver
//! assignment and rebuilds the log. Literal variables are rounded to whole
//! units, which is the attribute's declared precision. A statement whose
//! repaired form affects nothing stays in Q* as a no-op so the log keeps its
//! length.

use rustc_hash::{FxHashMap, FxHashSet};

use super::StatementRepair;
use crate::ast::Value;
use crate::engine::State;
use crate::error::Result;
use crate::instance::{RepairProblem, TupleId};
use crate::milp::{LiteralKey, LiteralVar, VarId};
use crate::translator::Translation;

/// Everything read back from one assignment
#[derive(Debug)]
pub(super) struct Decoded {
    pub(super) statements: Vec<StatementRepair>,
    pub(super) objective: f64,
    pub(super) timeline: Vec<State>,
}

pub(super) fn decode(
    problem: &RepairProblem,
    translation: &Translation,
    assignment: &[f64],
    flip_weight: f64,
) -> Result<Decoded> {
    let factory = translation.factory();
    let codec = translation.codec();
    let reference = translation.reference();
    let units = |v: VarId| assignment.get(v.index()).copied().unwrap_or(0.0).round() as i64;
    let repairable: FxHashMap<LiteralKey, &LiteralVar> = factory
        .repairable_literals()
        .iter()
        .map(|lit| (lit.key, lit))
        .collect();

    let mut objective = 0.0;
    let mut statements = Vec::with_capacity(problem.log().len());
    for (query, original) in problem.log().iter().enumerate() {
        let sites = original.literal_sites();
        let mut values = Vec::with_capacity(sites.len());
        let mut changed = false;
        for (ordinal, site) in sites.iter().enumerate() {
            let key = LiteralKey { query, ordinal };
            let value = match repairable.get(&key) {
                Some(lit) if units(lit.var) != lit.original => {
                    let repaired = units(lit.var);
                    changed = true;
                    objective += if lit.text {
                        1.0
                    } else {
                        (repaired - lit.original).abs() as f64
                            / codec.domain(lit.attr).units_per_value()
                    };
                    codec.decode_literal(lit.attr, repaired, site.role)
                }
                _ => site.literal.value().clone(),
            };
            values.push(value);
        }
        let repaired = original.with_literal_values(&values)?;

        let affected: Vec<TupleId> = factory
            .selections(query)
            .iter()
            .filter(|(_, x)| x.value(assignment))
            .map(|&(tuple, _)| tuple)
            .collect();
        let before: FxHashSet<TupleId> = reference.affected(query).iter().copied().collect();
        let after: FxHashSet<TupleId> = affected.iter().copied().collect();
        objective += flip_weight * before.symmetric_difference(&after).count() as f64;

        statements.push(StatementRepair {
            original: original.clone(),
            repaired,
            changed,
            noop: affected.is_empty() && !before.is_empty(),
            affected,
        });
    }

    Ok(Decoded {
        statements,
        objective,
        timeline: timeline(problem, translation, assignment),
    })
}

/// Decodes every cell of every state
fn timeline(problem: &RepairProblem, translation: &Translation, assignment: &[f64]) -> Vec<State> {
    let history = translation.history();
    let codec = translation.codec();
    let width = problem.schema().len();
    (0..history.num_states())
        .map(|state| {
            history
                .tuples()
                .iter()
                .filter(|span| span.born <= state)
                .map(|span| {
                    let row: Vec<Value> = (0..width)
                        .map(|attr| match translation.cell(state, span.id, attr) {
                            Some(expr) => {
                                codec.decode(attr, expr.evaluate(assignment).round() as i64)
                            }
                            None => Value::Ghost,
                        })
                        .collect();
                    (span.id, row)
                })
                .collect()
        })
        .collect()
}
