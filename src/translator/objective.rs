//! Minimal-edit objective
//!
//! `Σ deviation(literal) + w · Σ |x[q,t] − x⁰[q,t]|`, where `x⁰` is the
//! targeting observed when replaying the original log. Numeric deviations
//! are measured in value units, so a literal moved from 10 to 20 costs 10
//! whatever its scale; a changed text literal costs 1.

use rustc_hash::FxHashSet;

use super::Encoder;
use crate::engine::Trace;
use crate::milp::{LinExpr, Sense, VarKind};

impl Encoder<'_> {
    pub(super) fn encode_objective(&mut self, reference: &Trace, flip_weight: f64) {
        let literals = self.factory.repairable_literals().to_vec();
        for lit in literals {
            let var = self.model.variable(lit.var);
            let original = lit.original as f64;
            let reach = (var.upper() - original)
                .abs()
                .max((original - var.lower()).abs());
            let drift = LinExpr::var(lit.var) - LinExpr::constant(original);
            let name = format!("dev_q{}_{}", lit.key.query, lit.key.ordinal);

            if lit.text {
                let changed = self
                    .factory
                    .alloc_deviation(&mut self.model, lit.key, VarKind::Binary, 1.0);
                self.model.constrain(
                    format!("{name}_up"),
                    drift.clone(),
                    Sense::Le,
                    LinExpr::term(changed, reach),
                );
                self.model.constrain(
                    format!("{name}_down"),
                    -drift,
                    Sense::Le,
                    LinExpr::term(changed, reach),
                );
                self.model.add_objective(LinExpr::var(changed));
            } else {
                let dev = self.factory.alloc_deviation(
                    &mut self.model,
                    lit.key,
                    VarKind::Continuous,
                    reach,
                );
                self.model
                    .constrain(format!("{name}_up"), LinExpr::var(dev), Sense::Ge, drift.clone());
                self.model
                    .constrain(format!("{name}_down"), LinExpr::var(dev), Sense::Ge, -drift);
                let per_unit = 1.0 / self.codec.domain(lit.attr).units_per_value();
                self.model.add_objective(LinExpr::term(dev, per_unit));
            }
        }

        if flip_weight == 0.0 {
            return;
        }
        for query in 0..self.history.num_statements() {
            let original: FxHashSet<_> = reference.affected(query).iter().copied().collect();
            for &(tuple, x) in self.factory.selections(query) {
                let flip = if original.contains(&tuple) {
                    LinExpr::constant(1.0) - x.expr()
                } else {
                    x.expr()
                };
                self.model.add_objective(flip * flip_weight);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{CompareOp, Condition, Literal, SetExpr, Statement};
    use crate::instance::{Attribute, Database, RepairProblem, Schema, TupleId};
    use crate::milp::{LiteralKey, VarKind};
    use crate::translator::Translator;

    fn problem(log: Vec<Statement>) -> RepairProblem {
        let schema = Schema::new(
            "T",
            vec![Attribute::decimal("p", 0.0, 100.0, 2), Attribute::text("tag")],
        )
        .unwrap();
        let mut db = Database::new(schema);
        db.insert(TupleId(1), vec![5.0.into(), "a".into()]).unwrap();
        db.insert(TupleId(2), vec![50.0.into(), "b".into()]).unwrap();
        RepairProblem::new(db, log, vec![])
    }

    #[test]
    fn numeric_deviation_is_weighted_per_value_unit() {
        let log = vec![Statement::update(
            "T",
            [("p", SetExpr::literal(Literal::repairable(1.5)))],
            vec![],
        )];
        let translation = Translator::translate(&problem(log), 0.0).unwrap();
        let key = LiteralKey { query: 0, ordinal: 0 };
        let dev = translation.factory().deviation(key).unwrap();
        assert_eq!(translation.model().variable(dev).kind(), VarKind::Continuous);
        // 1.5 at scale 2 is 150 units; the domain reaches 10000
        assert_eq!(translation.model().variable(dev).upper(), 9850.0);
        assert!(translation
            .model()
            .objective()
            .terms()
            .iter()
            .any(|&(v, c)| v == dev && (c - 0.01).abs() < 1e-12));
    }

    #[test]
    fn text_deviation_counts_changes() {
        let log = vec![Statement::delete(
            "T",
            vec![Condition::new("tag", CompareOp::Eq, Literal::repairable("b"))],
        )];
        let translation = Translator::translate(&problem(log), 2.0).unwrap();
        let key = LiteralKey { query: 0, ordinal: 0 };
        let changed = translation.factory().deviation(key).unwrap();
        assert_eq!(translation.model().variable(changed).kind(), VarKind::Binary);

        // t2 was deleted originally: its flip term is w·(1 − x), so the
        // objective carries the constant w and a −w coefficient on x
        let objective = translation.model().objective();
        assert_eq!(objective.constant_part(), 2.0);
        assert!(objective.terms().iter().any(|&(_, c)| c == -2.0));
        assert!(objective.terms().iter().any(|&(v, c)| v == changed && c == 1.0));
    }
}
