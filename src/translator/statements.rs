//! Per-statement constraint groups
//!
//! Statement `q` reads state `q` and writes state `q + 1`. For UPDATE and
//! DELETE every tuple existing before the statement gets a predicate
//! indicator `s` (the conjunction of its comparisons plus "not deleted") and
//! a targeting indicator `x = s`. Written values go through
//! `t = x·μ + (1 − x)·previous`; deletion writes the ghost sentinel instead of
//! `μ` and adds `x` to the ghost flag. INSERT targets only the tuple it
//! creates.

use super::Encoder;
use crate::ast::{SetExpr, Statement, StatementKind};
use crate::error::{RepairError, Result};
use crate::instance::TupleId;
use crate::milp::linearize::{self, Indicator};
use crate::milp::{AttrKey, CellKey, Interval, LinExpr, LiteralKey, Operand, Sense};

impl Encoder<'_> {
    pub(super) fn encode_statement(&mut self, query: usize, stmt: &Statement) -> Result<()> {
        let operands = self.resolve_literals(query, stmt)?;
        match stmt.kind() {
            StatementKind::Insert => self.encode_insert(query, stmt, &operands),
            StatementKind::Update => self.encode_update(query, stmt, &operands),
            StatementKind::Delete => self.encode_delete(query, stmt, &operands),
        }
    }

    /// Turns every literal into a constant or a decision variable, once
    fn resolve_literals(&mut self, query: usize, stmt: &Statement) -> Result<Vec<Operand>> {
        let sites = stmt.literal_sites();
        let mut operands = Vec::with_capacity(sites.len());
        for (ordinal, site) in sites.iter().enumerate() {
            let attr = self.attr_index(site.attribute)?;
            let units = self
                .codec
                .encode_literal(attr, site.literal.value(), site.role)?;
            let domain = self.codec.literal_domain(attr, site.role);
            operands.push(self.factory.resolve_literal(
                &mut self.model,
                LiteralKey { query, ordinal },
                attr,
                self.codec.domain(attr).text,
                units,
                site.literal.is_repairable(),
                domain,
            ));
        }
        Ok(operands)
    }

    fn encode_insert(&mut self, query: usize, stmt: &Statement, operands: &[Operand]) -> Result<()> {
        let state = query + 1;
        let created = stmt
            .inserted_tuple()
            .ok_or_else(|| RepairError::MalformedStatement {
                index: query,
                reason: "INSERT without a tuple id".to_string(),
            })?;

        let existing: Vec<TupleId> = self.history.candidates(query).map(|s| s.id).collect();
        for tuple in existing {
            let key = CellKey { state, tuple };
            self.factory
                .record_selection(key, Indicator::Const(false), Indicator::Const(false));
            self.carry_forward(state, tuple);
        }

        let key = CellKey { state, tuple: created };
        self.factory
            .record_selection(key, Indicator::Const(true), Indicator::Const(true));
        self.ghosts.insert(key, LinExpr::constant(0.0));
        for (assignment, operand) in stmt.assignment().iter().zip(operands) {
            let attr = self.attr_index(&assignment.attribute)?;
            self.cells.insert(
                AttrKey {
                    state,
                    tuple: created,
                    attr,
                },
                operand.expr(),
            );
        }
        Ok(())
    }

    fn encode_update(&mut self, query: usize, stmt: &Statement, operands: &[Operand]) -> Result<()> {
        let state = query + 1;
        let (conditions, values) = operands.split_at(stmt.predicate().len());
        let candidates: Vec<TupleId> = self.history.candidates(query).map(|s| s.id).collect();

        for tuple in candidates {
            let x = self.selector(query, stmt, tuple, conditions)?;
            self.factory
                .record_selection(CellKey { state, tuple }, x, x);
            if x == Indicator::Const(false) {
                self.carry_forward(state, tuple);
                continue;
            }
            let flag = self.ghost(query, tuple);
            self.ghosts.insert(CellKey { state, tuple }, flag);

            let mut rest = values.iter().copied();
            let mut written = vec![None; self.schema.len()];
            for assignment in stmt.assignment() {
                let attr = self.attr_index(&assignment.attribute)?;
                written[attr] = Some(self.linear(&assignment.expr, query, tuple, &mut rest)?);
            }
            for (attr, mu) in written.into_iter().enumerate() {
                let key = AttrKey { state, tuple, attr };
                let value = match mu {
                    Some(mu) => self.select_value(key, x, &mu),
                    None => self.cell(query, tuple, attr),
                };
                self.cells.insert(key, value);
            }
        }
        Ok(())
    }

    fn encode_delete(&mut self, query: usize, stmt: &Statement, operands: &[Operand]) -> Result<()> {
        let state = query + 1;
        let candidates: Vec<TupleId> = self.history.candidates(query).map(|s| s.id).collect();

        for tuple in candidates {
            let x = self.selector(query, stmt, tuple, operands)?;
            self.factory
                .record_selection(CellKey { state, tuple }, x, x);
            if x == Indicator::Const(false) {
                self.carry_forward(state, tuple);
                continue;
            }
            let flag = self.ghost(query, tuple) + x.expr();
            self.ghosts.insert(CellKey { state, tuple }, flag);

            for attr in 0..self.schema.len() {
                let key = AttrKey { state, tuple, attr };
                let ghost = self.codec.domain(attr).ghost() as f64;
                let value = match x {
                    Indicator::Const(_) => LinExpr::constant(ghost),
                    Indicator::Var(_) | Indicator::Not(_) => {
                        let name = &self.schema.attributes()[attr].name;
                        let previous = self.cell(query, tuple, attr);
                        let v = self
                            .factory
                            .alloc_v(&mut self.model, key, name, &x.expr(), &previous);
                        let range = Interval::new(self.codec.domain(attr).lo as f64, ghost);
                        let t = self.factory.alloc_t(&mut self.model, key, name, range);
                        self.model.constrain(
                            format!("{}_def", self.model.variable(t).name()),
                            LinExpr::var(t),
                            Sense::Eq,
                            x.expr() * ghost + LinExpr::var(v),
                        );
                        LinExpr::var(t)
                    }
                };
                self.cells.insert(key, value);
            }
        }
        Ok(())
    }

    /// Indicator that `tuple` matches the predicate of statement `query`
    /// against its values at state `query`
    fn selector(
        &mut self,
        query: usize,
        stmt: &Statement,
        tuple: TupleId,
        operands: &[Operand],
    ) -> Result<Indicator> {
        let prefix = format!("s_q{}_{tuple}", query + 1);
        let alive = LinExpr::constant(1.0) - self.ghost(query, tuple);
        if alive.is_constant() && alive.constant_part() < 0.5 {
            return Ok(Indicator::Const(false));
        }

        let mut conjuncts = vec![alive];
        for (i, (cond, operand)) in stmt.predicate().iter().zip(operands).enumerate() {
            let attr = self.attr_index(&cond.attribute)?;
            let lhs = self.cell(query, tuple, attr);
            let holds = linearize::compare(
                &mut self.model,
                &format!("{prefix}_c{i}"),
                &lhs,
                cond.op,
                &operand.expr(),
            );
            if holds == Indicator::Const(false) {
                return Ok(Indicator::Const(false));
            }
            conjuncts.push(holds.expr());
        }
        Ok(linearize::conjunction(&mut self.model, &prefix, &conjuncts))
    }

    /// Value written by an UPDATE: `μ` when selected, the old value otherwise
    fn select_value(&mut self, key: AttrKey, x: Indicator, mu: &LinExpr) -> LinExpr {
        let name = self.schema.attributes()[key.attr].name.clone();
        let domain = self.codec.domain(key.attr).interval();
        match x {
            Indicator::Const(false) => self.cell(key.state - 1, key.tuple, key.attr),
            Indicator::Const(true) => {
                let t = self.factory.alloc_t(&mut self.model, key, &name, domain);
                self.model.constrain(
                    format!("{}_def", self.model.variable(t).name()),
                    LinExpr::var(t),
                    Sense::Eq,
                    mu.clone(),
                );
                LinExpr::var(t)
            }
            Indicator::Var(_) | Indicator::Not(_) => {
                let previous = self.cell(key.state - 1, key.tuple, key.attr);
                let selected = x.expr();
                let u = self
                    .factory
                    .alloc_u(&mut self.model, key, &name, &selected, mu, domain);
                let v = self
                    .factory
                    .alloc_v(&mut self.model, key, &name, &selected, &previous);
                let before = self.model.interval(&previous);
                let range = Interval::new(domain.lo.min(before.lo), domain.hi.max(before.hi));
                let t = self.factory.alloc_t(&mut self.model, key, &name, range);
                self.model.constrain(
                    format!("{}_def", self.model.variable(t).name()),
                    LinExpr::var(t),
                    Sense::Eq,
                    LinExpr::var(u) + LinExpr::var(v),
                );
                LinExpr::var(t)
            }
        }
    }

    /// Linear form of an assignment's right-hand side over the row at `state`
    fn linear(
        &self,
        expr: &SetExpr,
        state: usize,
        tuple: TupleId,
        operands: &mut impl Iterator<Item = Operand>,
    ) -> Result<LinExpr> {
        Ok(match expr {
            SetExpr::Literal(_) => operands
                .next()
                .ok_or_else(|| {
                    RepairError::InvalidArgument("assignment literal without an operand".to_string())
                })?
                .expr(),
            SetExpr::Attribute(name) => self.cell(state, tuple, self.attr_index(name)?),
            SetExpr::Add(l, r) => {
                self.linear(l, state, tuple, operands)? + self.linear(r, state, tuple, operands)?
            }
            SetExpr::Sub(l, r) => {
                self.linear(l, state, tuple, operands)? - self.linear(r, state, tuple, operands)?
            }
        })
    }
}
