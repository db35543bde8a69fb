//! Decision variable allocation
//!
//! Allocates the t, x, s, u and v variables keyed by (state, tuple[, attribute])
//! plus one variable per repairable literal, and keeps the indexes the
//! objective builder and the solution decoder read back.

use rustc_hash::FxHashMap;

use super::linearize::{self, Indicator};
use super::{Interval, LinExpr, MilpModel, VarId, VarKind};
use crate::instance::TupleId;

/// A (state, tuple) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    /// State index (0 = D₀, q + 1 = after statement q)
    pub state: usize,
    /// Tuple id
    pub tuple: TupleId,
}

/// A (state, tuple, attribute) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrKey {
    /// State index
    pub state: usize,
    /// Tuple id
    pub tuple: TupleId,
    /// Attribute position in the schema
    pub attr: usize,
}

impl AttrKey {
    /// The (state, tuple) part
    pub fn cell(self) -> CellKey {
        CellKey {
            state: self.state,
            tuple: self.tuple,
        }
    }
}

/// A literal of the log: statement index and position among its literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiteralKey {
    /// Statement index
    pub query: usize,
    /// Position in [`crate::ast::Statement::literal_sites`]
    pub ordinal: usize,
}

/// A literal resolved to either a constant or a decision variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Fixed literal, in integer units
    Const(f64),
    /// Repairable literal
    Var(VarId),
}

impl Operand {
    /// The operand as a linear expression
    pub fn expr(&self) -> LinExpr {
        match *self {
            Operand::Const(c) => LinExpr::constant(c),
            Operand::Var(v) => LinExpr::var(v),
        }
    }
}

/// Bookkeeping for one repairable literal
#[derive(Debug, Clone, Copy)]
pub struct LiteralVar {
    /// Which literal
    pub key: LiteralKey,
    /// Its decision variable
    pub var: VarId,
    /// Value as written, in integer units
    pub original: i64,
    /// Attribute giving the literal its domain
    pub attr: usize,
    /// True for text literals (deviation counts changes, not distance)
    pub text: bool,
}

/// Allocates and indexes decision variables for one repair run
#[derive(Debug, Default)]
pub struct VarFactory {
    t_vars: FxHashMap<AttrKey, VarId>,
    x_vars: FxHashMap<CellKey, Indicator>,
    s_vars: FxHashMap<CellKey, Indicator>,
    u_vars: FxHashMap<AttrKey, VarId>,
    v_vars: FxHashMap<AttrKey, VarId>,
    operands: FxHashMap<LiteralKey, Operand>,
    repairable: Vec<LiteralVar>,
    deviations: FxHashMap<LiteralKey, VarId>,
    selections: Vec<Vec<(TupleId, Indicator)>>,
}

impl VarFactory {
    /// Creates a factory for a log of `num_statements` statements
    pub fn new(num_statements: usize) -> Self {
        Self {
            selections: vec![Vec::new(); num_statements],
            ..Self::default()
        }
    }

    /// Allocates `t[key]`, the value of an attribute right after a statement
    pub fn alloc_t(
        &mut self,
        model: &mut MilpModel,
        key: AttrKey,
        attr_name: &str,
        range: Interval,
    ) -> VarId {
        let v = model.add_variable(
            format!("t_q{}_{}_{attr_name}", key.state, key.tuple),
            VarKind::Continuous,
            range.lo,
            range.hi,
        );
        self.t_vars.insert(key, v);
        v
    }

    /// Allocates `u[key] = x · μ`, the selected new value
    pub fn alloc_u(
        &mut self,
        model: &mut MilpModel,
        key: AttrKey,
        attr_name: &str,
        x: &LinExpr,
        mu: &LinExpr,
        domain: Interval,
    ) -> VarId {
        let name = format!("u_q{}_{}_{attr_name}", key.state, key.tuple);
        let u = linearize::product(model, &name, x, mu, domain);
        self.u_vars.insert(key, u);
        u
    }

    /// Allocates `v[key] = (1 − x) · previous`, the carried-forward value
    pub fn alloc_v(
        &mut self,
        model: &mut MilpModel,
        key: AttrKey,
        attr_name: &str,
        x: &LinExpr,
        previous: &LinExpr,
    ) -> VarId {
        let name = format!("v_q{}_{}_{attr_name}", key.state, key.tuple);
        let range = model.interval(previous);
        let not_x = LinExpr::constant(1.0) - x.clone();
        let v = linearize::product(model, &name, &not_x, previous, range);
        self.v_vars.insert(key, v);
        v
    }

    /// Records the predicate indicator `s` and targeting indicator `x` of a cell
    pub fn record_selection(&mut self, key: CellKey, s: Indicator, x: Indicator) {
        self.s_vars.insert(key, s);
        self.x_vars.insert(key, x);
        if let Some(per_query) = key.state.checked_sub(1).and_then(|q| self.selections.get_mut(q)) {
            per_query.push((key.tuple, x));
        }
    }

    /// Resolves a literal once: fixed literals become constants, repairable
    /// ones an integer variable over `domain`
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_literal(
        &mut self,
        model: &mut MilpModel,
        key: LiteralKey,
        attr: usize,
        text: bool,
        units: i64,
        repairable: bool,
        domain: Interval,
    ) -> Operand {
        let operand = if repairable {
            let var = model.add_variable(
                format!("lit_q{}_{}", key.query, key.ordinal),
                VarKind::Integer,
                domain.lo,
                domain.hi,
            );
            self.repairable.push(LiteralVar {
                key,
                var,
                original: units,
                attr,
                text,
            });
            Operand::Var(var)
        } else {
            Operand::Const(units as f64)
        };
        self.operands.insert(key, operand);
        operand
    }

    /// Allocates the deviation variable of a repairable literal
    pub fn alloc_deviation(
        &mut self,
        model: &mut MilpModel,
        key: LiteralKey,
        kind: VarKind,
        upper: f64,
    ) -> VarId {
        let d = model.add_variable(
            format!("dev_q{}_{}", key.query, key.ordinal),
            kind,
            0.0,
            upper,
        );
        self.deviations.insert(key, d);
        d
    }

    /// Returns `t[key]` if one was allocated
    pub fn t_var(&self, key: AttrKey) -> Option<VarId> {
        self.t_vars.get(&key).copied()
    }

    /// Returns `u[key]` if one was allocated
    pub fn u_var(&self, key: AttrKey) -> Option<VarId> {
        self.u_vars.get(&key).copied()
    }

    /// Returns `v[key]` if one was allocated
    pub fn v_var(&self, key: AttrKey) -> Option<VarId> {
        self.v_vars.get(&key).copied()
    }

    /// Returns the targeting indicator of a cell
    pub fn x(&self, key: CellKey) -> Option<Indicator> {
        self.x_vars.get(&key).copied()
    }

    /// Returns the predicate indicator of a cell
    pub fn s(&self, key: CellKey) -> Option<Indicator> {
        self.s_vars.get(&key).copied()
    }

    /// Returns the resolved operand of a literal
    pub fn operand(&self, key: LiteralKey) -> Option<Operand> {
        self.operands.get(&key).copied()
    }

    /// Returns the deviation variable of a repairable literal
    pub fn deviation(&self, key: LiteralKey) -> Option<VarId> {
        self.deviations.get(&key).copied()
    }

    /// Returns every repairable literal in allocation order
    pub fn repairable_literals(&self) -> &[LiteralVar] {
        &self.repairable
    }

    /// Returns `(tuple, x)` for every tuple statement `query` could affect
    pub fn selections(&self, query: usize) -> &[(TupleId, Indicator)] {
        self.selections.get(query).map_or(&[], Vec::as_slice)
    }

    /// Number of allocated `t` variables
    pub fn num_t_vars(&self) -> usize {
        self.t_vars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_resolve_once_by_tag() {
        let mut model = MilpModel::new();
        let mut factory = VarFactory::new(1);
        let fixed = LiteralKey { query: 0, ordinal: 0 };
        let open = LiteralKey { query: 0, ordinal: 1 };

        let a = factory.resolve_literal(&mut model, fixed, 0, false, 5, false, Interval::new(0.0, 9.0));
        let b = factory.resolve_literal(&mut model, open, 0, false, 7, true, Interval::new(0.0, 9.0));

        assert_eq!(a, Operand::Const(5.0));
        let Operand::Var(var) = b else {
            panic!("repairable literal should be a variable");
        };
        assert_eq!(model.variable(var).kind(), VarKind::Integer);
        assert_eq!(model.variable(var).name(), "lit_q0_1");
        assert_eq!(factory.repairable_literals().len(), 1);
        assert_eq!(factory.repairable_literals()[0].original, 7);
        assert_eq!(factory.operand(fixed), Some(Operand::Const(5.0)));
    }

    #[test]
    fn selections_are_grouped_by_statement() {
        let mut factory = VarFactory::new(2);
        let key = |state, id| CellKey {
            state,
            tuple: TupleId(id),
        };
        factory.record_selection(key(1, 1), Indicator::Const(true), Indicator::Const(true));
        factory.record_selection(key(2, 1), Indicator::Const(false), Indicator::Const(false));
        factory.record_selection(key(2, 2), Indicator::Const(true), Indicator::Const(true));

        assert_eq!(factory.selections(0).len(), 1);
        assert_eq!(factory.selections(1).len(), 2);
        assert!(factory.selections(5).is_empty());
        assert_eq!(factory.x(key(2, 2)), Some(Indicator::Const(true)));
    }

    #[test]
    fn t_vars_are_named_by_key() {
        let mut model = MilpModel::new();
        let mut factory = VarFactory::new(1);
        let key = AttrKey {
            state: 1,
            tuple: TupleId(3),
            attr: 0,
        };
        let t = factory.alloc_t(&mut model, key, "x", Interval::new(0.0, 11.0));
        assert_eq!(model.variable(t).name(), "t_q1_t3_x");
        assert_eq!(factory.t_var(key), Some(t));
        assert_eq!(factory.num_t_vars(), 1);
    }
}
