//! Reference replay of a statement log
//!
//! Executes a log against D₀ with the semantics the translator encodes:
//! numbers are compared and combined in integer units at their attribute's
//! scale, text compares lexicographically, a deleted row stays in the state
//! with every attribute set to [`Value::Ghost`], and ghost rows never match.
//! A numeric write outside its attribute's domain is a
//! [`RepairError::DomainError`], as the model cannot represent it either.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::ast::{Condition, SetExpr, Statement, StatementKind, Value};
use crate::error::{RepairError, Result};
use crate::instance::{numeric_units, units_to_number, AttrType, Attribute, Database, Schema, TupleId};

/// One database state: rows by tuple id, values in schema order
pub type State = BTreeMap<TupleId, Vec<Value>>;

/// Every state of a replay and the tuples each statement affected
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    states: Vec<State>,
    affected: Vec<Vec<TupleId>>,
}

impl Trace {
    /// Number of states (statements + 1)
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Returns all states; index 0 is D₀
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Returns one state
    pub fn state(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    /// Returns the state after the whole log
    pub fn final_state(&self) -> &State {
        &self.states[self.states.len() - 1]
    }

    /// Tuples statement `query` inserted, updated or deleted, in id order
    pub fn affected(&self, query: usize) -> &[TupleId] {
        self.affected.get(query).map_or(&[], Vec::as_slice)
    }

    /// Returns true if the tuple exists at `state` and has been deleted
    pub fn is_ghost(&self, state: usize, tuple: TupleId) -> bool {
        self.state(state)
            .and_then(|s| s.get(&tuple))
            .is_some_and(|row| is_ghost_row(row))
    }
}

/// Replays `log` against `database`
///
/// # Errors
/// Returns [`RepairError::MalformedStatement`] for a statement that does not
/// fit the schema or re-inserts an existing id, and
/// [`RepairError::DomainError`] for a literal that cannot be represented at
/// its attribute's precision or a numeric write outside the attribute's domain
pub fn replay(database: &Database, log: &[Statement]) -> Result<Trace> {
    let schema = database.schema();
    let mut current: State = database.rows().map(|(id, row)| (id, row.to_vec())).collect();
    let mut states = Vec::with_capacity(log.len() + 1);
    let mut affected = Vec::with_capacity(log.len());
    states.push(current.clone());

    for (q, stmt) in log.iter().enumerate() {
        stmt.validate(q, schema)?;
        let hit = match stmt.kind() {
            StatementKind::Insert => {
                let id = stmt.inserted_tuple().ok_or_else(|| RepairError::MalformedStatement {
                    index: q,
                    reason: "INSERT without a tuple id".to_string(),
                })?;
                if current.contains_key(&id) {
                    return Err(RepairError::MalformedStatement {
                        index: q,
                        reason: format!("INSERT reuses tuple id {id}"),
                    });
                }
                let empty = vec![Value::Ghost; schema.len()];
                let mut row = empty.clone();
                for a in stmt.assignment() {
                    let (idx, attr) = lookup(schema, &a.attribute)?;
                    row[idx] = evaluate(schema, &a.expr, attr, &empty)?;
                }
                current.insert(id, row);
                vec![id]
            }
            StatementKind::Update | StatementKind::Delete => {
                let mut hit = Vec::new();
                for (id, row) in current.iter_mut() {
                    if !matches(schema, stmt.predicate(), row)? {
                        continue;
                    }
                    hit.push(*id);
                    if stmt.kind() == StatementKind::Delete {
                        row.fill(Value::Ghost);
                        continue;
                    }
                    let before = row.clone();
                    for a in stmt.assignment() {
                        let (idx, attr) = lookup(schema, &a.attribute)?;
                        row[idx] = evaluate(schema, &a.expr, attr, &before)?;
                    }
                }
                hit
            }
        };
        affected.push(hit);
        states.push(current.clone());
    }

    Ok(Trace { states, affected })
}

fn is_ghost_row(row: &[Value]) -> bool {
    row.first().is_some_and(Value::is_ghost)
}

fn lookup<'s>(schema: &'s Schema, name: &str) -> Result<(usize, &'s Attribute)> {
    schema
        .index_of(name)
        .map(|i| (i, &schema.attributes()[i]))
        .ok_or_else(|| RepairError::InvalidArgument(format!("unknown attribute {name}")))
}

fn matches(schema: &Schema, predicate: &[Condition], row: &[Value]) -> Result<bool> {
    if is_ghost_row(row) {
        return Ok(false);
    }
    for cond in predicate {
        let (idx, attr) = lookup(schema, &cond.attribute)?;
        let scale = match attr.ty {
            AttrType::Numeric { scale, .. } => scale,
            AttrType::Text => 0,
        };
        let literal = cond.literal.value();
        let ordering = compare_values(&row[idx], literal, scale).ok_or_else(|| {
            RepairError::DomainError(format!(
                "cannot compare {} with {literal} on {}",
                row[idx], attr.name
            ))
        })?;
        if !cond.op.holds(ordering) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn units(value: f64, scale: u32, attr: &Attribute) -> Result<i64> {
    numeric_units(value, scale).ok_or_else(|| {
        RepairError::DomainError(format!(
            "{value} cannot be represented at the precision of {}",
            attr.name
        ))
    })
}

fn evaluate(schema: &Schema, expr: &SetExpr, target: &Attribute, row: &[Value]) -> Result<Value> {
    match &target.ty {
        AttrType::Text => match expr {
            SetExpr::Literal(l) => Ok(l.value().clone()),
            SetExpr::Attribute(name) => {
                let (idx, _) = lookup(schema, name)?;
                Ok(row[idx].clone())
            }
            SetExpr::Add(..) | SetExpr::Sub(..) => Err(RepairError::DomainError(format!(
                "arithmetic on text attribute {}",
                target.name
            ))),
        },
        AttrType::Numeric { min, max, scale } => {
            let total = evaluate_units(schema, expr, target, *scale, row)?;
            let value = units_to_number(total, *scale);
            if total < units(*min, *scale, target)? || total > units(*max, *scale, target)? {
                return Err(RepairError::DomainError(format!(
                    "{value} written to {} lies outside [{min}, {max}]",
                    target.name
                )));
            }
            Ok(Value::Number(value))
        }
    }
}

fn evaluate_units(
    schema: &Schema,
    expr: &SetExpr,
    target: &Attribute,
    scale: u32,
    row: &[Value],
) -> Result<i64> {
    let number = |value: &Value| {
        value.as_number().ok_or_else(|| {
            RepairError::DomainError(format!("{value} is not a number in {}", target.name))
        })
    };
    match expr {
        SetExpr::Literal(l) => units(number(l.value())?, scale, target),
        SetExpr::Attribute(name) => {
            let (idx, _) = lookup(schema, name)?;
            units(number(&row[idx])?, scale, target)
        }
        SetExpr::Add(l, r) => Ok(evaluate_units(schema, l, target, scale, row)?
            + evaluate_units(schema, r, target, scale, row)?),
        SetExpr::Sub(l, r) => Ok(evaluate_units(schema, l, target, scale, row)?
            - evaluate_units(schema, r, target, scale, row)?),
    }
}

/// Orders two values the way the encoding does; `None` across types, for
/// ghosts, or below the attribute's precision
fn compare_values(a: &Value, b: &Value, scale: u32) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            Some(numeric_units(*x, scale)?.cmp(&numeric_units(*y, scale)?))
        }
        (Value::Text(x), Value::Text(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}
