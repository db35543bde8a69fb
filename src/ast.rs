//! Statement model
//!
//! A [`Statement`] is one parsed entry of the query log. Only single-relation
//! INSERT, UPDATE with a conjunctive predicate, and DELETE with a conjunctive
//! predicate are modeled. Every constant in a statement is a [`Literal`],
//! tagged as either fixed or open to repair.

mod set_expr;

pub use set_expr::SetExpr;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{RepairError, Result};
use crate::instance::{AttrType, Schema, TupleId};

/// A cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric value
    Number(f64),
    /// String value
    Text(String),
    /// Sentinel held by every attribute of a deleted tuple
    Ghost,
}

impl Value {
    /// Returns the number, if this is a numeric value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for the ghost sentinel
    pub fn is_ghost(&self) -> bool {
        matches!(self, Value::Ghost)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Ghost => write!(f, "GHOST"),
        }
    }
}

/// A constant appearing in a statement
///
/// The tag decides, once, whether the translator treats the constant as a
/// plain number or as a bounded decision variable with a deviation cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Kept as written
    Fixed(Value),
    /// May be changed by the repair
    Repairable(Value),
}

impl Literal {
    /// Creates a fixed literal
    pub fn fixed(value: impl Into<Value>) -> Self {
        Literal::Fixed(value.into())
    }

    /// Creates a repairable literal
    pub fn repairable(value: impl Into<Value>) -> Self {
        Literal::Repairable(value.into())
    }

    /// Returns the literal's value
    pub fn value(&self) -> &Value {
        match self {
            Literal::Fixed(v) | Literal::Repairable(v) => v,
        }
    }

    /// Returns true if the literal may be repaired
    pub fn is_repairable(&self) -> bool {
        matches!(self, Literal::Repairable(_))
    }

    /// Returns a literal with the same tag and a new value
    pub fn with_value(&self, value: Value) -> Self {
        match self {
            Literal::Fixed(_) => Literal::Fixed(value),
            Literal::Repairable(_) => Literal::Repairable(value),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// Comparison operators allowed in a predicate conjunct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl CompareOp {
    /// SQL spelling of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Returns whether `left op right` holds given `left.cmp(right)`
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One conjunct of a predicate: `attribute op literal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Attribute compared
    pub attribute: String,
    /// Comparison operator
    pub op: CompareOp,
    /// Constant compared against
    pub literal: Literal,
}

impl Condition {
    /// Creates a new condition
    pub fn new(attribute: impl Into<String>, op: CompareOp, literal: Literal) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            literal,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.op, self.literal)
    }
}

/// `attribute = expr` in a SET clause or VALUES list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Attribute written
    pub attribute: String,
    /// Right-hand side
    pub expr: SetExpr,
}

/// Statement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// INSERT INTO ... VALUES
    Insert,
    /// UPDATE ... SET ... WHERE
    Update,
    /// DELETE FROM ... WHERE
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        })
    }
}

/// How a literal is used inside its statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralRole {
    /// Right-hand side of a predicate conjunct
    Predicate,
    /// The whole value written to an attribute
    Value,
    /// A term inside an arithmetic assignment
    Offset,
}

/// A literal together with the attribute that gives it a domain
#[derive(Debug, Clone, Copy)]
pub struct LiteralSite<'a> {
    /// The literal
    pub literal: &'a Literal,
    /// Attribute compared against or written
    pub attribute: &'a str,
    /// Position kind
    pub role: LiteralRole,
}

/// One entry of the query log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    kind: StatementKind,
    target: String,
    predicate: Vec<Condition>,
    assignment: Vec<Assignment>,
    inserted: Option<TupleId>,
}

impl Statement {
    /// Creates an INSERT producing tuple `tuple`
    pub fn insert<S: Into<String>>(
        target: impl Into<String>,
        tuple: TupleId,
        values: impl IntoIterator<Item = (S, Literal)>,
    ) -> Self {
        Self {
            kind: StatementKind::Insert,
            target: target.into(),
            predicate: Vec::new(),
            assignment: values
                .into_iter()
                .map(|(attribute, literal)| Assignment {
                    attribute: attribute.into(),
                    expr: SetExpr::Literal(literal),
                })
                .collect(),
            inserted: Some(tuple),
        }
    }

    /// Creates an UPDATE; an empty predicate matches every live tuple
    pub fn update<S: Into<String>>(
        target: impl Into<String>,
        assignments: impl IntoIterator<Item = (S, SetExpr)>,
        predicate: Vec<Condition>,
    ) -> Self {
        Self {
            kind: StatementKind::Update,
            target: target.into(),
            predicate,
            assignment: assignments
                .into_iter()
                .map(|(attribute, expr)| Assignment {
                    attribute: attribute.into(),
                    expr,
                })
                .collect(),
            inserted: None,
        }
    }

    /// Creates a DELETE; an empty predicate matches every live tuple
    pub fn delete(target: impl Into<String>, predicate: Vec<Condition>) -> Self {
        Self {
            kind: StatementKind::Delete,
            target: target.into(),
            predicate,
            assignment: Vec::new(),
            inserted: None,
        }
    }

    /// Returns the statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Returns the target relation
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the conjunctive predicate (empty for INSERT)
    pub fn predicate(&self) -> &[Condition] {
        &self.predicate
    }

    /// Returns the assignments (SET clause, or VALUES for INSERT)
    pub fn assignment(&self) -> &[Assignment] {
        &self.assignment
    }

    /// Returns the id of the tuple an INSERT creates
    pub fn inserted_tuple(&self) -> Option<TupleId> {
        self.inserted
    }

    /// Returns every literal with its context, predicate first, then
    /// assignments left to right
    pub fn literal_sites(&self) -> Vec<LiteralSite<'_>> {
        let mut sites: Vec<LiteralSite<'_>> = self
            .predicate
            .iter()
            .map(|c| LiteralSite {
                literal: &c.literal,
                attribute: &c.attribute,
                role: LiteralRole::Predicate,
            })
            .collect();
        for a in &self.assignment {
            let role = match a.expr {
                SetExpr::Literal(_) => LiteralRole::Value,
                _ => LiteralRole::Offset,
            };
            a.expr.for_each_literal(&mut |literal| {
                sites.push(LiteralSite {
                    literal,
                    attribute: &a.attribute,
                    role,
                });
            });
        }
        sites
    }

    /// Returns every literal, in the order of [`Statement::literal_sites`]
    pub fn literals(&self) -> Vec<&Literal> {
        self.literal_sites().into_iter().map(|s| s.literal).collect()
    }

    /// Rebuilds the statement with new literal values, keeping each tag
    ///
    /// # Errors
    /// Returns an error if `values` does not have one entry per literal
    pub fn with_literal_values(&self, values: &[Value]) -> Result<Statement> {
        let expected = self.literal_sites().len();
        if values.len() != expected {
            return Err(RepairError::InvalidArgument(format!(
                "statement has {expected} literals, got {} values",
                values.len()
            )));
        }
        let mut next = values.iter();
        let mut replace = |literal: &Literal| match next.next() {
            Some(v) => literal.with_value(v.clone()),
            None => literal.clone(),
        };
        let predicate = self
            .predicate
            .iter()
            .map(|c| Condition {
                attribute: c.attribute.clone(),
                op: c.op,
                literal: replace(&c.literal),
            })
            .collect();
        let assignment = self
            .assignment
            .iter()
            .map(|a| Assignment {
                attribute: a.attribute.clone(),
                expr: a.expr.map_literals(&mut replace),
            })
            .collect();
        Ok(Statement {
            kind: self.kind,
            target: self.target.clone(),
            predicate,
            assignment,
            inserted: self.inserted,
        })
    }

    /// Checks the statement against the relation schema
    ///
    /// # Errors
    /// Returns [`RepairError::MalformedStatement`] carrying `index`
    pub fn validate(&self, index: usize, schema: &Schema) -> Result<()> {
        self.check(schema)
            .map_err(|reason| RepairError::MalformedStatement { index, reason })
    }

    fn check(&self, schema: &Schema) -> std::result::Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("missing target relation".to_string());
        }
        if self.target != schema.relation() {
            return Err(format!(
                "targets relation {} but the log is for {}",
                self.target,
                schema.relation()
            ));
        }

        for cond in &self.predicate {
            let attr = schema
                .attribute(&cond.attribute)
                .ok_or_else(|| format!("unknown attribute {} in predicate", cond.attribute))?;
            check_literal(&cond.literal, &attr.ty, &cond.attribute)?;
        }

        match self.kind {
            StatementKind::Insert => {
                if !self.predicate.is_empty() {
                    return Err("INSERT cannot carry a predicate".to_string());
                }
                if self.inserted.is_none() {
                    return Err("INSERT without a tuple id".to_string());
                }
                self.check_assignments(schema)?;
                for a in &self.assignment {
                    if !matches!(a.expr, SetExpr::Literal(_)) {
                        return Err(format!("INSERT value for {} is not a literal", a.attribute));
                    }
                }
                if let Some(missing) = schema
                    .attributes()
                    .iter()
                    .find(|attr| !self.assignment.iter().any(|a| a.attribute == attr.name))
                {
                    return Err(format!("INSERT has no value for {}", missing.name));
                }
            }
            StatementKind::Update => {
                if self.inserted.is_some() {
                    return Err("UPDATE cannot create a tuple".to_string());
                }
                if self.assignment.is_empty() {
                    return Err("UPDATE without assignments".to_string());
                }
                self.check_assignments(schema)?;
            }
            StatementKind::Delete => {
                if self.inserted.is_some() {
                    return Err("DELETE cannot create a tuple".to_string());
                }
                if !self.assignment.is_empty() {
                    return Err("DELETE cannot assign values".to_string());
                }
            }
        }
        Ok(())
    }

    fn check_assignments(&self, schema: &Schema) -> std::result::Result<(), String> {
        for (i, a) in self.assignment.iter().enumerate() {
            if self.assignment[..i].iter().any(|b| b.attribute == a.attribute) {
                return Err(format!("attribute {} assigned twice", a.attribute));
            }
            let attr = schema
                .attribute(&a.attribute)
                .ok_or_else(|| format!("unknown attribute {} in assignment", a.attribute))?;
            a.expr.type_check(schema, attr)?;
        }
        Ok(())
    }
}

pub(crate) fn check_literal(
    literal: &Literal,
    ty: &AttrType,
    attribute: &str,
) -> std::result::Result<(), String> {
    match (literal.value(), ty) {
        (Value::Ghost, _) => Err(format!("ghost literal for {attribute}")),
        (Value::Number(_), AttrType::Numeric { .. }) | (Value::Text(_), AttrType::Text) => Ok(()),
        (v, _) => Err(format!("literal {v} does not match the type of {attribute}")),
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatementKind::Insert => {
                let columns: Vec<&str> =
                    self.assignment.iter().map(|a| a.attribute.as_str()).collect();
                let values: Vec<String> =
                    self.assignment.iter().map(|a| a.expr.to_string()).collect();
                return write!(
                    f,
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.target,
                    columns.join(", "),
                    values.join(", ")
                );
            }
            StatementKind::Update => {
                let sets: Vec<String> = self
                    .assignment
                    .iter()
                    .map(|a| format!("{} = {}", a.attribute, a.expr))
                    .collect();
                write!(f, "UPDATE {} SET {}", self.target, sets.join(", "))?;
            }
            StatementKind::Delete => write!(f, "DELETE FROM {}", self.target)?,
        }
        if !self.predicate.is_empty() {
            let conds: Vec<String> = self.predicate.iter().map(|c| c.to_string()).collect();
            write!(f, " WHERE {}", conds.join(" AND "))?;
        }
        Ok(())
    }
}
