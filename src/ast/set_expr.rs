//! Right-hand sides of assignments

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{check_literal, Literal};
use crate::instance::{AttrType, Attribute, Schema};

/// A linear expression over the row being written
///
/// Only `+` and `-` are allowed: once a literal becomes a decision variable,
/// products would no longer be linear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetExpr {
    /// Constant
    Literal(Literal),
    /// Current value of an attribute of the same row
    Attribute(String),
    /// Sum
    Add(Box<SetExpr>, Box<SetExpr>),
    /// Difference
    Sub(Box<SetExpr>, Box<SetExpr>),
}

impl SetExpr {
    /// Creates a literal expression
    pub fn literal(literal: Literal) -> Self {
        SetExpr::Literal(literal)
    }

    /// Creates an attribute reference
    pub fn attribute(name: impl Into<String>) -> Self {
        SetExpr::Attribute(name.into())
    }

    /// Returns `self + other`
    pub fn plus(self, other: SetExpr) -> Self {
        SetExpr::Add(Box::new(self), Box::new(other))
    }

    /// Returns `self - other`
    pub fn minus(self, other: SetExpr) -> Self {
        SetExpr::Sub(Box::new(self), Box::new(other))
    }

    /// Number of literals in the expression
    pub fn literal_count(&self) -> usize {
        let mut count = 0;
        self.for_each_literal(&mut |_| count += 1);
        count
    }

    /// Visits literals depth-first, left to right
    pub(crate) fn for_each_literal<'a>(&'a self, f: &mut impl FnMut(&'a Literal)) {
        match self {
            SetExpr::Literal(l) => f(l),
            SetExpr::Attribute(_) => {}
            SetExpr::Add(l, r) | SetExpr::Sub(l, r) => {
                l.for_each_literal(f);
                r.for_each_literal(f);
            }
        }
    }

    /// Rebuilds the expression, replacing literals in visiting order
    pub(crate) fn map_literals(&self, f: &mut impl FnMut(&Literal) -> Literal) -> SetExpr {
        match self {
            SetExpr::Literal(l) => SetExpr::Literal(f(l)),
            SetExpr::Attribute(a) => SetExpr::Attribute(a.clone()),
            SetExpr::Add(l, r) => {
                let l = l.map_literals(f);
                SetExpr::Add(Box::new(l), Box::new(r.map_literals(f)))
            }
            SetExpr::Sub(l, r) => {
                let l = l.map_literals(f);
                SetExpr::Sub(Box::new(l), Box::new(r.map_literals(f)))
            }
        }
    }

    /// Checks that the expression can be written to `target`
    ///
    /// Arithmetic is numeric only, and every referenced attribute must share
    /// the target's scale so the encoding stays integral.
    pub(crate) fn type_check(
        &self,
        schema: &Schema,
        target: &Attribute,
    ) -> std::result::Result<(), String> {
        match self {
            SetExpr::Literal(l) => check_literal(l, &target.ty, &target.name),
            SetExpr::Attribute(name) => {
                let source = schema
                    .attribute(name)
                    .ok_or_else(|| format!("unknown attribute {name} in assignment"))?;
                match (&source.ty, &target.ty) {
                    (AttrType::Text, AttrType::Text) => Ok(()),
                    (AttrType::Numeric { scale: a, .. }, AttrType::Numeric { scale: b, .. })
                        if a == b =>
                    {
                        Ok(())
                    }
                    _ => Err(format!(
                        "{name} cannot be assigned to {}: types or scales differ",
                        target.name
                    )),
                }
            }
            SetExpr::Add(l, r) | SetExpr::Sub(l, r) => {
                if target.ty.is_text() {
                    return Err(format!("arithmetic on text attribute {}", target.name));
                }
                l.type_check(schema, target)?;
                r.type_check(schema, target)
            }
        }
    }
}

impl fmt::Display for SetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetExpr::Literal(l) => write!(f, "{l}"),
            SetExpr::Attribute(a) => f.write_str(a),
            SetExpr::Add(l, r) => write!(f, "{l} + {}", Parenthesized(r)),
            SetExpr::Sub(l, r) => write!(f, "{l} - {}", Parenthesized(r)),
        }
    }
}

struct Parenthesized<'a>(&'a SetExpr);

impl fmt::Display for Parenthesized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            SetExpr::Add(..) | SetExpr::Sub(..) => write!(f, "({})", self.0),
            other => write!(f, "{other}"),
        }
    }
}
