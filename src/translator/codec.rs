//! Integer encoding of attribute values
//!
//! Every modeled value is a whole number of units. A numeric value `v` of an
//! attribute with scale `k` is `v · 10^k`; a text value is its rank in the
//! sorted dictionary of every string the problem mentions, so comparisons
//! between ranks agree with lexicographic order. One unit above an
//! attribute's largest value is its ghost sentinel.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::ast::{LiteralRole, Value};
use crate::error::{RepairError, Result};
use crate::instance::{numeric_units, units_to_number, AttrType, RepairProblem};
use crate::milp::Interval;

/// Largest magnitude a domain bound may have, in units
///
/// Keeps literal variables (and offsets spanning a whole domain) inside the
/// 32-bit integer range MILP backends accept for integer variables.
const UNIT_LIMIT: i64 = 1_000_000_000;

/// Value range of one attribute, in units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    /// Smallest legal value
    pub lo: i64,
    /// Largest legal value
    pub hi: i64,
    /// Decimal places (0 for text)
    pub scale: u32,
    /// True for text attributes
    pub text: bool,
}

impl Domain {
    /// Units of the ghost sentinel
    pub fn ghost(&self) -> i64 {
        self.hi + 1
    }

    /// Width of the domain
    pub fn span(&self) -> i64 {
        self.hi - self.lo
    }

    /// Legal values as an interval
    pub fn interval(&self) -> Interval {
        Interval::new(self.lo as f64, self.hi as f64)
    }

    /// Units per value unit (`10^scale`)
    pub fn units_per_value(&self) -> f64 {
        10f64.powi(self.scale as i32)
    }
}

/// Encodes and decodes values of one schema
#[derive(Debug, Clone)]
pub struct ValueCodec {
    names: Vec<String>,
    domains: Vec<Domain>,
    dictionary: Vec<String>,
    ranks: FxHashMap<String, i64>,
}

impl ValueCodec {
    /// Builds the encoding for a repair problem
    ///
    /// # Errors
    /// Returns [`RepairError::DomainError`] if a numeric domain is not finite,
    /// is inverted, or does not fit the integer range
    pub fn build(problem: &RepairProblem) -> Result<Self> {
        let mut strings = BTreeSet::new();
        for (_, row) in problem.database().rows() {
            strings.extend(row.iter().filter_map(Value::as_text).map(str::to_string));
        }
        for stmt in problem.log() {
            for literal in stmt.literals() {
                if let Some(s) = literal.value().as_text() {
                    strings.insert(s.to_string());
                }
            }
        }
        for complaint in problem.complaints() {
            if let Some(s) = complaint.expected.as_text() {
                strings.insert(s.to_string());
            }
        }

        let dictionary: Vec<String> = strings.into_iter().collect();
        let ranks = dictionary
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as i64))
            .collect();
        let text_hi = dictionary.len().saturating_sub(1) as i64;

        let attributes = problem.schema().attributes();
        let mut domains = Vec::with_capacity(attributes.len());
        for attr in attributes {
            let domain = match attr.ty {
                AttrType::Text => Domain {
                    lo: 0,
                    hi: text_hi,
                    scale: 0,
                    text: true,
                },
                AttrType::Numeric { min, max, scale } => numeric_domain(&attr.name, min, max, scale)?,
            };
            domains.push(domain);
        }

        Ok(Self {
            names: attributes.iter().map(|a| a.name.clone()).collect(),
            domains,
            dictionary,
            ranks,
        })
    }

    /// Returns the domain of an attribute
    pub fn domain(&self, attr: usize) -> &Domain {
        &self.domains[attr]
    }

    /// Returns the sorted text dictionary
    pub fn dictionary(&self) -> &[String] {
        &self.dictionary
    }

    /// Encodes a cell value of `attr`
    ///
    /// # Errors
    /// Returns [`RepairError::DomainError`] for a value of the wrong type, one
    /// finer than the attribute's precision, or one outside its domain
    pub fn encode(&self, attr: usize, value: &Value) -> Result<i64> {
        let domain = &self.domains[attr];
        let name = &self.names[attr];
        let units = match (value, domain.text) {
            (Value::Number(n), false) => numeric_units(*n, domain.scale).ok_or_else(|| {
                RepairError::DomainError(format!(
                    "{n} cannot be represented at the precision of {name}"
                ))
            })?,
            (Value::Text(s), true) => *self.ranks.get(s).ok_or_else(|| {
                RepairError::DomainError(format!("{value} is not a known value of {name}"))
            })?,
            _ => {
                return Err(RepairError::DomainError(format!("{name} cannot hold {value}")));
            }
        };
        if units < domain.lo || units > domain.hi {
            return Err(RepairError::DomainError(format!(
                "{value} lies outside the domain of {name}"
            )));
        }
        Ok(units)
    }

    /// Encodes a statement literal used in `role` for `attr`
    ///
    /// Offsets inside arithmetic are differences, so they may be negative but
    /// no wider than the attribute's domain.
    ///
    /// # Errors
    /// Returns [`RepairError::DomainError`] as for [`ValueCodec::encode`]
    pub fn encode_literal(&self, attr: usize, value: &Value, role: LiteralRole) -> Result<i64> {
        if role != LiteralRole::Offset {
            return self.encode(attr, value);
        }
        let domain = &self.domains[attr];
        let name = &self.names[attr];
        let units = value
            .as_number()
            .and_then(|n| numeric_units(n, domain.scale))
            .ok_or_else(|| {
                RepairError::DomainError(format!("{value} is not a valid offset for {name}"))
            })?;
        if units.abs() > domain.span() {
            return Err(RepairError::DomainError(format!(
                "offset {value} is wider than the domain of {name}"
            )));
        }
        Ok(units)
    }

    /// Values a repaired literal of `attr` may take in `role`
    pub fn literal_domain(&self, attr: usize, role: LiteralRole) -> Interval {
        let domain = &self.domains[attr];
        match role {
            LiteralRole::Offset => Interval::new(-(domain.span() as f64), domain.span() as f64),
            LiteralRole::Predicate | LiteralRole::Value => domain.interval(),
        }
    }

    /// Decodes a cell value of `attr`
    pub fn decode(&self, attr: usize, units: i64) -> Value {
        let domain = &self.domains[attr];
        if units == domain.ghost() {
            return Value::Ghost;
        }
        if domain.text {
            return usize::try_from(units)
                .ok()
                .and_then(|i| self.dictionary.get(i))
                .map_or(Value::Ghost, |s| Value::Text(s.clone()));
        }
        Value::Number(units_to_number(units, domain.scale))
    }

    /// Decodes a repaired literal of `attr` used in `role`
    pub fn decode_literal(&self, attr: usize, units: i64, role: LiteralRole) -> Value {
        match role {
            LiteralRole::Offset => Value::Number(units_to_number(units, self.domains[attr].scale)),
            LiteralRole::Predicate | LiteralRole::Value => self.decode(attr, units),
        }
    }
}

fn numeric_domain(name: &str, min: f64, max: f64, scale: u32) -> Result<Domain> {
    if !min.is_finite() || !max.is_finite() {
        return Err(RepairError::DomainError(format!("{name} has no finite bound")));
    }
    if min > max {
        return Err(RepairError::DomainError(format!(
            "{name} has an empty domain [{min}, {max}]"
        )));
    }
    let lo = numeric_units(min, scale);
    let hi = numeric_units(max, scale);
    match (lo, hi) {
        (Some(lo), Some(hi)) if lo >= -UNIT_LIMIT && hi < UNIT_LIMIT => Ok(Domain {
            lo,
            hi,
            scale,
            text: false,
        }),
        _ => Err(RepairError::DomainError(format!(
            "domain [{min}, {max}] of {name} does not fit the solver's integer range at scale {scale}"
        ))),
    }
}
