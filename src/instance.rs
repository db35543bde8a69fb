//! Instance types: Schema, Database, Complaint and RepairProblem
//!
//! These types describe the relation a log runs against, its initial state
//! D₀, and the complaints about the final state.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ast::{Statement, Value};
use crate::error::{RepairError, Result};

/// Stable identifier of a tuple across the whole replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleId(pub u64);

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Declared value domain of an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrType {
    /// Bounded number with `scale` decimal places
    Numeric {
        /// Smallest legal value
        min: f64,
        /// Largest legal value
        max: f64,
        /// Decimal places of the declared precision
        scale: u32,
    },
    /// String, ordered lexicographically
    Text,
}

impl AttrType {
    /// Returns true for text attributes
    pub fn is_text(&self) -> bool {
        matches!(self, AttrType::Text)
    }

    /// Units per value unit (`10^scale`, 1 for text)
    pub fn units_per_value(&self) -> f64 {
        match self {
            AttrType::Numeric { scale, .. } => 10f64.powi(*scale as i32),
            AttrType::Text => 1.0,
        }
    }
}

/// A named, typed attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute domain
    pub ty: AttrType,
}

impl Attribute {
    /// Integer-valued attribute in `[min, max]`
    pub fn numeric(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::decimal(name, min, max, 0)
    }

    /// Attribute in `[min, max]` with `scale` decimal places
    pub fn decimal(name: impl Into<String>, min: f64, max: f64, scale: u32) -> Self {
        Self {
            name: name.into(),
            ty: AttrType::Numeric { min, max, scale },
        }
    }

    /// Text attribute
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: AttrType::Text,
        }
    }
}

/// The relation a log is repaired against
#[derive(Debug, Clone)]
pub struct Schema {
    relation: String,
    attributes: Vec<Attribute>,
    indices: FxHashMap<String, usize>,
}

impl Schema {
    /// Creates a schema
    ///
    /// # Errors
    /// Returns an error if there are no attributes or a name repeats
    pub fn new(relation: impl Into<String>, attributes: Vec<Attribute>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(RepairError::InvalidArgument(
                "a schema needs at least one attribute".to_string(),
            ));
        }
        let mut indices = FxHashMap::default();
        for (i, attr) in attributes.iter().enumerate() {
            if indices.insert(attr.name.clone(), i).is_some() {
                return Err(RepairError::InvalidArgument(format!(
                    "{} appears multiple times",
                    attr.name
                )));
            }
        }
        Ok(Self {
            relation: relation.into(),
            attributes,
            indices,
        })
    }

    /// Returns the relation name
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Returns the attributes in declaration order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Returns the number of attributes
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Always false; schemas have at least one attribute
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns the position of an attribute
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Looks up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index_of(name).map(|i| &self.attributes[i])
    }
}

/// Converts a number to integer units at `scale` decimal places
///
/// Returns `None` when the number is not finite or is finer than the scale.
pub(crate) fn numeric_units(value: f64, scale: u32) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = value * 10f64.powi(scale as i32);
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 || rounded.abs() > 9.0e15 {
        return None;
    }
    Some(rounded as i64)
}

/// Converts integer units back to a number
pub(crate) fn units_to_number(units: i64, scale: u32) -> f64 {
    units as f64 / 10f64.powi(scale as i32)
}

/// Initial database state D₀
#[derive(Debug, Clone)]
pub struct Database {
    schema: Schema,
    rows: BTreeMap<TupleId, Vec<Value>>,
}

impl Database {
    /// Creates an empty database over `schema`
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// Adds a row, values in schema order
    ///
    /// # Errors
    /// Returns an error on a repeated id, a wrong value count, or a value
    /// whose type does not match its attribute
    pub fn insert(&mut self, id: TupleId, values: Vec<Value>) -> Result<()> {
        if self.rows.contains_key(&id) {
            return Err(RepairError::InvalidArgument(format!("{id} inserted twice")));
        }
        if values.len() != self.schema.len() {
            return Err(RepairError::InvalidArgument(format!(
                "{id} has {} values but {} has {} attributes",
                values.len(),
                self.schema.relation(),
                self.schema.len()
            )));
        }
        for (value, attr) in values.iter().zip(self.schema.attributes()) {
            let ok = matches!(
                (value, &attr.ty),
                (Value::Number(_), AttrType::Numeric { .. }) | (Value::Text(_), AttrType::Text)
            );
            if !ok {
                return Err(RepairError::InvalidArgument(format!(
                    "{id}.{} cannot hold {value}",
                    attr.name
                )));
            }
        }
        self.rows.insert(id, values);
        Ok(())
    }

    /// Returns the schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the row of a tuple
    pub fn get(&self, id: TupleId) -> Option<&[Value]> {
        self.rows.get(&id).map(Vec::as_slice)
    }

    /// Iterates rows in id order
    pub fn rows(&self) -> impl Iterator<Item = (TupleId, &[Value])> {
        self.rows.iter().map(|(id, row)| (*id, row.as_slice()))
    }

    /// Returns the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A point correction to the final state: `tuple.attribute` should be `expected`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    /// Tuple of the final state
    pub tuple: TupleId,
    /// Attribute of that tuple
    pub attribute: String,
    /// Value the cell should hold
    pub expected: Value,
}

impl Complaint {
    /// Creates a complaint
    pub fn new(tuple: TupleId, attribute: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            tuple,
            attribute: attribute.into(),
            expected: expected.into(),
        }
    }
}

/// Everything one repair run needs: D₀, the log Q and the complaints C
#[derive(Debug, Clone)]
pub struct RepairProblem {
    database: Database,
    log: Vec<Statement>,
    complaints: Vec<Complaint>,
}

impl RepairProblem {
    /// Creates a repair problem
    pub fn new(database: Database, log: Vec<Statement>, complaints: Vec<Complaint>) -> Self {
        Self {
            database,
            log,
            complaints,
        }
    }

    /// Returns D₀
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the schema of the repaired relation
    pub fn schema(&self) -> &Schema {
        self.database.schema()
    }

    /// Returns the query log
    pub fn log(&self) -> &[Statement] {
        &self.log
    }

    /// Returns the complaints
    pub fn complaints(&self) -> &[Complaint] {
        &self.complaints
    }
}
