//! # Formula Expressions
//!
//! The engine evaluates textual formulas such as
//! `(gfs.air_temperature - gfs.air_temperature[time: -86400])`. This module
//! builds those strings from typed values instead of string concatenation.
//!
//! ## Building Blocks
//!
//! - [`Var`]: a reference to a named variable (`namespace.name`), optionally
//!   shifted in space or time by an [`Offset`]
//! - [`Offset`]: ordered `axis: delta` pairs, relative (`[...]`) or
//!   absolute (`@[...]`)
//! - [`Formula`]: a variable, a numeric literal, or a binary operation on two
//!   formulas
//!
//! ## Serialization
//!
//! Serialization is purely structural. Every binary operation is wrapped in
//! parentheses and no precedence folding happens, so the text sent to the
//! engine mirrors the tree exactly:
//!
//! ```
//! use earthos::formula::Var;
//!
//! let now = Var::new("gfs", "air_temperature");
//! let past = Var::new("gfs", "air_temperature")
//!     .offset([("time", -86400.0)])
//!     .unwrap();
//!
//! assert_eq!(
//!     (now - past).to_string(),
//!     "(gfs.air_temperature - gfs.air_temperature[time: -86400])"
//! );
//! ```
//!
//! The Rust operators `+ - * /` are sugar for [`add`], [`sub`], [`mul`] and
//! [`div`]. Exponentiation has no operator (`^` is XOR in Rust) and is only
//! available as [`pow`] or [`Formula::pow`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use thiserror::Error;

/// Errors raised while building a formula.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Axis names must be non-empty identifiers (`time`, `latitude`, ...)
    #[error("invalid offset axis {0:?}")]
    InvalidAxis(String),

    /// Deltas are embedded verbatim in the formula text, so NaN/inf are refused
    #[error("offset for axis {axis} is not a finite number: {value}")]
    NonFiniteDelta { axis: String, value: f64 },

    /// Checked literals must be finite
    #[error("formula literal is not a finite number: {0}")]
    NonFiniteLiteral(f64),

    /// Reference strings must look like `namespace.name`
    #[error("variable reference {0:?} is not of the form namespace.name")]
    InvalidReference(String),
}

/// Arithmetic operators understood by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Operator {
    /// Symbol used in the formula text.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Pow => "^",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Whether offset values shift the sample point or pin it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OffsetMode {
    /// Values are deltas from the requested point: `[time: -3600]`
    #[default]
    Relative,
    /// Values replace the requested coordinate: `@[time: 1719246600]`
    Absolute,
}

/// Ordered per-axis offsets attached to a variable reference.
///
/// Axes keep insertion order. Inserting an axis a second time updates its
/// value in place without moving it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Offset {
    entries: Vec<(String, f64)>,
    mode: OffsetMode,
}

impl Offset {
    /// Empty relative offset.
    pub fn relative() -> Self {
        Self::default()
    }

    /// Empty absolute offset.
    pub fn absolute() -> Self {
        Self {
            entries: Vec::new(),
            mode: OffsetMode::Absolute,
        }
    }

    /// Build an offset from `(axis, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I, mode: OffsetMode) -> Result<Self, FormulaError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut offset = Self {
            entries: Vec::new(),
            mode,
        };
        for (axis, value) in pairs {
            offset.insert(axis, value)?;
        }
        Ok(offset)
    }

    /// Set `axis` to `value`, keeping the axis' original position if present.
    pub fn insert(&mut self, axis: impl Into<String>, value: f64) -> Result<(), FormulaError> {
        let axis = axis.into();
        validate_axis(&axis)?;
        if !value.is_finite() {
            return Err(FormulaError::NonFiniteDelta { axis, value });
        }

        match self.entries.iter_mut().find(|(name, _)| *name == axis) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((axis, value)),
        }
        Ok(())
    }

    /// Builder form of [`Offset::insert`].
    pub fn with(mut self, axis: impl Into<String>, value: f64) -> Result<Self, FormulaError> {
        self.insert(axis, value)?;
        Ok(self)
    }

    pub fn set_absolute(&mut self) {
        self.mode = OffsetMode::Absolute;
    }

    pub fn set_relative(&mut self) {
        self.mode = OffsetMode::Relative;
    }

    /// Same entries, absolute mode.
    pub fn with_absolute(mut self) -> Self {
        self.set_absolute();
        self
    }

    /// Same entries, relative mode.
    pub fn with_relative(mut self) -> Self {
        self.set_relative();
        self
    }

    pub fn mode(&self) -> OffsetMode {
        self.mode
    }

    pub fn is_absolute(&self) -> bool {
        self.mode == OffsetMode::Absolute
    }

    pub fn get(&self, axis: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| *value)
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_absolute() {
            f.write_str("@")?;
        }
        f.write_str("[")?;
        for (i, (axis, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", axis, value)?;
        }
        f.write_str("]")
    }
}

fn validate_axis(axis: &str) -> Result<(), FormulaError> {
    let valid = !axis.is_empty() && axis.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FormulaError::InvalidAxis(axis.to_string()))
    }
}

/// Metadata the engine publishes for a variable (`variables/` endpoint).
///
/// Only `namespace` and `name` are guaranteed; everything else (units,
/// description, ...) is kept verbatim in `details`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub namespace: String,
    pub name: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Reference to a named engine variable.
///
/// Attaching an offset consumes the reference and returns it with the new
/// offset, replacing any previous one. Clone first to keep an unshifted copy.
#[derive(Clone, Debug, PartialEq)]
pub struct Var {
    namespace: String,
    name: String,
    offset: Option<Offset>,
    info: Option<VariableInfo>,
}

impl Var {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            offset: None,
            info: None,
        }
    }

    /// Parse a qualified `namespace.name` reference.
    pub fn parse(qualified: &str) -> Result<Self, FormulaError> {
        match qualified.split_once('.') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(FormulaError::InvalidReference(qualified.to_string())),
        }
    }

    /// Attach engine metadata (does not affect serialization).
    pub fn with_info(mut self, info: Option<VariableInfo>) -> Self {
        self.info = info;
        self
    }

    /// Attach a relative offset built from `(axis, delta)` pairs.
    pub fn offset<I, K>(self, deltas: I) -> Result<Self, FormulaError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let offset = Offset::from_pairs(deltas, OffsetMode::Relative)?;
        Ok(self.with_offset(offset))
    }

    /// Attach an absolute offset built from `(axis, value)` pairs.
    pub fn absolute<I, K>(self, values: I) -> Result<Self, FormulaError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let offset = Offset::from_pairs(values, OffsetMode::Absolute)?;
        Ok(self.with_offset(offset))
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn without_offset(mut self) -> Self {
        self.offset = None;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace.name` without any offset.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn annotation(&self) -> Option<&Offset> {
        self.offset.as_ref()
    }

    /// Mutable access to the attached offset, e.g. to flip its mode.
    pub fn annotation_mut(&mut self) -> Option<&mut Offset> {
        self.offset.as_mut()
    }

    pub fn info(&self) -> Option<&VariableInfo> {
        self.info.as_ref()
    }

    /// Canonical formula text.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn pow(self, rhs: impl Into<Formula>) -> Formula {
        pow(self, rhs)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)?;
        // An empty offset is the same as no offset on the wire
        match &self.offset {
            Some(offset) if !offset.is_empty() => write!(f, "{}", offset),
            _ => Ok(()),
        }
    }
}

/// A formula expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    Var(Var),
    /// Written with `f64`'s `Display`, unchecked. Build through
    /// [`Formula::literal`] to refuse NaN and infinities.
    Literal(f64),
    Binary {
        op: Operator,
        left: Box<Formula>,
        right: Box<Formula>,
    },
}

impl Formula {
    /// Combine two operands into a new binary node.
    pub fn binary(left: impl Into<Formula>, op: Operator, right: impl Into<Formula>) -> Formula {
        Formula::Binary {
            op,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    /// Numeric literal node, refusing values the engine cannot parse.
    pub fn literal(value: f64) -> Result<Formula, FormulaError> {
        if value.is_finite() {
            Ok(Formula::Literal(value))
        } else {
            Err(FormulaError::NonFiniteLiteral(value))
        }
    }

    /// Canonical formula text, identical to `Display`.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn pow(self, rhs: impl Into<Formula>) -> Formula {
        pow(self, rhs)
    }

    /// All variable references, left to right.
    pub fn variables(&self) -> Vec<&Var> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a Var>) {
        match self {
            Formula::Var(var) => out.push(var),
            Formula::Literal(_) => {}
            Formula::Binary { left, right, .. } => {
                left.collect_vars(out);
                right.collect_vars(out);
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Var(var) => write!(f, "{}", var),
            Formula::Literal(value) => write!(f, "{}", value),
            Formula::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
        }
    }
}

impl From<Var> for Formula {
    fn from(var: Var) -> Self {
        Formula::Var(var)
    }
}

impl From<&Var> for Formula {
    fn from(var: &Var) -> Self {
        Formula::Var(var.clone())
    }
}

impl From<&Formula> for Formula {
    fn from(formula: &Formula) -> Self {
        formula.clone()
    }
}

impl From<f64> for Formula {
    fn from(value: f64) -> Self {
        Formula::Literal(value)
    }
}

impl From<i32> for Formula {
    fn from(value: i32) -> Self {
        Formula::Literal(f64::from(value))
    }
}

impl From<i64> for Formula {
    fn from(value: i64) -> Self {
        Formula::Literal(value as f64)
    }
}

pub fn add(left: impl Into<Formula>, right: impl Into<Formula>) -> Formula {
    Formula::binary(left, Operator::Add, right)
}

pub fn sub(left: impl Into<Formula>, right: impl Into<Formula>) -> Formula {
    Formula::binary(left, Operator::Sub, right)
}

pub fn mul(left: impl Into<Formula>, right: impl Into<Formula>) -> Formula {
    Formula::binary(left, Operator::Mul, right)
}

pub fn div(left: impl Into<Formula>, right: impl Into<Formula>) -> Formula {
    Formula::binary(left, Operator::Div, right)
}

pub fn pow(left: impl Into<Formula>, right: impl Into<Formula>) -> Formula {
    Formula::binary(left, Operator::Pow, right)
}

macro_rules! formula_ops {
    ($($trait:ident :: $method:ident => $op:expr;)*) => {$(
        impl<R: Into<Formula>> $trait<R> for Formula {
            type Output = Formula;
            fn $method(self, rhs: R) -> Formula {
                Formula::binary(self, $op, rhs)
            }
        }

        impl<R: Into<Formula>> $trait<R> for &Formula {
            type Output = Formula;
            fn $method(self, rhs: R) -> Formula {
                Formula::binary(self.clone(), $op, rhs)
            }
        }

        impl<R: Into<Formula>> $trait<R> for Var {
            type Output = Formula;
            fn $method(self, rhs: R) -> Formula {
                Formula::binary(self, $op, rhs)
            }
        }

        impl<R: Into<Formula>> $trait<R> for &Var {
            type Output = Formula;
            fn $method(self, rhs: R) -> Formula {
                Formula::binary(self.clone(), $op, rhs)
            }
        }

        formula_ops!(@literal $trait :: $method => $op; f64, i32);
    )*};

    (@literal $trait:ident :: $method:ident => $op:expr; $($lit:ty),*) => {$(
        impl $trait<Formula> for $lit {
            type Output = Formula;
            fn $method(self, rhs: Formula) -> Formula {
                Formula::binary(self, $op, rhs)
            }
        }

        impl $trait<Var> for $lit {
            type Output = Formula;
            fn $method(self, rhs: Var) -> Formula {
                Formula::binary(self, $op, rhs)
            }
        }

        impl $trait<&Var> for $lit {
            type Output = Formula;
            fn $method(self, rhs: &Var) -> Formula {
                Formula::binary(self, $op, rhs)
            }
        }
    )*};
}

formula_ops! {
    Add::add => Operator::Add;
    Sub::sub => Operator::Sub;
    Mul::mul => Operator::Mul;
    Div::div => Operator::Div;
}
