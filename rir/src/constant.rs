//! Literal values appearing as [`Argument::Constant`](crate::Argument::Constant).

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::irtype::ValueType;

#[derive(Debug, Clone)]
pub enum Constant {
    Nil,
    /// `None` is the missing value `NA`.
    Logical(Option<bool>),
    Integer(i64),
    Real(f64),
    String(String),
    /// A closure literal, identified by name.
    Closure(String),
    /// The marker for a missing argument.
    Missing,
}

impl Constant {
    /// The type of this constant.  Constants are never lazy.
    pub fn get_type(&self) -> ValueType {
        match self {
            Constant::Nil => ValueType::NIL,
            Constant::Logical(_) => ValueType::LOGICAL,
            Constant::Integer(_) => ValueType::INTEGER,
            Constant::Real(_) => ValueType::REAL,
            Constant::String(_) => ValueType::STRING,
            Constant::Closure(_) => ValueType::CLOSURE,
            Constant::Missing => ValueType::MISSING,
        }
    }
}

// Reals are compared bitwise so that constants can be used as map keys; origins only ever ask
// whether two literals are the same literal.
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Nil, Constant::Nil) | (Constant::Missing, Constant::Missing) => true,
            (Constant::Logical(a), Constant::Logical(b)) => a == b,
            (Constant::Integer(a), Constant::Integer(b)) => a == b,
            (Constant::Real(a), Constant::Real(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Closure(a), Constant::Closure(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Nil | Constant::Missing => (),
            Constant::Logical(b) => b.hash(state),
            Constant::Integer(i) => i.hash(state),
            Constant::Real(r) => r.to_bits().hash(state),
            Constant::String(s) | Constant::Closure(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "NULL"),
            Constant::Logical(None) => write!(f, "NA"),
            Constant::Logical(Some(true)) => write!(f, "TRUE"),
            Constant::Logical(Some(false)) => write!(f, "FALSE"),
            Constant::Integer(i) => write!(f, "{i}L"),
            Constant::Real(r) => write!(f, "{r}"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Closure(name) => write!(f, "<closure {name}>"),
            Constant::Missing => write!(f, "missingArg"),
        }
    }
}
