//! Statically inferred value types and effect sets.
//!
//! Both are produced by an external type and effect inference and attached to the IR: a
//! [`ValueType`] to each [`Register`](crate::Register) and an [`Effects`] set to each
//! [`Statement`](crate::Statement).  Analyses only ever read them.
//!
//! A [`ValueType`] is a union of base kinds, so `a.is_a(b)` is plain set inclusion.

use std::{fmt, ops::BitOr};

use serde::{Deserialize, Serialize};

/// A set of base value kinds a value may have at runtime.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValueType(u16);

impl ValueType {
    pub const NIL: ValueType = ValueType(1 << 0);
    pub const LOGICAL: ValueType = ValueType(1 << 1);
    pub const INTEGER: ValueType = ValueType(1 << 2);
    pub const REAL: ValueType = ValueType(1 << 3);
    pub const STRING: ValueType = ValueType(1 << 4);
    pub const LIST: ValueType = ValueType(1 << 5);
    pub const CLOSURE: ValueType = ValueType(1 << 6);
    pub const BUILTIN: ValueType = ValueType(1 << 7);
    pub const ENVIRONMENT: ValueType = ValueType(1 << 8);
    pub const PROMISE: ValueType = ValueType(1 << 9);
    pub const MISSING: ValueType = ValueType(1 << 10);

    /// No value at all, e.g. the result of a statement which never returns.
    pub const fn bottom() -> ValueType {
        ValueType(0)
    }

    /// Any evaluated value, excluding promises and missing arguments.
    pub const fn any_value() -> ValueType {
        ValueType(
            Self::NIL.0
                | Self::LOGICAL.0
                | Self::INTEGER.0
                | Self::REAL.0
                | Self::STRING.0
                | Self::LIST.0
                | Self::CLOSURE.0
                | Self::BUILTIN.0
                | Self::ENVIRONMENT.0,
        )
    }

    /// Anything, including unevaluated promises.
    pub const fn any() -> ValueType {
        ValueType(Self::any_value().0 | Self::PROMISE.0 | Self::MISSING.0)
    }

    pub const fn union(self, other: ValueType) -> ValueType {
        ValueType(self.0 | other.0)
    }

    pub const fn intersection(self, other: ValueType) -> ValueType {
        ValueType(self.0 & other.0)
    }

    /// Is every value of `self` also a value of `other`?
    pub const fn is_a(self, other: ValueType) -> bool {
        self.0 & !other.0 == 0
    }

    pub const fn is_bottom(self) -> bool {
        self.0 == 0
    }

    /// Is this definitely a closure?
    pub const fn is_closure(self) -> bool {
        self.0 == Self::CLOSURE.0
    }

    /// May a value of this type be an unevaluated promise?  Forcing such a value can run
    /// arbitrary code.
    pub const fn maybe_lazy(self) -> bool {
        self.0 & Self::PROMISE.0 != 0
    }

    /// The type after forcing: promises are gone, whatever they evaluate to is unknown.
    pub const fn forced(self) -> ValueType {
        if self.maybe_lazy() {
            ValueType((self.0 & !Self::PROMISE.0) | Self::any_value().0)
        } else {
            self
        }
    }
}

impl BitOr for ValueType {
    type Output = ValueType;

    fn bitor(self, rhs: ValueType) -> ValueType {
        self.union(rhs)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ValueType::any() {
            return write!(f, "any");
        }
        if self.is_bottom() {
            return write!(f, "void");
        }
        let names = [
            (ValueType::NIL, "nil"),
            (ValueType::LOGICAL, "lgl"),
            (ValueType::INTEGER, "int"),
            (ValueType::REAL, "real"),
            (ValueType::STRING, "str"),
            (ValueType::LIST, "list"),
            (ValueType::CLOSURE, "clo"),
            (ValueType::BUILTIN, "blt"),
            (ValueType::ENVIRONMENT, "env"),
            (ValueType::PROMISE, "prom"),
            (ValueType::MISSING, "miss"),
        ];
        let mut first = true;
        for (kind, name) in names {
            if kind.is_a(*self) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The set of side effects a statement may have.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Effects(u16);

impl Effects {
    pub const VISIBLE: Effects = Effects(1 << 0);
    pub const WARN: Effects = Effects(1 << 1);
    pub const ERROR: Effects = Effects(1 << 2);
    /// May force a promise.
    pub const FORCE: Effects = Effects(1 << 3);
    /// May reflect on (and so read or mutate any binding of) the environment.
    pub const REFLECTION: Effects = Effects(1 << 4);
    pub const READS_ENV: Effects = Effects(1 << 5);
    pub const WRITES_ENV: Effects = Effects(1 << 6);
    /// Replaces the current environment.
    pub const CHANGES_ENV: Effects = Effects(1 << 7);
    pub const EXECUTES_CODE: Effects = Effects(1 << 8);
    pub const DEPENDS_ON_ASSUME: Effects = Effects(1 << 9);

    pub const fn none() -> Effects {
        Effects(0)
    }

    pub const fn any() -> Effects {
        Effects((1 << 10) - 1)
    }

    pub const fn union(self, other: Effects) -> Effects {
        Effects(self.0 | other.0)
    }

    pub const fn without(self, other: Effects) -> Effects {
        Effects(self.0 & !other.0)
    }

    /// Does this set contain every effect of `other`?
    pub const fn contains(self, other: Effects) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Effects) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Effects {
    type Output = Effects;

    fn bitor(self, rhs: Effects) -> Effects {
        self.union(rhs)
    }
}
