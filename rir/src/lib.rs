//! The analysis core of an optimizer for a lazily evaluated, dynamically scoped language.
//!
//! The IR is built by an external front end into a [`Context`]; everything here only reads it.
//! Optimizations obtain analyses through an [`Analyses`] registry per compilation [`Unit`].

use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<FxHasher>>;

pub mod analysis;
pub use analysis::*;
pub mod analysis_manager;
pub use analysis_manager::*;
pub mod block;
pub use block::*;
pub mod cfg;
pub use cfg::*;
pub mod constant;
pub use constant::*;
pub mod context;
pub use context::*;
pub mod error;
pub use error::*;
pub mod instruction;
pub use instruction::*;
pub mod irtype;
pub use irtype::*;
pub mod register;
pub use register::*;
pub mod unit;
pub use unit::*;
pub mod variable;
pub use variable::*;
pub mod verify;
