//! The main handle to an IR instance.
//!
//! [`Context`] contains several [slotmap](https://github.com/orlp/slotmap) collections to
//! maintain the IR ECS.
//!
//! It is passed around as a mutable reference while the front end builds IR, and as a shared
//! reference to every analysis, which never mutates it.

use rustc_hash::FxHashMap;
use slotmap::{DefaultKey, SlotMap};

use crate::{
    block::BlockContent,
    cfg::CfgContent,
    register::RegisterContent,
    unit::{UnitContent, UnitIterator},
    variable::{Variable, VariableContent},
};

/// The main IR context handle.
///
/// Every unit, CFG, block, register and named variable is stored here.
#[derive(Default)]
pub struct Context {
    pub(crate) units: SlotMap<DefaultKey, UnitContent>,
    pub(crate) cfgs: SlotMap<DefaultKey, CfgContent>,
    pub(crate) blocks: SlotMap<DefaultKey, BlockContent>,
    pub(crate) registers: SlotMap<DefaultKey, RegisterContent>,
    pub(crate) variables: SlotMap<DefaultKey, VariableContent>,

    pub(crate) variable_names: FxHashMap<String, Variable>,

    next_unique_sym_tag: u64,
}

impl Context {
    /// Return an iterator for every compilation unit in this context.
    pub fn unit_iter(&self) -> UnitIterator {
        UnitIterator::new(self)
    }

    /// Get a globally unique symbol id.
    pub fn get_unique_id(&mut self) -> u64 {
        let sym = self.next_unique_sym_tag;
        self.next_unique_sym_tag += 1;
        sym
    }
}
