//! A compilation unit: one closure version body and every promise nested inside it.
//!
//! Analyses are requested per unit through [`crate::Analyses`]; per-CFG analyses may be requested
//! for any CFG belonging to the unit, including nested promise bodies.

use slotmap::DefaultKey;

use crate::{
    cfg::{Cfg, CfgKind},
    context::Context,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Unit(pub DefaultKey);

#[doc(hidden)]
pub struct UnitContent {
    pub name: String,
    pub body: Option<Cfg>,
    /// Every CFG of the unit in creation order, the body first.
    pub cfgs: Vec<Cfg>,
}

impl Unit {
    /// Return a new named unit together with its (empty) body CFG.
    pub fn new(context: &mut Context, name: &str) -> Unit {
        let content = UnitContent {
            name: name.to_owned(),
            body: None,
            cfgs: Vec::new(),
        };
        let unit = Unit(context.units.insert(content));
        let body = Cfg::new(context, unit, CfgKind::Body);
        context.units[unit.0].body = Some(body);
        unit
    }

    /// Get the name of this unit.
    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.units[self.0].name
    }

    /// Get the body CFG of this unit.
    pub fn get_body(&self, context: &Context) -> Cfg {
        context.units[self.0]
            .body
            .expect("Every unit is created with a body CFG.")
    }

    /// Return an iterator over every CFG of this unit, body first, then promises in creation
    /// order.
    pub fn cfg_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = Cfg> + 'a {
        context.units[self.0].cfgs.iter().copied()
    }

    /// Does `cfg` belong to this unit?
    pub fn contains_cfg(&self, context: &Context, cfg: Cfg) -> bool {
        context
            .cfgs
            .get(cfg.0)
            .is_some_and(|content| content.unit == *self)
    }
}

/// An iterator over [`Unit`]s within a [`Context`].
pub struct UnitIterator {
    units: Vec<DefaultKey>,
    next: usize,
}

impl UnitIterator {
    /// Return a new [`Unit`] iterator.
    pub fn new(context: &Context) -> UnitIterator {
        UnitIterator {
            units: context.units.keys().collect(),
            next: 0,
        }
    }
}

impl Iterator for UnitIterator {
    type Item = Unit;

    fn next(&mut self) -> Option<Unit> {
        if self.next < self.units.len() {
            let idx = self.next;
            self.next += 1;
            Some(Unit(self.units[idx]))
        } else {
            None
        }
    }
}
