//! Named variables: dynamically scoped, reassignable environment bindings.
//!
//! Unlike registers, a variable's value depends on the program location.  Variables are interned
//! by name in the [`Context`], so two loads of `x` anywhere refer to the same [`Variable`].

use slotmap::DefaultKey;

use crate::context::Context;

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Variable(pub DefaultKey);

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct VariableContent {
    pub name: String,
}

impl Variable {
    /// Return the variable named `name`, interning it on first use.
    pub fn get_or_create(context: &mut Context, name: &str) -> Variable {
        if let Some(var) = context.variable_names.get(name) {
            return *var;
        }
        let var = Variable(context.variables.insert(VariableContent {
            name: name.to_owned(),
        }));
        context.variable_names.insert(name.to_owned(), var);
        var
    }

    /// Look up an already interned variable.
    pub fn lookup(context: &Context, name: &str) -> Option<Variable> {
        context.variable_names.get(name).copied()
    }

    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.variables[self.0].name
    }
}
