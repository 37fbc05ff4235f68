//! Statements, expressions, arguments and jumps.
//!
//! A [`Statement`] is an optional assignee [`Register`] and one [`Expression`].  Expressions refer
//! to registers only through [`Argument`]s, which distinguish a non-consuming `Read` from a
//! consuming `Use`.  A block ends in exactly one [`Jump`].
//!
//! All of these are closed sum types: analyses match on them exhaustively so that a new variant
//! must be handled everywhere before the crate compiles again.

use crate::{
    block::Block,
    cfg::Cfg,
    constant::Constant,
    context::Context,
    irtype::{Effects, ValueType},
    register::Register,
    variable::Variable,
};

/// An operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Argument {
    Constant(Constant),
    /// A non-consuming reference to a register.
    Read(Register),
    /// A consuming reference: after a `Use` the register must not be read or used again on any
    /// path without an intervening definition.
    Use(Register),
}

impl Argument {
    pub fn get_register(&self) -> Option<Register> {
        match self {
            Argument::Constant(_) => None,
            Argument::Read(reg) | Argument::Use(reg) => Some(*reg),
        }
    }

    pub fn get_constant(&self) -> Option<&Constant> {
        match self {
            Argument::Constant(c) => Some(c),
            Argument::Read(_) | Argument::Use(_) => None,
        }
    }

    pub fn is_use(&self) -> bool {
        matches!(self, Argument::Use(_))
    }

    /// The statically inferred type of this operand.
    pub fn get_type(&self, context: &Context) -> ValueType {
        match self {
            Argument::Constant(c) => c.get_type(),
            Argument::Read(reg) | Argument::Use(reg) => reg.get_type(context),
        }
    }

    pub fn describe(&self, context: &Context) -> String {
        match self {
            Argument::Constant(c) => c.to_string(),
            Argument::Read(reg) => reg.get_name(context).to_owned(),
            Argument::Use(reg) => format!("use {}", reg.get_name(context)),
        }
    }
}

/// A runtime check the optimizer relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Assumption {
    /// The value has (a subtype of) this type.
    Type(ValueType),
    /// The value is this literal.
    Value(Constant),
    /// The value is the named closure.
    Function(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Plain register copy.
    Copy(Argument),
    /// Read a named variable from the current environment.
    Load(Variable),
    /// Assign a named variable in the current environment.  The result is the stored value.
    Store { var: Variable, value: Argument },
    /// Look a function up by name, skipping non-function bindings.
    LoadFun(Variable),
    /// Create a promise whose code is the nested CFG `body`.
    MkPromise {
        body: Cfg,
        result_type: ValueType,
        effects: Effects,
    },
    /// Evaluate a promise, or pass an already evaluated value through.
    Force(Argument),
    /// Call a closure.
    Call {
        callee: Argument,
        args: Vec<Argument>,
    },
    /// Call a builtin by name.
    CallBuiltin { name: String, args: Vec<Argument> },
    Cast { value: Argument, to: ValueType },
    /// Checked assumption; the result is the value itself.
    Assume {
        value: Argument,
        assumption: Assumption,
    },
    MkVector(Vec<Argument>),
    /// Create and enter a new environment with the given bindings.
    PushEnv(Vec<(Variable, Argument)>),
    /// Leave the current environment.
    PopEnv,
    Subscript {
        vector: Argument,
        indices: Vec<Argument>,
    },
    /// Reflective access to the calling context, e.g. `environment()` or `sys.call()`.
    Reflect { name: String, args: Vec<Argument> },
}

impl Expression {
    /// Get every argument occurrence, in evaluation order.
    pub fn arguments(&self) -> Vec<&Argument> {
        match self {
            Expression::Copy(value)
            | Expression::Store { value, .. }
            | Expression::Force(value)
            | Expression::Cast { value, .. }
            | Expression::Assume { value, .. } => vec![value],
            Expression::Load(_)
            | Expression::LoadFun(_)
            | Expression::MkPromise { .. }
            | Expression::PopEnv => vec![],
            Expression::Call { callee, args } => {
                std::iter::once(callee).chain(args.iter()).collect()
            }
            Expression::CallBuiltin { args, .. }
            | Expression::MkVector(args)
            | Expression::Reflect { args, .. } => args.iter().collect(),
            Expression::PushEnv(bindings) => bindings.iter().map(|(_, arg)| arg).collect(),
            Expression::Subscript { vector, indices } => {
                std::iter::once(vector).chain(indices.iter()).collect()
            }
        }
    }

    /// Get every register referenced by this expression.
    pub fn get_registers(&self) -> Vec<Register> {
        self.arguments()
            .into_iter()
            .filter_map(Argument::get_register)
            .collect()
    }

    /// The effects assumed when no inference result refines them.
    pub fn default_effects(&self) -> Effects {
        match self {
            Expression::Copy(_)
            | Expression::MkPromise { .. }
            | Expression::Cast { .. }
            | Expression::MkVector(_) => Effects::none(),
            Expression::Load(_) => Effects::READS_ENV | Effects::ERROR,
            Expression::Store { .. } => Effects::WRITES_ENV,
            Expression::LoadFun(_) => Effects::READS_ENV | Effects::FORCE | Effects::ERROR,
            Expression::Force(_) => Effects::FORCE | Effects::EXECUTES_CODE | Effects::ERROR,
            Expression::Call { .. } => Effects::any(),
            Expression::CallBuiltin { .. } => Effects::VISIBLE | Effects::WARN | Effects::ERROR,
            Expression::Assume { .. } => Effects::DEPENDS_ON_ASSUME,
            Expression::PushEnv(_) | Expression::PopEnv => Effects::CHANGES_ENV,
            Expression::Subscript { .. } => Effects::ERROR,
            Expression::Reflect { .. } => {
                Effects::REFLECTION | Effects::READS_ENV | Effects::WRITES_ENV
            }
        }
    }

    /// The type a fresh assignee of this expression gets before any inference refines it.
    pub fn default_type(&self, context: &Context) -> ValueType {
        match self {
            Expression::Copy(value) | Expression::Store { value, .. } => value.get_type(context),
            Expression::Load(_) | Expression::Reflect { .. } => ValueType::any(),
            Expression::LoadFun(_) => ValueType::CLOSURE | ValueType::BUILTIN,
            Expression::MkPromise { .. } => ValueType::PROMISE,
            Expression::Force(value) => value.get_type(context).forced(),
            Expression::Call { .. }
            | Expression::CallBuiltin { .. }
            | Expression::Subscript { .. } => ValueType::any_value(),
            Expression::Cast { to, .. } => *to,
            Expression::Assume { value, assumption } => match assumption {
                Assumption::Type(ty) => value.get_type(context).intersection(*ty),
                Assumption::Value(c) => c.get_type(),
                Assumption::Function(_) => ValueType::CLOSURE,
            },
            Expression::MkVector(_) => ValueType::LIST,
            Expression::PushEnv(_) => ValueType::ENVIRONMENT,
            Expression::PopEnv => ValueType::NIL,
        }
    }

    /// The mnemonic used when printing.
    pub fn opcode(&self) -> &'static str {
        match self {
            Expression::Copy(_) => "copy",
            Expression::Load(_) => "ldvar",
            Expression::Store { .. } => "stvar",
            Expression::LoadFun(_) => "ldfun",
            Expression::MkPromise { .. } => "mkprom",
            Expression::Force(_) => "force",
            Expression::Call { .. } => "call",
            Expression::CallBuiltin { .. } => "builtin",
            Expression::Cast { .. } => "cast",
            Expression::Assume { .. } => "assume",
            Expression::MkVector(_) => "vec",
            Expression::PushEnv(_) => "pushenv",
            Expression::PopEnv => "popenv",
            Expression::Subscript { .. } => "subscript",
            Expression::Reflect { .. } => "reflect",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub assignee: Option<Register>,
    pub expr: Expression,
    /// Inferred effects, conservatively [`Expression::default_effects`] until refined.
    pub effects: Effects,
}

impl Statement {
    pub fn new(assignee: Option<Register>, expr: Expression) -> Statement {
        let effects = expr.default_effects();
        Statement {
            assignee,
            expr,
            effects,
        }
    }

    /// Return the promise body if this statement creates a promise.
    pub fn get_promise_body(&self) -> Option<Cfg> {
        match &self.expr {
            Expression::MkPromise { body, .. } => Some(*body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchToWithArgs {
    pub block: Block,
    /// One argument per param of `block`.
    pub args: Vec<Argument>,
}

/// A block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Jump {
    Goto(BranchToWithArgs),
    /// Conditional branch, `targets[0]` when `cond` holds, `targets[1]` otherwise.
    Branch {
        cond: Argument,
        targets: [BranchToWithArgs; 2],
    },
    Return(Argument),
    Unreachable,
    /// Leave optimized code, handing the listed values to the baseline interpreter.
    Deopt(Vec<Argument>),
}

impl Jump {
    /// The successor edges of this jump.
    pub fn targets(&self) -> &[BranchToWithArgs] {
        match self {
            Jump::Goto(target) => std::slice::from_ref(target),
            Jump::Branch { targets, .. } => targets,
            Jump::Return(_) | Jump::Unreachable | Jump::Deopt(_) => &[],
        }
    }

    /// The argument occurrences consumed by the jump itself, i.e. not passed along an edge.
    pub fn own_arguments(&self) -> Vec<&Argument> {
        match self {
            Jump::Goto(_) | Jump::Unreachable => vec![],
            Jump::Branch { cond, .. } | Jump::Return(cond) => vec![cond],
            Jump::Deopt(args) => args.iter().collect(),
        }
    }

    /// Every argument occurrence of this jump, own arguments first, then edge arguments.
    pub fn arguments(&self) -> Vec<&Argument> {
        let mut args = self.own_arguments();
        args.extend(self.targets().iter().flat_map(|target| target.args.iter()));
        args
    }

    pub fn is_exit(&self) -> bool {
        self.targets().is_empty()
    }
}

/// A program point: statement `index` of `block`; the index equal to the statement count
/// addresses the jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub block: Block,
    pub index: usize,
}

impl Position {
    pub fn new(block: Block, index: usize) -> Position {
        Position { block, index }
    }

    pub fn describe(&self, context: &Context) -> String {
        format!("{}:{}", self.block.get_label(context), self.index)
    }
}

/// Provide a context for appending new [`Statement`]s to a [`Block`].
pub struct StatementInserter<'a> {
    context: &'a mut Context,
    block: Block,
}

macro_rules! define_expr {
    ($self: ident, $expr: expr) => {{
        let expr = $expr;
        let ty = expr.default_type($self.context);
        $self.define(expr, ty)
    }};
}

impl<'a> StatementInserter<'a> {
    /// Return a new [`StatementInserter`] context for `block`.
    pub fn new(context: &'a mut Context, block: Block) -> StatementInserter<'a> {
        StatementInserter { context, block }
    }

    /// Append `expr` assigning a fresh register of type `ty`.
    pub fn define(self, expr: Expression, ty: ValueType) -> Register {
        let cfg = self.block.get_cfg(self.context);
        let reg = Register::new(self.context, cfg, ty);
        self.block
            .append_statement(self.context, Statement::new(Some(reg), expr));
        reg
    }

    /// Append `expr` without an assignee, returning the statement index.
    pub fn effect(self, expr: Expression) -> usize {
        self.block
            .append_statement(self.context, Statement::new(None, expr))
    }

    pub fn copy(self, value: Argument) -> Register {
        define_expr!(self, Expression::Copy(value))
    }

    pub fn load(self, var: Variable) -> Register {
        define_expr!(self, Expression::Load(var))
    }

    pub fn store(self, var: Variable, value: Argument) -> Register {
        define_expr!(self, Expression::Store { var, value })
    }

    pub fn load_fun(self, var: Variable) -> Register {
        define_expr!(self, Expression::LoadFun(var))
    }

    /// Create a promise of `body`, which must be a promise CFG nested in this block's CFG.
    pub fn mk_promise(self, body: Cfg) -> Register {
        define_expr!(
            self,
            Expression::MkPromise {
                body,
                result_type: ValueType::any(),
                effects: Effects::any(),
            }
        )
    }

    pub fn force(self, value: Argument) -> Register {
        define_expr!(self, Expression::Force(value))
    }

    pub fn call(self, callee: Argument, args: Vec<Argument>) -> Register {
        define_expr!(self, Expression::Call { callee, args })
    }

    pub fn call_builtin(self, name: &str, args: Vec<Argument>) -> Register {
        define_expr!(
            self,
            Expression::CallBuiltin {
                name: name.to_owned(),
                args,
            }
        )
    }

    pub fn cast(self, value: Argument, to: ValueType) -> Register {
        define_expr!(self, Expression::Cast { value, to })
    }

    pub fn assume(self, value: Argument, assumption: Assumption) -> Register {
        define_expr!(self, Expression::Assume { value, assumption })
    }

    pub fn mk_vector(self, elems: Vec<Argument>) -> Register {
        define_expr!(self, Expression::MkVector(elems))
    }

    pub fn push_env(self, bindings: Vec<(Variable, Argument)>) -> Register {
        define_expr!(self, Expression::PushEnv(bindings))
    }

    pub fn pop_env(self) -> usize {
        self.effect(Expression::PopEnv)
    }

    pub fn subscript(self, vector: Argument, indices: Vec<Argument>) -> Register {
        define_expr!(self, Expression::Subscript { vector, indices })
    }

    pub fn reflect(self, name: &str, args: Vec<Argument>) -> Register {
        define_expr!(
            self,
            Expression::Reflect {
                name: name.to_owned(),
                args,
            }
        )
    }

    pub fn goto(self, to_block: Block, args: Vec<Argument>) {
        self.block.set_jump(
            self.context,
            Jump::Goto(BranchToWithArgs {
                block: to_block,
                args,
            }),
        );
    }

    pub fn branch(
        self,
        cond: Argument,
        true_block: Block,
        true_args: Vec<Argument>,
        false_block: Block,
        false_args: Vec<Argument>,
    ) {
        self.block.set_jump(
            self.context,
            Jump::Branch {
                cond,
                targets: [
                    BranchToWithArgs {
                        block: true_block,
                        args: true_args,
                    },
                    BranchToWithArgs {
                        block: false_block,
                        args: false_args,
                    },
                ],
            },
        );
    }

    pub fn ret(self, value: Argument) {
        self.block.set_jump(self.context, Jump::Return(value));
    }

    pub fn unreachable(self) {
        self.block.set_jump(self.context, Jump::Unreachable);
    }

    pub fn deopt(self, args: Vec<Argument>) {
        self.block.set_jump(self.context, Jump::Deopt(args));
    }
}
