//! Contains the AST types. The tree is built once by the parser and never changed afterwards,
//! the evaluator only reads it. Every node remembers the source line of its first token.

use crate::stitch::Stitch;
use derive_more::{Deref, From};
use std::fmt;
use std::rc::Rc;

/// represents a whole parsed source text
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, From)]
pub struct Program(pub Vec<Instruction>);

#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum Instruction {
    Primitive(Primitive),
    Repeat(Repeat),
    Conditional(Conditional),
    /// shared with the evaluator's group table once it is registered
    GroupDef(Rc<GroupDef>),
    GroupUse(GroupUse),
}

/// represents a single stack operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    pub stitch: Stitch,
    /// only `ch` has one
    pub operand: Option<i64>,
    pub line: usize,
}

/// represents `* body ; rep from * [count] [times]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repeat {
    /// `None` means the count is popped from the stack when the block runs
    pub count: Option<i64>,
    pub body: Vec<Instruction>,
    pub line: usize,
}

/// represents `if then_body [else else_body] end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub then_body: Vec<Instruction>,
    pub else_body: Vec<Instruction>,
    pub line: usize,
}

/// represents `subpattern name [(params)] = ( body )`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDef {
    pub name: String,
    /// purely descriptive, nothing is bound to them
    pub params: Vec<String>,
    pub body: Vec<Instruction>,
    pub line: usize,
}

/// represents `use name [(args)]`, or a bare group name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUse {
    pub name: String,
    pub args: Vec<Argument>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Int(i64),
    Name(String),
}

impl Instruction {
    pub fn line(&self) -> usize {
        match self {
            Instruction::Primitive(p) => p.line,
            Instruction::Repeat(r) => r.line,
            Instruction::Conditional(c) => c.line,
            Instruction::GroupDef(d) => d.line,
            Instruction::GroupUse(u) => u.line,
        }
    }
}

impl Primitive {
    pub fn new(stitch: Stitch, line: usize) -> Self {
        Primitive {
            stitch,
            operand: None,
            line,
        }
    }
}

impl From<GroupDef> for Instruction {
    fn from(def: GroupDef) -> Self {
        Instruction::GroupDef(Rc::new(def))
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Int(n) => write!(f, "{}", n),
            Argument::Name(name) => write!(f, "{}", name),
        }
    }
}

/// A one line summary, used in logs. Bodies are not printed.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Primitive(Primitive {
                stitch,
                operand: Some(n),
                ..
            }) => write!(f, "{} {}", stitch, n),
            Instruction::Primitive(p) => write!(f, "{}", p.stitch),
            Instruction::Repeat(Repeat { count: Some(n), .. }) => write!(f, "rep from * {}", n),
            Instruction::Repeat(_) => write!(f, "rep from *"),
            Instruction::Conditional(_) => write!(f, "if"),
            Instruction::GroupDef(d) => write!(f, "subpattern {}", d.name),
            Instruction::GroupUse(u) if u.args.is_empty() => write!(f, "use {}", u.name),
            Instruction::GroupUse(u) => {
                let args: Vec<_> = u.args.iter().map(|a| a.to_string()).collect();
                write!(f, "use {}({})", u.name, args.join(" "))
            }
        }
    }
}
