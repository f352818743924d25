use derive_more::{Deref, From};
use std::fmt;
use thiserror::Error;

/// The value stack of the evaluator. The top of the stack is the last element.
///
/// Derefs to a read-only `Vec`, all mutation goes through the methods below.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deref, From)]
pub struct Stack(Vec<i64>);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("needed {needed} values but the stack holds {available}")]
pub struct Underflow {
    pub needed: usize,
    pub available: usize,
}

impl Stack {
    pub fn push(&mut self, v: i64) {
        self.0.push(v);
    }

    pub fn pop(&mut self) -> Result<i64, Underflow> {
        self.require(1)?;
        self.0.pop().ok_or(Underflow {
            needed: 1,
            available: 0,
        })
    }

    pub fn peek(&self) -> Result<i64, Underflow> {
        self.peek_nth(0)
    }

    /// `peek_nth(0)` is the top of the stack, `peek_nth(1)` the value below it
    pub fn peek_nth(&self, n: usize) -> Result<i64, Underflow> {
        self.require(n + 1)?;
        Ok(self.0[self.0.len() - 1 - n])
    }

    /// fails unless at least `n` values are on the stack
    pub fn require(&self, n: usize) -> Result<(), Underflow> {
        if self.0.len() < n {
            Err(Underflow {
                needed: n,
                available: self.0.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "] <-- top")
    }
}
