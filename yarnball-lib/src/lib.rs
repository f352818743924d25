//! Yarnball is a stack language whose instructions are crochet stitches.
//!
//! What you need to do to execute a script is the following:
//! 1. load a source file into a string, and optionally clean it up with
//!    [`preprocessor::preprocess`] if it is a whole pattern file with a stitch guide.
//! 1. create a [`vm::Evaluator`]. It keeps its stack and its subpatterns between runs, so
//!    create it once per session, not once per script.
//! 1. call [`run`], which lexes and parses the source into an [`ast::Program`] and evaluates it:
//!
//!    ```
//!    use yarnball_lib::{run, vm::{Completion, Evaluator}};
//!
//!    let mut ev = Evaluator::with_output(Vec::<u8>::new());
//!    let completion = run("ch 3 ch 4 bob yo", &mut ev).unwrap();
//!    assert_eq!(completion, Completion::Finished);
//!    assert_eq!(ev.output(), b"7\n");
//!    ```
//!
//! If you need the tree itself, [`parse`] stops after parsing, and
//! [`Evaluator::eval`](vm::Evaluator::eval) runs a program you already have.
pub mod ast;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod stitch;
pub mod vm;

pub use parser::{parse, ParseError};
pub use vm::{Completion, Evaluator, RuntimeError};

use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse: {0}")]
    Parse(#[from] ParseError),

    #[error("Runtime: {0}")]
    Runtime(#[from] RuntimeError),
}

/// parses `src` and evaluates it on `ev`. Nothing runs if parsing fails.
pub fn run<W: Write>(src: &str, ev: &mut Evaluator<W>) -> Result<Completion, Error> {
    let program = parse(src)?;
    Ok(ev.eval(&program)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_carry_their_phase() {
        let mut ev = Evaluator::with_output(Vec::<u8>::new());
        let err = run("if yo", &mut ev).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().starts_with("Parse: line 1"));

        let err = run("ch 1 ch 0 tr", &mut ev).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(err.to_string(), "Runtime: line 1: division by zero in `tr`");
    }

    #[test]
    fn test_parse_errors_run_nothing() {
        let mut ev = Evaluator::with_output(Vec::<u8>::new());
        assert!(run("ch 1 yo )", &mut ev).is_err());
        assert!(ev.stack().is_empty());
        assert!(ev.output().is_empty());
    }
}
