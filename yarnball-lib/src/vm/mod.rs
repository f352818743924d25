//! The tree walking evaluator.
//!
//! An [`Evaluator`] owns the value stack and the table of registered subpatterns. Both survive
//! between calls to [`Evaluator::eval`], so a host can feed it one chunk of source at a time.

mod stack;

pub use stack::{Stack, Underflow};

use crate::ast::*;
use crate::stitch::Stitch;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use thiserror::Error;

/// how deep blocks and subpattern calls may nest unless configured otherwise
pub const DEFAULT_MAX_DEPTH: usize = 1000;

#[derive(Error, Debug)]
#[error("line {line}: {kind}")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: ErrorKind,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("undefined subpattern `{0}`")]
    UndefinedGroup(String),

    #[error("stack underflow in `{op}`, {underflow}")]
    StackUnderflow { op: &'static str, underflow: Underflow },

    #[error("division by zero in `{0}`")]
    DivisionByZero(Stitch),

    #[error("arithmetic overflow in `{0}`")]
    Overflow(Stitch),

    #[error("condition must be 0 or 1, found {0}")]
    InvalidCondition(i64),

    #[error("subpattern `{group}` got the name `{arg}` as argument, only integers can be passed")]
    InvalidArgument { group: String, arg: String },

    #[error("{0} is not a valid character")]
    InvalidCharacter(i64),

    #[error("`{0}` is missing its operand")]
    MissingOperand(Stitch),

    #[error("blocks and subpattern calls nested more than {0} deep")]
    RecursionLimit(usize),

    #[error("could not write output: {0}")]
    Output(#[from] io::Error),
}

impl ErrorKind {
    pub fn at(self, line: usize) -> RuntimeError {
        RuntimeError { line, kind: self }
    }
}

/// How an evaluation pass ended. Neither is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// every instruction ran
    Finished,
    /// `fo` stopped the pass early
    Halted,
}

/// returned by all exec_ functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecOutcome {
    Continue,
    Halt,
}

type ExecResult = Result<ExecOutcome, RuntimeError>;

macro_rules! bail {
    ($line:expr, $($kind:tt)*) => {
        return Err(ErrorKind::$($kind)*.at($line))
    };
}

fn underflow(op: &'static str, line: usize) -> impl Fn(Underflow) -> RuntimeError {
    move |underflow| ErrorKind::StackUnderflow { op, underflow }.at(line)
}

pub struct Evaluator<W: Write = io::Stdout> {
    stack: Stack,
    groups: HashMap<String, Rc<GroupDef>>,
    out: W,
    max_depth: usize,
    depth: usize,
}

impl Evaluator<io::Stdout> {
    /// creates an evaluator that prints to standard output
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Evaluator<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Evaluator<W> {
    pub fn with_output(out: W) -> Self {
        Evaluator {
            stack: Stack::default(),
            groups: HashMap::new(),
            out,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// names of all registered subpatterns, sorted
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// forgets the stack and every registered subpattern
    pub fn reset(&mut self) {
        self.stack.clear();
        self.groups.clear();
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs a program to its end, or until `fo` or the first error.
    ///
    /// Whatever the program did before a failing instruction stays done, the failing
    /// instruction itself leaves the stack as it was. Output is flushed in every case.
    pub fn eval(&mut self, program: &Program) -> Result<Completion, RuntimeError> {
        log::debug!(
            "evaluating {} instructions, stack {}",
            program.len(),
            self.stack
        );
        self.depth = 0;
        let res = self.exec_block(program);
        let flushed = self.out.flush();
        let completion = match res? {
            ExecOutcome::Continue => Completion::Finished,
            ExecOutcome::Halt => Completion::Halted,
        };
        let last_line = program.last().map_or(1, Instruction::line);
        flushed.map_err(|e| ErrorKind::Output(e).at(last_line))?;
        log::debug!("evaluation {:?}, stack {}", completion, self.stack);
        Ok(completion)
    }

    fn exec_block(&mut self, body: &[Instruction]) -> ExecResult {
        for instruction in body {
            if self.exec(instruction)? == ExecOutcome::Halt {
                return Ok(ExecOutcome::Halt);
            }
        }
        Ok(ExecOutcome::Continue)
    }

    fn exec(&mut self, instruction: &Instruction) -> ExecResult {
        log::trace!("line {}: {}", instruction.line(), instruction);
        match instruction {
            Instruction::Primitive(p) => self.exec_primitive(p),
            Instruction::Repeat(r) => self.exec_repeat(r),
            Instruction::Conditional(c) => self.exec_conditional(c),
            Instruction::GroupDef(def) => {
                log::debug!("registering subpattern `{}`", def.name);
                self.groups.insert(def.name.clone(), Rc::clone(def));
                Ok(ExecOutcome::Continue)
            }
            Instruction::GroupUse(u) => self.exec_group_use(u),
        }
    }

    fn exec_primitive(&mut self, p: &Primitive) -> ExecResult {
        use Stitch::*;
        let line = p.line;
        let underflow = underflow(p.stitch.name(), line);
        let overflow = |v: Option<i64>| v.ok_or(ErrorKind::Overflow(p.stitch));
        self.stack.require(p.stitch.arity()).map_err(&underflow)?;

        match p.stitch {
            Ch => {
                let Some(n) = p.operand else {
                    bail!(line, MissingOperand(Ch));
                };
                self.stack.push(n);
            }
            Sc => {
                self.stack.pop().map_err(&underflow)?;
            }
            Dc => self.binary(p, |a, b| {
                if b == 0 {
                    Err(ErrorKind::DivisionByZero(Dc))
                } else {
                    overflow(a.checked_mul(b))
                }
            })?,
            Bob => self.binary(p, |a, b| overflow(b.checked_add(a)))?,
            Hdc => self.binary(p, |a, b| overflow(b.checked_sub(a)))?,
            Tr => self.binary(p, |a, b| {
                if a == 0 {
                    Err(ErrorKind::DivisionByZero(Tr))
                } else {
                    overflow(b.checked_div(a))
                }
            })?,
            Cl => self.binary(p, |a, b| {
                if a == 0 {
                    Err(ErrorKind::DivisionByZero(Cl))
                } else {
                    overflow(b.checked_rem(a))
                }
            })?,
            Greater => self.binary(p, |a, b| Ok((b > a) as i64))?,
            Less => self.binary(p, |a, b| Ok((b < a) as i64))?,
            Eq => self.binary(p, |a, b| Ok((b == a) as i64))?,
            Neq => self.binary(p, |a, b| Ok((b != a) as i64))?,
            Inc => self.unary(p, |v| overflow(v.checked_add(1)))?,
            Dec => self.unary(p, |v| overflow(v.checked_sub(1)))?,
            Slst => {
                let top = self.stack.peek().map_err(&underflow)?;
                self.stack.push(top);
            }
            Swap => {
                let a = self.stack.pop().map_err(&underflow)?;
                let b = self.stack.pop().map_err(&underflow)?;
                self.stack.push(a);
                self.stack.push(b);
            }
            Turn => {
                let a = self.stack.pop().map_err(&underflow)?;
                let b = self.stack.pop().map_err(&underflow)?;
                let c = self.stack.pop().map_err(&underflow)?;
                self.stack.push(b);
                self.stack.push(a);
                self.stack.push(c);
            }
            Yo => {
                let v = self.stack.peek().map_err(&underflow)?;
                writeln!(self.out, "{}", v).map_err(|e| ErrorKind::Output(e).at(line))?;
                self.stack.pop().map_err(&underflow)?;
            }
            Pic => {
                let v = self.stack.peek().map_err(&underflow)?;
                let Some(ch) = u32::try_from(v).ok().and_then(char::from_u32) else {
                    bail!(line, InvalidCharacter(v));
                };
                write!(self.out, "{}", ch).map_err(|e| ErrorKind::Output(e).at(line))?;
                self.stack.pop().map_err(&underflow)?;
            }
            Fo => {
                log::debug!("line {}: fasten off", line);
                return Ok(ExecOutcome::Halt);
            }
        }
        Ok(ExecOutcome::Continue)
    }

    /// replaces the top two values `b a` by `op(a, b)`, `a` being the top
    fn binary(
        &mut self,
        p: &Primitive,
        op: impl FnOnce(i64, i64) -> Result<i64, ErrorKind>,
    ) -> Result<(), RuntimeError> {
        let underflow = underflow(p.stitch.name(), p.line);
        let a = self.stack.peek_nth(0).map_err(&underflow)?;
        let b = self.stack.peek_nth(1).map_err(&underflow)?;
        let v = op(a, b).map_err(|kind| kind.at(p.line))?;
        self.stack.pop().map_err(&underflow)?;
        self.stack.pop().map_err(&underflow)?;
        self.stack.push(v);
        Ok(())
    }

    fn unary(
        &mut self,
        p: &Primitive,
        op: impl FnOnce(i64) -> Result<i64, ErrorKind>,
    ) -> Result<(), RuntimeError> {
        let underflow = underflow(p.stitch.name(), p.line);
        let v = op(self.stack.peek().map_err(&underflow)?).map_err(|kind| kind.at(p.line))?;
        self.stack.pop().map_err(&underflow)?;
        self.stack.push(v);
        Ok(())
    }

    fn exec_repeat(&mut self, r: &Repeat) -> ExecResult {
        self.check_depth(r.line)?;
        let count = match r.count {
            Some(n) => n,
            None => self.stack.pop().map_err(underflow("rep", r.line))?,
        };
        log::trace!("line {}: repeating {} times", r.line, count);
        self.depth += 1;
        let mut res = Ok(ExecOutcome::Continue);
        for _ in 0..count {
            res = self.exec_block(&r.body);
            if !matches!(res, Ok(ExecOutcome::Continue)) {
                break;
            }
        }
        self.depth -= 1;
        res
    }

    fn exec_conditional(&mut self, c: &Conditional) -> ExecResult {
        let v = self.stack.peek().map_err(underflow("if", c.line))?;
        let body = match v {
            1 => &c.then_body,
            0 => &c.else_body,
            _ => bail!(c.line, InvalidCondition(v)),
        };
        self.check_depth(c.line)?;
        self.stack.pop().map_err(underflow("if", c.line))?;
        self.depth += 1;
        let res = self.exec_block(body);
        self.depth -= 1;
        res
    }

    fn exec_group_use(&mut self, u: &GroupUse) -> ExecResult {
        let Some(def) = self.groups.get(&u.name).cloned() else {
            bail!(u.line, UndefinedGroup(u.name.clone()));
        };
        self.check_depth(u.line)?;
        let args = u
            .args
            .iter()
            .map(|arg| match arg {
                Argument::Int(n) => Ok(*n),
                Argument::Name(name) => Err(ErrorKind::InvalidArgument {
                    group: u.name.clone(),
                    arg: name.clone(),
                }
                .at(u.line)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        for n in args {
            self.stack.push(n);
        }

        log::debug!("entering subpattern `{}` at depth {}", u.name, self.depth);
        self.depth += 1;
        let res = self.exec_block(&def.body);
        self.depth -= 1;
        res
    }

    /// Every body entered by a repeat, a conditional or a subpattern call is one level of
    /// native recursion, so all three count against `max_depth`.
    fn check_depth(&self, line: usize) -> Result<(), RuntimeError> {
        if self.depth >= self.max_depth {
            bail!(line, RecursionLimit(self.max_depth));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn evaluator() -> Evaluator<Vec<u8>> {
        Evaluator::with_output(vec![])
    }

    fn eval_with(
        ev: &mut Evaluator<Vec<u8>>,
        src: &str,
    ) -> Result<Completion, RuntimeError> {
        ev.eval(&parse(src).unwrap())
    }

    /// runs `src` on a fresh evaluator and returns the final stack and the output
    fn run(src: &str) -> (Vec<i64>, String) {
        let mut ev = evaluator();
        eval_with(&mut ev, src).unwrap();
        let stack = ev.stack().to_vec();
        (stack, String::from_utf8(ev.into_output()).unwrap())
    }

    fn run_err(src: &str) -> (RuntimeError, Vec<i64>) {
        let mut ev = evaluator();
        let err = eval_with(&mut ev, src).unwrap_err();
        (err, ev.stack().to_vec())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("ch 3 ch 4 bob").0, vec![7]);
        assert_eq!(run("ch 3 ch 4 dc").0, vec![12]);
        assert_eq!(run("ch 10 ch 4 hdc").0, vec![6]);
        assert_eq!(run("ch 10 ch 4 tr").0, vec![2]);
        assert_eq!(run("ch 10 ch 4 cl").0, vec![2]);
        assert_eq!(run("ch 1 ch 4 hdc").0, vec![-3]);
        assert_eq!(run("ch 5 inc ch 5 dec").0, vec![6, 4]);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run("ch 2 ch 1 >").0, vec![1]);
        assert_eq!(run("ch 2 ch 1 <").0, vec![0]);
        assert_eq!(run("ch 2 ch 2 eq ch 2 ch 2 neq").0, vec![1, 0]);
    }

    #[test]
    fn test_stack_manipulation() {
        assert_eq!(run("ch 1 slst").0, vec![1, 1]);
        assert_eq!(run("ch 1 ch 2 swap").0, vec![2, 1]);
        assert_eq!(run("ch 1 ch 2 swap swap").0, vec![1, 2]);
        assert_eq!(run("ch 1 ch 2 ch 3 turn").0, vec![2, 3, 1]);
        assert_eq!(run("ch 9 ch 1 ch 2 ch 3 turn turn turn").0, vec![9, 1, 2, 3]);
        assert_eq!(run("ch 1 ch 2 sc").0, vec![1]);
    }

    #[test]
    fn test_output() {
        assert_eq!(run("ch 42 yo ch 72 pic ch 105 pic").1, "42\nHi");
        assert_eq!(run("ch 0 ch 5 hdc yo").1, "-5\n");
    }

    #[test]
    fn test_errors_leave_the_stack_alone() {
        let (err, stack) = run_err("ch 1 bob");
        assert!(matches!(
            err.kind,
            ErrorKind::StackUnderflow { op: "bob", underflow: Underflow { needed: 2, available: 1 } }
        ));
        assert_eq!(stack, vec![1]);

        let (err, stack) = run_err("ch 7 ch 0 tr");
        assert!(matches!(err.kind, ErrorKind::DivisionByZero(Stitch::Tr)));
        assert_eq!(stack, vec![7, 0]);

        let (err, stack) = run_err("ch 7 ch 0 cl");
        assert!(matches!(err.kind, ErrorKind::DivisionByZero(Stitch::Cl)));
        assert_eq!(stack, vec![7, 0]);

        let (err, stack) = run_err("ch 1 ch 2 turn");
        assert!(matches!(err.kind, ErrorKind::StackUnderflow { op: "turn", .. }));
        assert_eq!(stack, vec![1, 2]);
    }

    #[test]
    fn test_dc_rejects_zero_below_the_top() {
        let (err, stack) = run_err("ch 0 ch 5 dc");
        assert!(matches!(err.kind, ErrorKind::DivisionByZero(Stitch::Dc)));
        assert_eq!(stack, vec![0, 5]);
        assert_eq!(run("ch 5 ch 0 dc").0, vec![0]);
    }

    #[test]
    fn test_overflow() {
        let (err, stack) = run_err("ch 9223372036854775807 inc");
        assert!(matches!(err.kind, ErrorKind::Overflow(Stitch::Inc)));
        assert_eq!(stack, vec![i64::MAX]);

        let (err, _) = run_err("ch 9223372036854775807 ch 2 dc");
        assert!(matches!(err.kind, ErrorKind::Overflow(Stitch::Dc)));
        let (err, _) = run_err("ch 0 ch 9223372036854775807 hdc dec ch 1 hdc");
        assert!(matches!(err.kind, ErrorKind::Overflow(Stitch::Hdc)));
    }

    #[test]
    fn test_invalid_character() {
        let (err, stack) = run_err("ch 1114112 pic");
        assert!(matches!(err.kind, ErrorKind::InvalidCharacter(1114112)));
        assert_eq!(stack, vec![1114112]);
        let (err, _) = run_err("ch 55296 pic");
        assert!(matches!(err.kind, ErrorKind::InvalidCharacter(55296)));
    }

    #[test]
    fn test_missing_operand() {
        let program = Program(vec![Primitive::new(Stitch::Ch, 4).into()]);
        let err = evaluator().eval(&program).unwrap_err();
        assert_eq!(err.line, 4);
        assert!(matches!(err.kind, ErrorKind::MissingOperand(Stitch::Ch)));
    }

    #[test]
    fn test_conditional() {
        assert_eq!(run("ch 1 if ch 10 else ch 20 end").0, vec![10]);
        assert_eq!(run("ch 0 if ch 10 else ch 20 end").0, vec![20]);
        assert_eq!(run("ch 0 if ch 10 end").0, vec![]);
        let (err, stack) = run_err("ch 2 if ch 10 else ch 20 end");
        assert!(matches!(err.kind, ErrorKind::InvalidCondition(2)));
        assert_eq!(stack, vec![2]);
        let (err, _) = run_err("if end");
        assert!(matches!(err.kind, ErrorKind::StackUnderflow { op: "if", .. }));
    }

    #[test]
    fn test_repeat() {
        assert_eq!(run("* ch 1 ; rep from * 3").0, vec![1, 1, 1]);
        assert_eq!(run("ch 5 * ch 1 bob ; rep from * 0 times").0, vec![5]);
        assert_eq!(run("ch 2 * ch 7 ; rep from *").0, vec![7, 7]);
        assert_eq!(run("ch 0 ch 3 hdc * ch 7 ; rep from *").0, vec![]);
        let (err, _) = run_err("* ch 7 ; rep from *");
        assert!(matches!(err.kind, ErrorKind::StackUnderflow { op: "rep", .. }));
    }

    #[test]
    fn test_halt() {
        let mut ev = evaluator();
        let completion = eval_with(&mut ev, "ch 1 yo fo ch 2 yo").unwrap();
        assert_eq!(completion, Completion::Halted);
        assert_eq!(ev.output(), b"1\n");

        let (stack, _) = run("subpattern stop = (fo) * ch 1 stop ; rep from * 5 ch 9");
        assert_eq!(stack, vec![1]);

        // a halt only ends the pass it happens in
        assert_eq!(eval_with(&mut ev, "ch 3").unwrap(), Completion::Finished);
        assert_eq!(**ev.stack(), vec![3]);
    }

    #[test]
    fn test_groups() {
        assert_eq!(run("subpattern double = (ch 2 dc) ch 5 double yo").1, "10\n");
        assert_eq!(
            run("subpattern double = (ch 2 dc) ch 5 use double yo").1,
            run("subpattern double = (ch 2 dc) ch 5 double yo").1
        );
        let (err, _) = run_err("square subpattern square = (slst dc)");
        assert!(matches!(err.kind, ErrorKind::UndefinedGroup(ref name) if name == "square"));
    }

    #[test]
    fn test_group_redefinition_and_recursion() {
        assert_eq!(
            run("subpattern x = (ch 1) subpattern x = (ch 2) x").0,
            vec![2]
        );
        let countdown = "subpattern down = (slst yo dec slst ch 0 > if down else sc end) ch 3 down";
        assert_eq!(run(countdown).1, "3\n2\n1\n");
    }

    #[test]
    fn test_group_arguments_are_pushed() {
        assert_eq!(run("subpattern add(a b) = (bob) use add(3 4) yo").1, "7\n");
        assert_eq!(run("subpattern seq = () use seq(1 2 3)").0, vec![1, 2, 3]);
        let (err, stack) = run_err("subpattern f(a) = (yo) use f(1 x)");
        assert!(matches!(err.kind, ErrorKind::InvalidArgument { ref arg, .. } if arg == "x"));
        assert_eq!(stack, vec![]);
    }

    #[test]
    fn test_recursion_limit() {
        let mut ev = evaluator().with_max_depth(20);
        let err = eval_with(&mut ev, "subpattern forever = (forever) forever").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RecursionLimit(20)));

        // the depth counter unwinds, so later calls work again
        eval_with(&mut ev, "subpattern one = (ch 1) one").unwrap();
        assert_eq!(**ev.stack(), vec![1]);
    }

    #[test]
    fn test_blocks_count_towards_the_depth_limit() {
        let mut ev = evaluator().with_max_depth(3);
        assert!(eval_with(&mut ev, "* * * ch 1 ; rep from * 1 ; rep from * 1 ; rep from * 1").is_ok());
        let src = "ch 1 * * * if ch 5 end ; rep from * 1 ; rep from * 1 ; rep from * 1";
        let err = eval_with(&mut ev, src).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RecursionLimit(3)));
        // the limit is checked before the condition is popped
        assert_eq!(**ev.stack(), vec![1, 1]);
    }

    #[test]
    fn test_default_depth_limit_fails_cleanly() {
        // the default limit has to hold on a 2 MiB thread, the size test threads get
        let on_small_stack = std::thread::Builder::new()
            .stack_size(2 << 20)
            .spawn(|| {
                // each call of `loop` opens a repeat, a conditional and the subpattern body
                let src = "subpattern loop = (* ch 1 if loop end ; rep from * 1) loop";
                let (err, _) = run_err(src);
                assert!(matches!(err.kind, ErrorKind::RecursionLimit(DEFAULT_MAX_DEPTH)));

                let wrapped = format!(
                    "subpattern loop = ({} loop {}) loop",
                    "* ".repeat(8),
                    "; rep from * 1 ".repeat(8)
                );
                let (err, _) = run_err(&wrapped);
                assert!(matches!(err.kind, ErrorKind::RecursionLimit(DEFAULT_MAX_DEPTH)));
            })
            .unwrap();
        on_small_stack.join().unwrap();
    }

    #[test]
    fn test_deep_recursion_below_the_limit() {
        // two levels per step, a conditional and the call
        let src = "subpattern down = (dec slst ch 0 > if down end) ch 400 down";
        let (stack, _) = run(src);
        assert_eq!(stack, vec![0]);
    }

    #[test]
    fn test_state_persists_between_passes() {
        let mut ev = evaluator();
        eval_with(&mut ev, "subpattern push = (ch 4) ch 1").unwrap();
        eval_with(&mut ev, "push push").unwrap();
        assert_eq!(**ev.stack(), vec![1, 4, 4]);
        assert_eq!(ev.group_names(), vec!["push"]);

        // side effects before a failure are kept
        assert!(eval_with(&mut ev, "sc sc bob").is_err());
        assert_eq!(**ev.stack(), vec![1]);

        ev.reset();
        assert!(ev.stack().is_empty());
        assert!(ev.group_names().is_empty());
    }

    #[test]
    fn test_errors_report_their_line() {
        let (err, _) = run_err("ch 1\nsubpattern f = (\n  sc\n  sc\n)\nf");
        assert_eq!(err.line, 4);
        assert_eq!(
            err.to_string(),
            "line 4: stack underflow in `sc`, needed 1 values but the stack holds 0"
        );
    }
}
