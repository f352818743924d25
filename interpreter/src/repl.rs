//! The interactive session. One evaluator lives for the whole session, so the stack and every
//! subpattern carry over from one input to the next.

use anyhow::Result;
use crossterm::style::Stylize;
use rustyline::{error::ReadlineError, DefaultEditor};
use yarnball_lib::vm::Evaluator;
use yarnball_lib::{parse, Completion, Error};

use std::io::Write;

const BANNER: &str =
    "yarnball, `.s` shows the stack, `.g` lists subpatterns, `\\q` quits. Happy hooking!";

#[derive(PartialEq, Clone, Debug)]
enum UserCommand {
    Source(String),
    ShowStack,
    ShowGroups,
    Quit,
}

pub fn run<W: Write>(ev: &mut Evaluator<W>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut buffer = String::new();
    println!("{}", BANNER);

    use UserCommand::*;
    loop {
        match read_line(&mut rl, buffer.is_empty())? {
            Quit => break,
            ShowStack => println!("Stack: {}", ev.stack()),
            ShowGroups => {
                let names = ev.group_names();
                if names.is_empty() {
                    println!("no subpatterns defined");
                } else {
                    println!("Subpatterns: {}", names.join(", "));
                }
            }
            Source(line) => {
                let forced = line.trim().is_empty();
                if forced && buffer.is_empty() {
                    continue;
                }
                buffer.push_str(&line);
                buffer.push('\n');
                if !forced && open_parens(&buffer) > 0 {
                    continue;
                }
                match parse(&buffer) {
                    Err(e) if e.is_eof() && !forced => continue,
                    Err(e) => {
                        let line = e.line();
                        report(&e.into());
                        show_source_line(&buffer, line);
                    }
                    Ok(program) => match ev.eval(&program) {
                        Ok(Completion::Halted) => log::info!("fastened off"),
                        Ok(Completion::Finished) => {}
                        Err(e) => report(&e.into()),
                    },
                }
                buffer.clear();
            }
        }
    }
    println!("Goodbye.");
    Ok(())
}

fn read_line(rl: &mut DefaultEditor, fresh: bool) -> Result<UserCommand> {
    let prompt = if fresh { "=> " } else { ".. " };
    match rl.readline(prompt) {
        Ok(line) => {
            if !line.trim().is_empty() {
                rl.add_history_entry(line.as_str())?;
            }
            Ok(parse_line(line, fresh))
        }
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(UserCommand::Quit),
        Err(other) => Err(other.into()),
    }
}

/// commands are only recognized at the start of a new input
fn parse_line(line: String, fresh: bool) -> UserCommand {
    use UserCommand::*;
    if !fresh {
        return Source(line);
    }
    match line.trim() {
        "\\q" => Quit,
        ".s" => ShowStack,
        ".g" => ShowGroups,
        _ => Source(line),
    }
}

/// number of `(` without a matching `)`, comments excluded
fn open_parens(src: &str) -> i64 {
    src.lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(str::chars)
        .map(|c| match c {
            '(' => 1,
            ')' => -1,
            _ => 0,
        })
        .sum()
}

fn report(err: &Error) {
    let (label, msg) = match err {
        Error::Parse(e) => ("Parse:", e.to_string()),
        Error::Runtime(e) => ("Runtime:", e.to_string()),
    };
    eprintln!("{} {}", label.red().bold(), msg);
}

/// echoes the offending line of a multi-line input
fn show_source_line(src: &str, line: usize) {
    if src.lines().count() < 2 {
        return;
    }
    if let Some(text) = src.lines().nth(line.saturating_sub(1)) {
        eprintln!("{:>4} | {}", line, text.trim_end());
    }
}
