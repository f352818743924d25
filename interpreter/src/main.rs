use anyhow::{Context, Result};
use clap::Parser;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use yarnball_lib::preprocessor::preprocess;
use yarnball_lib::vm::{Evaluator, DEFAULT_MAX_DEPTH};

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod repl;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// the pattern to run. Without one, an interactive session is started
    script: Option<PathBuf>,

    /// log more to stderr, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// feed the file to the lexer as is, without dropping prose and stitch guide headers
    #[arg(long)]
    raw: bool,

    /// how deep blocks and subpattern calls may nest
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// print the stack after the script ran
    #[arg(long)]
    dump_stack: bool,

    #[cfg(feature = "dev")]
    #[arg(short = 't', long)]
    show_tokens: bool,

    #[cfg(feature = "dev")]
    #[arg(short = 'a', long)]
    show_ast: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(cli.verbose)?;

    let mut ev = Evaluator::new().with_max_depth(cli.max_depth);
    match &cli.script {
        Some(path) => run_script(&cli, path, &mut ev),
        None => {
            repl::run(&mut ev)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logger(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Error)
            .set_time_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}

fn run_script(cli: &Cli, path: &Path, ev: &mut Evaluator) -> Result<ExitCode> {
    let src = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let src = if cli.raw { src } else { preprocess(&src) };

    #[cfg(feature = "dev")]
    {
        if show_dev_output(cli, &src)? {
            return Ok(ExitCode::SUCCESS);
        }
    }

    match yarnball_lib::run(&src, ev) {
        Ok(completion) => {
            log::info!("{}: {:?}", path.display(), completion);
            if cli.dump_stack {
                println!("Stack: {}", ev.stack());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// prints tokens or the tree instead of running, returns true if it did
#[cfg(feature = "dev")]
fn show_dev_output(cli: &Cli, src: &str) -> Result<bool> {
    if cli.show_tokens {
        for token in yarnball_lib::lexer::Lexer::new(src) {
            println!("{}", token);
        }
        return Ok(true);
    }
    if cli.show_ast {
        println!("{:#?}", yarnball_lib::parse(src)?);
        return Ok(true);
    }
    Ok(false)
}
