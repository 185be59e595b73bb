mod error;

use argh::FromArgs;
use cluster_suites::register_all;
use env_logger::Builder;
use error::Result;
use log::LevelFilter;
use snafu::ResultExt;
use test_harness::{run_local, TestRegistry};

#[derive(FromArgs)]
/// Runs the native functions of the cluster test suites on the machine under test.
struct Args {
    /// set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[argh(option, default = "LevelFilter::Info")]
    log_level: LevelFilter,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Command {
    /// Run one native function of a test
    Run(Run),
    /// List the native functions of every test
    List(List),
}

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "run",
    description = "Run one native function of a registered test"
)]
struct Run {
    /// the name of the test, e.g. coreos.basic
    #[argh(positional)]
    test: String,

    /// the name of the native function, e.g. MachineID
    #[argh(positional)]
    function: String,
}

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "list",
    description = "List the native functions of every registered test"
)]
struct List {}

fn main() {
    let args: Args = argh::from_env();
    init_logger(args.log_level);
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut registry = TestRegistry::new();
    register_all(&mut registry).context(error::RegistrySnafu)?;

    match args.command {
        Command::Run(run) => {
            run_local(&registry, &run.test, &run.function).context(error::NativeSnafu)
        }
        Command::List(_) => {
            for descriptor in registry.iter() {
                for function in descriptor.native_functions().names() {
                    println!("{} {}", descriptor.name(), function);
                }
            }
            Ok(())
        }
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use the default log level for our crates only.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("cluster_suites"), level)
                .filter(Some("test_harness"), level)
                .init();
        }
    }
}
