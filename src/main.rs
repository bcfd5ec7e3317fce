#![forbid(unsafe_code)]

use clap::Parser;
use hostaudit::cli::{self, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Cli::parse();
    cli::main_with(&args)
}
