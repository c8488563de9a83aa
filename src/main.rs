use hash_benchmark::cli::{self, CliError};
use hash_benchmark::run;
use std::process::ExitCode;

fn main() -> ExitCode {
    let invocation = match cli::parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            match err {
                CliError::Usage { .. } | CliError::Help(_) => print!("{}", err),
                CliError::Argument { .. } => eprintln!("{}", err),
            }
            return ExitCode::from(err.exit_code());
        }
    };

    match run(&invocation) {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {:#}", invocation.config.program_name, e);
            ExitCode::FAILURE
        }
    }
}
