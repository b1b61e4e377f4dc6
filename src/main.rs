use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match trudge::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".bright_red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
