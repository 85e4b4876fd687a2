use std::process::ExitCode;

fn main() -> ExitCode {
    partsmart_cli::run()
}
