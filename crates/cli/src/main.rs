use std::process::ExitCode;

fn main() -> ExitCode {
    saralytics_cli::run()
}
