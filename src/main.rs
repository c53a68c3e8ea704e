use std::process::ExitCode;

fn main() -> ExitCode {
    deeplio::cli::run()
}
