use std::process::ExitCode;

fn main() -> ExitCode {
    helixbook_cli::run()
}
