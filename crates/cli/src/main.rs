use std::process::ExitCode;

fn main() -> ExitCode {
    autoresponder_cli::run()
}
