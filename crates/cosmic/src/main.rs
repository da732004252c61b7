use std::process::ExitCode;

use cosmic::runtime::Harness;

fn main() -> ExitCode {
    Harness::new().run()
}
