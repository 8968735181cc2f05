//! gemscribe server binary.
//! Run with: cargo run --bin gemscribe-server

use std::process::ExitCode;

use gemscribe::start_server;

fn main() -> ExitCode {
    start_server::run()
}
