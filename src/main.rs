//! feectl - fee event store CLI tool
//!
//! A developer-friendly command-line interface for inspecting sync
//! progress, querying indexed fee events, and managing chain lock leases.

use feesync::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
