use netemu::cli::initialize_from_arguments;
use std::{env, process};

/// Runs the default simulation with the options given on the command line.
#[tokio::main]
async fn main() {
    println!("Netemu v{}", env!("CARGO_PKG_VERSION"));
    match initialize_from_arguments().await {
        Ok(report) => println!("{report}"),
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}
