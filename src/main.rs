use clap::Parser;

use relief::cli::{run_cli, Args};
use relief::utils::logging;

#[tokio::main]
async fn main() {
    logging::init();
    let args = Args::parse();

    if let Err(e) = run_cli(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
