mod app;
mod cli;
mod config;
mod core;
mod executors;
mod organizers;
mod plugins;
mod reporters;
mod ui;
mod utils;

use clap::Parser;

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = cli::args::Cli::parse();
    match app::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fatal: {:#}", err);
            std::process::exit(1);
        }
    }
}
