use anyhow::Result;
use aeocheck::cli::Cli;
use aeocheck::run;
use clap::Parser;
use colored::*;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if let Err(e) = run(args).await {
        eprintln!("{} {}", "Error:".bright_red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
