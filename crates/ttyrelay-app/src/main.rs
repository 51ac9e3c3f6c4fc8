use anyhow::Result;
use clap::Parser;
use ttyrelay::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    ttyrelay::run(cli).await
}
