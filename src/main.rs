use clap::Parser;
use dotenv::dotenv;
use nfe_fetcher::run_with_config_path;

/// nfe-fetcher - downloads NF-e XML and DANFE PDF for every key in the input folder
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from `.env` file into std::env (optional)
    dotenv().ok();

    let args = Args::parse();

    // Load config, init logging and run
    run_with_config_path(&args.config).await
}
