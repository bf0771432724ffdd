use clap::Parser;

use leadchat::config::AppConfig;
use leadchat::server;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Set the server host address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Set the server port
    #[arg(long, default_value = "5000")]
    port: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine, the environment may already be set
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    server::serve(args.host, args.port, config).await
}
