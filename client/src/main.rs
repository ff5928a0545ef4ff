mod cli;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // los logs van a stderr para no ensuciar el JSON de salida
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "client=info,runner=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run().await
}
