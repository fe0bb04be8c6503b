//! Cyclescope - calendar anomaly and seasonal cycle scanner

use anyhow::Result;

use cyclescope::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (CYCLESCOPE_DATA_DIR, RUST_LOG)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
