use circleci_provider::{init_logging, serve, CircleCiProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting CircleCI provider");
    serve(CircleCiProvider::new()).await
}
