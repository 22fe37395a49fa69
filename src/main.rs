/// Main entry point for the order lookup service
///
/// This serves as a thin wrapper that delegates to the interfaces layer.
/// The actual application logic is implemented in `interfaces::cli`.

use order_cache::interfaces::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        tracing::error!(error = %e, "order cache failed to start");
        std::process::exit(1);
    }
}
