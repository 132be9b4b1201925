/// Entry point of the Creo container discovery agent.
///
/// Reads its settings from the environment (see [`creo_discovery::config::Settings`]),
/// then keeps every configured log pipeline's matched containers up to date until
/// interrupted.
///
/// # Errors
///
/// Returns an error if the settings or the configurations file are invalid.
///
/// # Examples
///
/// ```bash
/// CREO_CONFIGS_FILE=./configs.json RUST_LOG=info cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_discovery::run().await
}
