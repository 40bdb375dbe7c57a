#[tokio::main]
async fn main() {
    if let Err(e) = healthvault_lib::run().await {
        eprintln!("healthvault: {e}");
        std::process::exit(1);
    }
}
