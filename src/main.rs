#[tokio::main]
async fn main() {
    if let Err(e) = kiosk_sync_lib::run().await {
        eprintln!("kiosk-sync: {}", e);
        std::process::exit(1);
    }
}
