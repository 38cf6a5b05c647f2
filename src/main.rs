#[tokio::main]
async fn main() {
    if let Err(error) = chronoflow::run().await {
        eprintln!("chronoflow failed: {error}");
        std::process::exit(1);
    }
}
