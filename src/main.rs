#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sitescan::run().await
}
