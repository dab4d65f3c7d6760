//! Binary entrypoint for the studyhub tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    studyhub::cli::run().await
}
