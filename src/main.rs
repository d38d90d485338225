use hashicups_provider::{init_logging, serve, HashicupsProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    serve(HashicupsProvider::new()).await
}
