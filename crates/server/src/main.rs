#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hub_server::run().await
}
