use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    luks_suspend::run().await
}
