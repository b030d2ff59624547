#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pcdb_lib::run().await
}
