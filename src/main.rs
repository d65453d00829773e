#[tokio::main]
async fn main() -> anyhow::Result<()> {
    podsloth_lib::run().await
}
