use rask_log_pipeline::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await?;
    Ok(())
}
