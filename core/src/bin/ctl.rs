/// CLI for driving a running OneBridge daemon
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    onebridge_core::cli_app::run(args).await
}
