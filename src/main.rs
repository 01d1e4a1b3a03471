use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    attentio_lib::run(attentio_lib::Cli::parse()).await
}
