use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sandtree::init();

    let cli = sandtree::ui::cli::Cli::parse();
    cli.run().await
}
