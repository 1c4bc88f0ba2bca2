//! kgraph command-line entry point.

use clap::Parser;
use kgraph_cli::{CliArgs, KgraphCli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    KgraphCli::init_logging(args.verbose, args.quiet);

    let app = KgraphCli::from_args(&args)?;
    app.run(args).await?;
    Ok(())
}
