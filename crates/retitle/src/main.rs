use crate::prelude::*;
use clap::Parser;

mod error;
mod prelude;
mod rename;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Rename PDF files after the centered, capitalized title found on their first page"
)]
pub struct App {
    #[clap(flatten)]
    options: crate::rename::Options,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "RETITLE_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    crate::rename::run(app.options, app.global).await
}
