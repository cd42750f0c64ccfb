mod app;
mod cli;
mod live;
mod logging;
mod session;
mod sink;

use clap::Parser;

use crate::app::App;
use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_format, cli.verbose);
    let config = cli.experiment_config()?;
    App::new(config, cli.windowed)?.run()
}
