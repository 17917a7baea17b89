use std::io;

use boost_train::{
    app::{self, Cli},
    cluster::LocalCluster,
    config::ProcessEnv,
    logging,
};
use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("{err}");
    }

    let cli = Cli::parse();

    let mut cluster = LocalCluster::new();
    let mut stdout = io::stdout().lock();
    app::run(&cli, &mut cluster, &ProcessEnv, &mut stdout)?;

    Ok(())
}
