use clap::Parser;
use classroom_client::{
    init_errors,
    logging,
    App,
    Args,
};
use classroom_config::Config;
use color_eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;

    let args = Args::parse();
    let save = args.save;
    let config = Config::new(args)?;
    logging::log_init(&config)?;
    if save {
        config.save()?;
    }

    App::new(config).run().await
}
