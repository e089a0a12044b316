mod config;
mod model;
mod publish;
#[cfg(feature = "serve")]
mod serve;
mod store;
mod twitter;
mod unshorten;

use crate::config::PublishArgs;
#[cfg(feature = "serve")]
use crate::config::ServeArgs;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(version, about = "Caches an account's latest tweets in Redis")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the latest tweets, expand their t.co links and replace the cached batch
    Publish(PublishArgs),
    /// Serve the cached batch over HTTP
    #[cfg(feature = "serve")]
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = main2().await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn main2() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    match args.command {
        Command::Publish(args) => publish::publish(args).await,
        #[cfg(feature = "serve")]
        Command::Serve(args) => serve::serve(args).await,
    }
}
