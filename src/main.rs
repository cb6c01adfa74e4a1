use clap::Parser;
use design_match::Opts;
use design_match::cli::SubCommandExtend;
use design_match::config::SubCommand;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Generate(config) => config.run(&opts).await,
        SubCommand::Match(config) => config.run(&opts).await,
        SubCommand::Evaluate(config) => config.run(&opts).await,
        SubCommand::Serve(config) => config.run(&opts).await,
    }
}
