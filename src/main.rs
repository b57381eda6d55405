use color_eyre::Result;
use structopt::StructOpt;
use ugi_arena::cli::Opt;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    opt.run().await
}
