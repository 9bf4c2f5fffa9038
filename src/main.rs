use clap::Parser;
use rq_broker::config::{Cli, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            // clap's own `exit()` uses code 2; a bad invocation should exit 1.
            eprint!("{error}");
            std::process::exit(1);
        }
        Err(help_or_version) => {
            print!("{help_or_version}");
            std::process::exit(0);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let working_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(error) => {
            eprintln!("can't read working directory: {error}");
            std::process::exit(1);
        }
    };

    let config = Config::new(cli.port, working_dir);

    let metrics = match rq_broker::server::run(config).await {
        Ok(metrics) => metrics,
        Err(error) => {
            eprintln!("fatal startup error: {error:#}");
            std::process::exit(1);
        }
    };

    metrics
        .dump("rq_server", &mut std::io::stdout())
        .expect("writing metrics to stdout");
}
