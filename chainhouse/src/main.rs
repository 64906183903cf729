//! Entrypoint of the chainhouse binary

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

mod commands {
    pub(crate) mod serve;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "chainhouse",
    about = "Cache-coalesced analytics API over a columnar warehouse",
    long_about = r#"Cache-coalesced analytics API over a columnar warehouse

Examples:
    # Run the server against a local ClickHouse
    chainhouse serve --clickhouse-url http://localhost:8123 --without-auth

    # Run with full debug logging specified with LOG_FILTER
    LOG_FILTER=debug chainhouse serve --clickhouse-url http://localhost:8123 --bearer-token secret
"#
)]
struct Config {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Run the analytics API server
    Serve(commands::serve::Config),
}

#[tokio::main]
async fn main() {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    init_logs();

    match config.command {
        None => println!("command required, -h/--help for help"),
        Some(Command::Serve(config)) => {
            if let Err(e) = commands::serve::command(config).await {
                eprintln!("Serve command failed: {e}");
                std::process::exit(ReturnCode::Failure as _)
            }
        }
    }
}

fn init_logs() {
    let filter = EnvFilter::try_from_env("LOG_FILTER").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // Ignore this - a missing env file is not an error, defaults will
            // be applied when initialising the Config struct.
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(1);
        }
    };
}
