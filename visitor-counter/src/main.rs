// a failed invocation must never take the whole process down
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use {
    std::{env, path::PathBuf, process::exit, sync::Arc},
    anyhow::Context,
    tracing::{info, error},
    tracing_subscriber::FmtSubscriber,
    clap::{Parser, Subcommand},
    tokio::net::TcpListener,
    rayon::ThreadPoolBuilder,
    visitor_counter::{
        config::{Config, CONFIG_PATH_ENV},
        http::{HttpHandler, serve},
        service::{CounterService, invoke_once},
        storage::shared_store,
    },
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to yaml config file. Falls back to $VISITOR_COUNTER_CONFIG, then to built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the counter over http, one invocation per request.
    Serve,
    /// Run a single invocation and print the response envelope.
    Invoke,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = Config::load(config_path.as_deref())
        .with_context(|| format!("failed to load config from {config_path:?}"))?;

    // stdout carries the envelope printed by `invoke`
    FmtSubscriber::builder()
        .with_max_level(config.log_level.as_tracing_level())
        .with_writer(std::io::stderr)
        .init();
    if let Some(config_path) = &config_path {
        info!("loaded config from {config_path:?}");
    }

    let store = shared_store(&config.store).context("failed to initialize counter store")?;
    let service = Arc::new(CounterService::new(store).with_error_policy(config.error_policy));

    match args.command {
        Command::Serve => {
            let thread_pool = ThreadPoolBuilder::new()
                .thread_name(|index| format!("counter-worker-{index}"))
                .build()
                .context("failed to build worker thread pool")?;
            let listener = TcpListener::bind(config.listen).await
                .with_context(|| format!("failed to bind to {}", config.listen))?;

            serve(listener, HttpHandler::new(service, Arc::new(thread_pool))).await;
        },
        Command::Invoke => {
            let result = tokio::task::spawn_blocking(move || invoke_once(&service)).await
                .context("invocation task failed")?;

            match result {
                Ok(envelope) => println!("{envelope}"),
                Err(err) => {
                    error!("invocation failed: {err}");
                    exit(1);
                }
            }
        },
    }

    Ok(())
}
