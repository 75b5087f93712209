use std::{error::Error, net::SocketAddr, path::PathBuf, process::exit};

use clap::{Parser, Subcommand};
use foodgram::{
    actions::{load_ingredients, load_tags},
    routes::routes,
    schema::{NewIngredient, NewTag},
    Config, State,
};
use serde::de::DeserializeOwned;
use tokio::signal::ctrl_c;
use warp::Filter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (the default)
    Serve,
    /// Load ingredients from a JSON array of {name, measurement_unit}
    LoadIngredients { file: PathBuf },
    /// Load tags from a JSON array of {name, color, slug}
    LoadTags { file: PathBuf },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info,sqlx=warn"))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command.unwrap_or(Command::Serve)).await {
        log::error!("{e}");
        exit(1);
    }
}

async fn run(command: Command) -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;

    log::info!("Initializing state...");
    let state = State::connect(config).await?;

    match command {
        Command::Serve => serve(state).await?,
        Command::LoadIngredients { file } => {
            let ingredients: Vec<NewIngredient> = read_json(&file).await?;
            let inserted = load_ingredients(ingredients, &state.pool, state.cache.clone()).await?;
            println!("Inserted {inserted} ingredients");
        }
        Command::LoadTags { file } => {
            let tags: Vec<NewTag> = read_json(&file).await?;
            let inserted = load_tags(tags, &state.pool, state.cache.clone()).await?;
            println!("Inserted {inserted} tags");
        }
    }

    Ok(())
}

async fn read_json<T: DeserializeOwned>(file: &PathBuf) -> Result<T, Box<dyn Error>> {
    let content = tokio::fs::read_to_string(file).await?;
    Ok(serde_json::from_str(&content)?)
}

async fn serve(state: std::sync::Arc<State>) -> Result<(), Box<dyn Error>> {
    let address = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    log::info!("Binding to {address}");

    let app = routes(state).with(warp::log("foodgram::http"));
    let (address, server) =
        warp::serve(app).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
    log::info!("Server running on {address}");

    server.await;
    log::info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
