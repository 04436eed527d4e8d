use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dailyquest::api::{self, SecurityConfig};
use dailyquest::config::AppConfig;
use dailyquest::db::Database;

#[derive(Parser)]
#[command(name = "dailyquest")]
#[command(about = "Gamified habit and todo tracker with XP, levels and streaks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// SQLite database file (overrides DAILYQUEST_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Apply pending database migrations and exit
    Migrate {
        /// SQLite database file (overrides DAILYQUEST_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the XP threshold of each level for the configured curve
    Levels {
        #[arg(long, default_value = "20")]
        up_to: u32,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dailyquest=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(host: String, port: u16, db_path: Option<PathBuf>, config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting DailyQuest server on {}:{}", host, port);

    let db = open_database(db_path.or_else(|| config.database_path.clone()))?;
    let security = SecurityConfig::from_env();

    if let Some(limiter) = security.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        });
    }

    let app = api::create_router_with_config(db, config, security);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("DailyQuest server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::debug!(curve = ?config.progression.level_curve, "Loaded configuration");

    match cli.command {
        Some(Commands::Serve { host, port, db }) => serve(host, port, db, config).await?,
        Some(Commands::Migrate { db }) => {
            open_database(db.or(config.database_path))?;
            println!("Database is up to date");
        }
        Some(Commands::Levels { up_to }) => {
            let curve = &config.progression.level_curve;
            println!("{:>5}  {:>10}  {:>8}", "level", "total xp", "step");
            for level in 1..=up_to.max(1) {
                println!(
                    "{:>5}  {:>10}  {:>8}",
                    level,
                    curve.threshold(level),
                    curve.step_cost(level)
                );
            }
        }
        None => serve("127.0.0.1".to_string(), 3000, None, config).await?,
    }

    Ok(())
}
