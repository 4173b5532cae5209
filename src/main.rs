//! bookshelf-rs server entry point.

use bookshelf_rs::{
    BookCatalog, Database,
    config::{BooksCommand, Cli, Command, Config},
    server,
    uploads::{SequenceNamer, UploadDir},
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging();

    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let mut config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.apply_overrides(&cli.overrides);

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force, &config).await,
        Some(Command::Books { action }) => cmd_books(action, &config).await,
        Some(Command::Serve) | None => cmd_serve(config).await,
    }
}

/// Initialize logging to stderr, so command output on stdout stays clean.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookshelf_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize config, database and upload directory.
async fn cmd_init(force: bool, config: &Config) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    std::fs::create_dir_all(&config.uploads.dir)?;
    println!("Created upload directory: {}", config.uploads.dir.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: bookshelf-rs serve");

    Ok(())
}

/// Book management commands.
async fn cmd_books(action: BooksCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match action {
        BooksCommand::List => {
            let books = db.list_books()?;
            if books.is_empty() {
                println!("No books found.");
            } else {
                println!("{:<6} {:<40} {:>10} COVER", "ID", "TITLE", "PRICE");
                println!("{}", "-".repeat(80));
                for book in books {
                    println!(
                        "{:<6} {:<40} {:>10.2} {}",
                        book.id,
                        book.title,
                        book.price,
                        book.cover.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        BooksCommand::Prune { dry_run } => {
            // Pruning never writes new covers, so the namer is unused
            let uploads =
                UploadDir::new(&config.uploads.dir, Arc::new(SequenceNamer::new("prune")))?;
            let catalog = BookCatalog::new(db, uploads);

            if dry_run {
                let orphans = catalog.find_orphans()?;
                if orphans.is_empty() {
                    println!("No orphaned covers.");
                }
                for name in &orphans {
                    println!("Would remove: {}", name);
                }
                return Ok(());
            }

            let report = catalog.prune_orphans()?;
            if report.removed.is_empty() && report.failed.is_empty() {
                println!("No orphaned covers.");
            }
            for name in &report.removed {
                println!("Removed: {}", name);
            }
            for name in &report.failed {
                eprintln!("Failed to remove: {}", name);
            }
            if !report.failed.is_empty() {
                anyhow::bail!(
                    "{} of {} orphaned cover(s) could not be removed",
                    report.failed.len(),
                    report.removed.len() + report.failed.len()
                );
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let state = server::AppState::open(config.clone())?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        uploads = %config.uploads.dir.display(),
        books = state.catalog.db().count_books()?,
        "Starting bookshelf-rs server"
    );

    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
