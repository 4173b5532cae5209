use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Book catalog server with cover uploads.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookshelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKSHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Values overriding the config file.
    #[command(flatten)]
    pub overrides: Overrides,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve,

    /// Book record management commands.
    Books {
        /// Book subcommand action.
        #[command(subcommand)]
        action: BooksCommand,
    },

    /// Initialize database, upload directory and default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Config overrides, also read from the environment.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Address to bind the server to.
    #[arg(short, long, env = "BOOKSHELF_BIND", global = true)]
    pub bind: Option<SocketAddr>,

    /// Path to the SQLite database file.
    #[arg(short, long, env = "BOOKSHELF_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Directory holding uploaded cover images.
    #[arg(short, long, env = "BOOKSHELF_UPLOAD_DIR", global = true)]
    pub uploads: Option<PathBuf>,
}

/// Book management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum BooksCommand {
    /// List all books.
    List,

    /// Remove cover files no book refers to.
    Prune {
        /// Only print what would be removed.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Upload directory configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// URL prefix the upload directory is served under.
    #[serde(default = "default_uploads_route")]
    pub uploads_route: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            uploads_route: default_uploads_route(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8800,
    )
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_uploads_route() -> String {
    "/uploads".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/books.db")
}

/// Upload directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Directory for cover images.
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

/// Prefix owned by the book routes.
const BOOKS_ROUTE: &str = "/books";

/// The uploads prefix is nested into the router, so it must be a plain
/// non-root path that does not overlap the book routes.
pub(crate) fn validate_uploads_route(route: &str) -> crate::error::Result<()> {
    let reject = |reason: &str| -> crate::error::Result<()> {
        Err(crate::error::AppError::Config(format!(
            "uploads_route {}: {:?}",
            reason, route
        )))
    };

    if !route.starts_with('/') {
        return reject("must start with '/'");
    }
    if route == "/" {
        return reject("must not be the root path");
    }
    if route.ends_with('/') {
        return reject("must not end with '/'");
    }
    if route.contains("//") || route.contains(['{', '}', '*']) {
        return reject("must be a plain path");
    }
    if route == BOOKS_ROUTE || route.starts_with(&format!("{}/", BOOKS_ROUTE)) {
        return reject("overlaps the book routes");
    }

    Ok(())
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        validate_uploads_route(&config.server.uploads_route)?;

        Ok(config)
    }

    /// Apply command line / environment overrides.
    pub fn apply_overrides(&mut self, args: &Overrides) {
        if let Some(bind) = args.bind {
            self.server.bind = bind;
        }
        if let Some(ref path) = args.database {
            self.database.path = path.clone();
        }
        if let Some(ref dir) = args.uploads {
            self.uploads.dir = dir.clone();
        }
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookshelf.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookshelf-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookshelf-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookshelf-rs configuration

[server]
bind = "0.0.0.0:8800"
# Largest accepted upload in bytes
max_upload_bytes = 10485760
# URL prefix covers are served under
uploads_route = "/uploads"

[database]
# path = "/var/lib/bookshelf-rs/books.db"

[uploads]
# dir = "/var/lib/bookshelf-rs/uploads"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_text_parses() {
        let config = Config::parse(&Config::generate_default()).unwrap();
        assert_eq!(config.server.bind.port(), 8800);
        assert_eq!(config.server.uploads_route, "/uploads");
        assert_eq!(config.uploads.dir, PathBuf::from("uploads"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.database.path, PathBuf::from("data/books.db"));
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn relative_uploads_route_is_rejected() {
        let err = Config::parse("[server]\nuploads_route = \"covers\"\n").unwrap_err();
        assert!(err.to_string().contains("uploads_route"));
    }

    fn uploads_route_error(route: &str) -> String {
        let text = format!("[server]\nuploads_route = \"{}\"\n", route);
        Config::parse(&text).unwrap_err().to_string()
    }

    #[test]
    fn root_uploads_route_is_rejected() {
        assert!(uploads_route_error("/").contains("root"));
    }

    #[test]
    fn trailing_slash_uploads_route_is_rejected() {
        assert!(uploads_route_error("/uploads/").contains("end with"));
    }

    #[test]
    fn uploads_route_overlapping_books_is_rejected() {
        assert!(uploads_route_error("/books").contains("overlaps"));
        assert!(uploads_route_error("/books/covers").contains("overlaps"));
    }

    #[test]
    fn uploads_route_with_pattern_syntax_is_rejected() {
        assert!(uploads_route_error("/up/{id}").contains("plain path"));
        assert!(uploads_route_error("/a//b").contains("plain path"));
    }

    #[test]
    fn nested_uploads_route_is_accepted() {
        let config = Config::parse("[server]\nuploads_route = \"/static/covers\"\n").unwrap();
        assert_eq!(config.server.uploads_route, "/static/covers");
        assert!(Config::parse("[server]\nuploads_route = \"/bookshelf\"\n").is_ok());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(&Overrides {
            bind: Some("127.0.0.1:9000".parse().unwrap()),
            database: None,
            uploads: Some(PathBuf::from("/srv/covers")),
        });

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.database.path, PathBuf::from("data/books.db"));
        assert_eq!(config.uploads.dir, PathBuf::from("/srv/covers"));
    }

    #[test]
    fn cli_accepts_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bookshelf-rs",
            "serve",
            "--bind",
            "127.0.0.1:9100",
            "--uploads",
            "/tmp/covers",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Command::Serve)));
        assert_eq!(cli.overrides.bind.map(|b| b.port()), Some(9100));
        assert_eq!(cli.overrides.uploads, Some(PathBuf::from("/tmp/covers")));
    }
}
