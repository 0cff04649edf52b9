pub mod advisor;
pub mod collaborative;
pub mod content;
pub mod domain;
pub mod error;
pub mod features;
mod linalg;
pub mod profiler;
pub mod snapshot;
pub mod training;

#[cfg(test)]
mod fixtures;

pub use error::{AdvisorError, Result};

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_SNAPSHOT_PATH: &str = "snapshot.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub snapshot_path: Option<String>,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let port = match std::env::var("PORT") {
                Ok(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("PORT must be a port number (got {v:?})"))?,
                Err(_) => DEFAULT_PORT,
            };

            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                snapshot_path: std::env::var("SNAPSHOT_PATH").ok(),
                port,
            })
        }

        pub fn require_snapshot_path(&self) -> anyhow::Result<&str> {
            self.snapshot_path
                .as_deref()
                .context("SNAPSHOT_PATH is required")
        }

        pub fn snapshot_path_or_default(&self) -> &str {
            self.snapshot_path.as_deref().unwrap_or(DEFAULT_SNAPSHOT_PATH)
        }
    }
}
