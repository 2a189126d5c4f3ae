//! # locator-forge
//!
//! Ranked CSS/XPath locators for every interactive element on a page.
//! Scan a live page through a stealth Chrome session, or a snapshot saved
//! earlier.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use locator_forge::{Capture, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> locator_forge::Result<()> {
//! let config = Config::load("configs/example.yaml")?;
//! let capture = Capture::launch(&config.browser).await?;
//! let doc = capture.document("https://example.com").await?;
//! capture.close().await?;
//!
//! let result = locator_core::scan(&doc, &config.scan_options())?;
//! println!("{} elements", result.stats.total_elements);
//! # Ok(())
//! # }
//! ```

mod capture;
mod config;
pub mod report;

pub use capture::Capture;
pub use config::{BrowserConfig, Config, OutputConfig, OutputFormat, ScanConfig, Viewport};

/// Result type for locator-forge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from loading config, driving the browser, or scanning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error(transparent)]
    Core(#[from] locator_core::Error),
}
