//! Starter files for a fresh base directory.
//!
//! `cake init` writes a commented `config.yaml` and `settings.toml` from
//! embedded templates and creates the run and instance roots.
//!
//! # Example
//!
//! ```no_run
//! use cake_core::init::{generate_base_structure, InitOptions};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = InitOptions {
//!     base: PathBuf::from("/srv/cake"),
//!     force: false,
//! };
//!
//! generate_base_structure(options).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{generate_base_structure, InitOptions};
pub use templates::{get_template, list_templates};
