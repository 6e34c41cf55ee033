//! Common utilities and shared types for livepoll.
//!
//! This crate provides foundational components used across all livepoll crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based internal identifiers and human-typable
//!   session codes via [`IdGenerator`] and [`SessionCode`]
//!
//! # Example
//!
//! ```no_run
//! use livepoll_common::{AppResult, Config, IdGenerator, SessionCode};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let code = id_gen.generate_session_code();
//!     let parsed = SessionCode::parse(&code.as_str().to_lowercase())?;
//!     assert_eq!(code, parsed);
//!     println!("Listening on port {}", config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, SESSION_CODE_LEN, SessionCode};
