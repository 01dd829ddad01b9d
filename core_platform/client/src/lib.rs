//! Typed client for the Core Platform API together with the state stores a
//! shell keeps between calls: session, theme and the module list.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod modules;
pub mod session;
pub mod theme;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use modules::{ModuleStore, MoveDirection};
pub use session::{FileStorage, MemoryStorage, SessionStore, Storage};
pub use theme::{Theme, ThemeStore};
