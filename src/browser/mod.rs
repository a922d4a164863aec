//! Launching or attaching to the Chrome instance that shows the notebook.

pub mod config;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use session::BrowserSession;
