//! vuedraw Application
//!
//! Terminal front-end for the shared whiteboard: configuration, routing,
//! and the command loop that drives the core composables.

mod app;
mod commands;
mod router;

pub use app::{App, AppConfig, AppError, Flow};
pub use commands::{Command, CommandError, HELP};
pub use router::{BASE_URL, Page, ROUTES, Route, Router};
