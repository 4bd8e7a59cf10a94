//! Switchboard gateway binary support: CLI, logging and server startup

pub mod cli;
pub mod logging;
pub mod startup;

pub use cli::{Cli, Commands};
pub use startup::{build_app, build_catalog, serve};
