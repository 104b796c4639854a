//! CLI module for the chat application
//! This module handles command-line argument parsing and configuration

pub mod config;
pub mod error;

pub use config::CliConfig;
pub use error::CliError;
