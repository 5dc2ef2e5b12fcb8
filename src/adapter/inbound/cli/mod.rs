//! CLI module graph.

pub mod cluster;
pub mod command;
pub mod config;
pub mod notifier;
pub mod operator;
pub mod output;
pub mod paths;
pub mod wiz;
