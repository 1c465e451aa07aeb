//! CLI module graph.

pub mod broadcast;
pub mod command;
pub mod config;
pub mod diagnostic;
pub mod output;
pub mod paths;
pub mod run;
pub mod status;
pub mod stop;
