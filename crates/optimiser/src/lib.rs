//! Energy optimiser controller process: configuration and HTTP API

pub mod api;
pub mod config;
