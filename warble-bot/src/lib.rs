//! # warble-bot — gateway chat bot runner
//!
//! Wires the `warble-core` session engine to real collaborators: a
//! WebSocket transport, an HTTPS REST client, a TOML configuration
//! file, and the built-in command set.
//!
//! ## Modes
//!
//! - **Run**: connect and serve commands (default).
//! - **Gen-config**: print the default configuration TOML and exit.

pub mod commands;
pub mod config;
pub mod http;
pub mod transport;
