#![forbid(unsafe_code)]

//! NewTube relay: resolves the renditions of a YouTube URL and relays the one
//! the caller picked as a file attachment.
//!
//! The binary in `src/bin/relay_backend.rs` only wires configuration, logging
//! and the `yt-dlp` provider into [`server::router`]; everything else lives
//! here so it can be exercised without a network.

pub mod config;
pub mod error;
pub mod formats;
pub mod logging;
pub mod media;
pub mod provider;
pub mod relay;
pub mod server;
pub mod staging;
pub mod validate;
