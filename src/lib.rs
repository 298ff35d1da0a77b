//! # jukebot
//!
//! Discord music bot that plays YouTube/SoundCloud links, local jukebox files
//! and playlist folders per guild, keeping a bounded on-disk cache of
//! downloads.
//!
//! - [`cache`]: index-backed media cache with LRU eviction.
//! - [`audio`]: session queues, the transition engine and the voice sink.
//! - [`sources`]: link parsing, local library and the yt-dlp fetcher.
//! - [`bot`]: serenity event handler and slash commands.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;
