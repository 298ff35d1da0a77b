//! # Audio Module
//!
//! Session queues and the playback state machine.
//!
//! - [`queue`]: per-session play order with loop, shuffle and dedup.
//! - [`session`]: the registry that owns every session, one lock each.
//! - [`sink`]: the seam to whatever renders audio, and the events it emits.
//! - [`engine`]: consumes sink events and moves sessions to their next track.
//! - [`player`]: what the command layer calls.
//! - [`voice`]: the songbird-backed sink.
//!
//! ## Flow
//!
//! ```text
//! command ─▶ AudioPlayer::enqueue ─▶ MediaCache ─▶ SessionQueue ─▶ PlaybackSink::start
//!                                                                        │
//!            TransitionEngine ◀──────────── SinkEvent::Finished ◀────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! # use jukebot::audio::player::AudioPlayer;
//! # use jukebot::sources::SourceRequest;
//! # async fn example(player: AudioPlayer) -> anyhow::Result<()> {
//! let guild = 123456789;
//! let link = SourceRequest::Link("https://youtu.be/dQw4w9WgXcQ".into());
//!
//! let info = player.enqueue(guild, "alice", &link, false).await?;
//! println!("{}: {}", info.headline(), info.title);
//!
//! player.toggle_loop(guild).await;
//! player.skip(guild, 1).await;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod player;
pub mod queue;
pub mod session;
pub mod sink;
pub mod voice;
