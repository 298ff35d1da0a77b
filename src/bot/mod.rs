//! # Bot Module
//!
//! Discord surface of jukebot: slash command registration, interaction
//! routing and voice-state housekeeping.
//!
//! [`Jukebot`] implements Serenity's [`EventHandler`]. It owns:
//!
//! - the [`AudioPlayer`] every command goes through,
//! - the [`VoiceSink`] used to join voice channels on demand,
//! - a [`LocalLibrary`] snapshot for jukebox/playlist autocomplete.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use jukebot::{audio::{player::AudioPlayer, voice::VoiceSink}, bot::Jukebot, config::Config};
//! # fn example(config: Config, player: AudioPlayer, voice: Arc<VoiceSink>) {
//! let handler = Jukebot::new(Arc::new(config), player, voice);
//! # }
//! ```

use parking_lot::RwLock;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{player::AudioPlayer, voice::VoiceSink},
    config::Config,
    sources::LocalLibrary,
};

pub struct Jukebot {
    config: Arc<Config>,
    pub player: AudioPlayer,
    voice: Arc<VoiceSink>,
    library: RwLock<LocalLibrary>,
}

impl Jukebot {
    pub fn new(config: Arc<Config>, player: AudioPlayer, voice: Arc<VoiceSink>) -> Self {
        let library = LocalLibrary::scan(&config.jukebox_dir, &config.playlists_dir);
        Self {
            config,
            player,
            voice,
            library: RwLock::new(library),
        }
    }

    pub fn library(&self) -> parking_lot::RwLockReadGuard<'_, LocalLibrary> {
        self.library.read()
    }

    pub fn voice(&self) -> &VoiceSink {
        &self.voice
    }

    fn rescan_library(&self) {
        let library = LocalLibrary::scan(&self.config.jukebox_dir, &self.config.playlists_dir);
        *self.library.write() = library;
    }
}

/// Counts the humans in `channel` and whether we are there too.
fn channel_occupancy(ctx: &Context, guild_id: GuildId, channel: ChannelId) -> Option<(bool, usize)> {
    let me = ctx.cache.current_user().id;
    let guild = ctx.cache.guild(guild_id)?;

    let mut bot_present = false;
    let mut listeners = 0;
    for (user_id, state) in &guild.voice_states {
        if state.channel_id != Some(channel) {
            continue;
        }
        if *user_id == me {
            bot_present = true;
        } else if !state.member.as_ref().is_some_and(|m| m.user.bot) {
            listeners += 1;
        }
    }
    Some((bot_present, listeners))
}

#[async_trait]
impl EventHandler for Jukebot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);

        self.rescan_library();

        let guild_id = GuildId::new(self.config.guild_id);
        match commands::register_guild_commands(&ctx, guild_id).await {
            Ok(()) => info!("✅ Comandos de guild registrados para: {}", guild_id),
            Err(e) => error!("❌ Error registrando comandos de guild: {:?}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Autocomplete(command) => {
                if let Err(e) = handlers::handle_autocomplete(&ctx, command, self).await {
                    error!("Error manejando autocompletado: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Leaves when the last human listener walks out of our channel.
    ///
    /// Our own forced disconnects arrive through the voice driver instead.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        if new.user_id == ctx.cache.current_user().id {
            return;
        }
        let Some(left) = old.and_then(|o| o.channel_id) else {
            return;
        };
        if new.channel_id == Some(left) {
            return;
        }

        match channel_occupancy(&ctx, guild_id, left) {
            Some((true, 0)) => {
                info!("🚪 Canal {} vacío, saliendo de guild {}", left, guild_id);
                self.player.stop(guild_id.get()).await;
            }
            Some((_, listeners)) => debug!("Quedan {} oyentes en {}", listeners, left),
            None => {}
        }
    }
}
