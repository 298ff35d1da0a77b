use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{player::DisplayInfo, queue::QueuePage};

/// Paleta de colores compartida por todos los embeds
pub mod colors {
    use serenity::all::Colour;

    pub const SPOTIFY_GREEN: Colour = Colour::from_rgb(29, 185, 84);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const BLURPLE: Colour = Colour::from_rgb(88, 101, 242);
}

const STANDARD_FOOTER: &str = "🎵 jukebot";

/// Tracks por página de `/nextup`
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Crea el embed de una canción encolada ("Now Playing", "Already playing" o "Added to queue (n)")
pub fn create_enqueue_embed(info: &DisplayInfo) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(info.headline())
        .description(format!("**{}**", info.title))
        .color(colors::SPOTIFY_GREEN)
        .field("⏱️ Duration", info.duration_label(), true)
        .field("🔗 Source", &info.service, true)
        .field("👤 Queued by", &info.requester, true);

    if info.tracks_added > 1 {
        embed = embed.field(
            "📂 Playlist",
            format!("{} tracks queued", info.tracks_added),
            false,
        );
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_queue_embed(page: &QueuePage) -> CreateEmbed {
    let mut embed = CreateEmbed::default().title("Queue").color(colors::BLURPLE);

    for (position, track) in &page.entries {
        embed = embed.field(page.label(*position), &track.title, false);
    }

    embed.footer(CreateEmbedFooter::new(format!(
        "Page {}/{} · {} tracks · {}",
        page.page + 1,
        page.total_pages,
        page.total_tracks,
        humantime::format_duration(page.total_duration)
    )))
}

pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message)
        .color(colors::ERROR_RED)
}
