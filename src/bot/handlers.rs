use anyhow::Result;
use serenity::{
    builder::{
        CreateAutocompleteResponse, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    audio::queue::SkipOutcome,
    bot::Jukebot,
    error::EnqueueError,
    sources::{library::Choice, SourceRequest},
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &Jukebot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a guild"))?;

    info!(
        "📝 /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "add" => handle_enqueue(ctx, &command, bot, link_request(&command), false).await?,
        "play" => handle_enqueue(ctx, &command, bot, link_request(&command), true).await?,
        "jukebox" => {
            let file = string_option(&command, "file").unwrap_or_default();
            handle_enqueue(ctx, &command, bot, SourceRequest::Jukebox(file), false).await?
        }
        "playlist" => {
            let name = string_option(&command, "name").unwrap_or_default();
            handle_enqueue(ctx, &command, bot, SourceRequest::Playlist(name), false).await?
        }
        "createjb" => handle_createjb(ctx, &command, bot).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "nextup" => handle_nextup(ctx, &command, bot, guild_id).await?,
        "loop" => {
            let content = match bot.player.toggle_loop(guild_id.get()).await {
                Some(on) => format!("Looping is now {}.", if on { "on" } else { "off" }),
                None => "No active queue.".to_string(),
            };
            respond(ctx, &command, content).await?
        }
        "shuffle" => {
            let content = match bot.player.toggle_shuffle(guild_id.get()).await {
                Some(on) => format!("Shuffle is now {}.", if on { "enabled" } else { "disabled" }),
                None => "No active queue.".to_string(),
            };
            respond(ctx, &command, content).await?
        }
        "pause" => {
            let content = if bot.player.pause(guild_id.get()).await {
                "Playback paused"
            } else {
                "Nothing is playing."
            };
            respond(ctx, &command, content).await?
        }
        "resume" => {
            let content = if bot.player.resume(guild_id.get()).await {
                "Resuming"
            } else {
                "Nothing is paused."
            };
            respond(ctx, &command, content).await?
        }
        "stop" => {
            let connected = bot.voice().is_connected(guild_id.get()).await;
            bot.player.stop(guild_id.get()).await;
            let content = if connected { "Disconnected" } else { "Not connected." };
            respond(ctx, &command, content).await?
        }
        _ => respond(ctx, &command, "❌ Unknown command").await?,
    }

    Ok(())
}

/// Maneja el autocompletado de jukebox y playlists
pub async fn handle_autocomplete(
    ctx: &Context,
    command: CommandInteraction,
    bot: &Jukebot,
) -> Result<()> {
    let query = command
        .data
        .autocomplete()
        .map(|option| option.value.to_string())
        .unwrap_or_default();

    let choices: Vec<Choice> = match command.data.name.as_str() {
        "jukebox" => bot.library().autocomplete_jukebox(&query),
        "playlist" => bot.library().autocomplete_playlists(&query),
        _ => Vec::new(),
    };

    let response = choices
        .into_iter()
        .fold(CreateAutocompleteResponse::new(), |response, choice| {
            response.add_string_choice(choice.name, choice.value)
        });

    command
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;
    Ok(())
}

async fn handle_enqueue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Jukebot,
    request: SourceRequest,
    play_immediately: bool,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a guild"))?;
    let session = guild_id.get();

    if !ensure_joined(ctx, command, bot, guild_id).await? {
        return respond(ctx, command, "Not connected to a voice channel").await;
    }

    // Defer la respuesta: la descarga puede superar los 3 segundos
    command.defer_ephemeral(&ctx.http).await?;

    let embed = match bot
        .player
        .enqueue(session, &command.user.name, &request, play_immediately)
        .await
    {
        Ok(info) => embeds::create_enqueue_embed(&info),
        Err(e) => embeds::create_error_embed(&user_message(&e)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_createjb(ctx: &Context, command: &CommandInteraction, bot: &Jukebot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a guild"))?;
    let link = string_option(command, "link").unwrap_or_default();
    let filename = string_option(command, "filename").unwrap_or_default();

    if !ensure_joined(ctx, command, bot, guild_id).await? {
        return respond(ctx, command, "Not connected to a voice channel").await;
    }

    command.defer_ephemeral(&ctx.http).await?;

    let response = match bot
        .player
        .create_jukebox_entry(guild_id.get(), &command.user.name, &link, &filename)
        .await
    {
        Ok(info) => {
            bot.rescan_library();
            EditInteractionResponse::new()
                .content(format!("Downloaded and added `{}` to the jukebox!", info.title))
                .embed(embeds::create_enqueue_embed(&info))
        }
        Err(e) => EditInteractionResponse::new().embed(embeds::create_error_embed(&user_message(&e))),
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

/// Conecta al canal de voz del usuario si no hay una llamada activa.
/// `false` si el usuario tampoco está en un canal de voz.
async fn ensure_joined(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Jukebot,
    guild_id: GuildId,
) -> Result<bool> {
    let session = guild_id.get();
    if bot.voice().is_connected(session).await {
        return Ok(true);
    }
    let Some(channel) = caller_channel(ctx, command, guild_id) else {
        return Ok(false);
    };
    bot.voice().join(session, channel).await?;
    Ok(true)
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Jukebot,
    guild_id: GuildId,
) -> Result<()> {
    let n = integer_option(command, "n_skips").unwrap_or(1);
    let content = match bot.player.skip(guild_id.get(), n).await {
        Some(SkipOutcome::Cleared(count)) => format!("Skipped all {} tracks.", count),
        Some(SkipOutcome::Skipped(count)) => format!("Skipped {} track(s)", count),
        None => "No active playback".to_string(),
    };
    respond(ctx, command, content).await
}

async fn handle_nextup(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &Jukebot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(snapshot) = bot.player.upcoming(guild_id.get()).await else {
        return respond(ctx, command, "No queue active.").await;
    };

    let page = integer_option(command, "page")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1)
        .saturating_sub(1);
    let page = snapshot.page(page, embeds::QUEUE_PAGE_SIZE);

    respond_embed(ctx, command, embeds::create_queue_embed(&page)).await
}

// Funciones auxiliares

fn user_message(error: &EnqueueError) -> String {
    match error {
        EnqueueError::UnsupportedSource(_) => "Invalid URL or unsupported service.".to_string(),
        EnqueueError::EmptyPlaylist(_) => "Playlist is empty.".to_string(),
        EnqueueError::Fetch(e) => e.to_string(),
    }
}

fn caller_channel(ctx: &Context, command: &CommandInteraction, guild_id: GuildId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&command.user.id)
        .and_then(|state| state.channel_id)
}

fn link_request(command: &CommandInteraction) -> SourceRequest {
    SourceRequest::Link(string_option(command, "link").unwrap_or_default())
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str())
        .map(str::to_string)
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_i64())
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
