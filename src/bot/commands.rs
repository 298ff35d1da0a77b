use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra los comandos en la guild configurada
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        link_command("add", "Add a YouTube or SoundCloud URL to the queue"),
        link_command("play", "Play a YouTube or SoundCloud URL"),
        jukebox_command(),
        createjb_command(),
        playlist_command(),
        skip_command(),
        nextup_command(),
        CreateCommand::new("loop").description("Toggle loop mode"),
        CreateCommand::new("shuffle").description("Toggle shuffle mode"),
        CreateCommand::new("pause").description("Pause the currently playing audio"),
        CreateCommand::new("resume").description("Resume paused audio"),
        CreateCommand::new("stop").description("Stop playback and leave the voice channel"),
    ]
}

fn link_command(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description).add_option(
        CreateCommandOption::new(CommandOptionType::String, "link", "The video or audio link")
            .required(true),
    )
}

fn jukebox_command() -> CreateCommand {
    CreateCommand::new("jukebox")
        .description("Play a local jukebox file")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "file", "The name of the file")
                .required(true)
                .set_autocomplete(true),
        )
}

fn createjb_command() -> CreateCommand {
    CreateCommand::new("createjb")
        .description("Add a jukebox entry")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "link", "The video or audio link")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "filename",
                "The filename to save as (with .opus extension)",
            )
            .required(true),
        )
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Play a local playlist folder")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "The playlist folder name")
                .required(true)
                .set_autocomplete(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Skip one or more tracks")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "n_skips",
            "Number of tracks to skip (0 to skip all)",
        ))
}

fn nextup_command() -> CreateCommand {
    CreateCommand::new("nextup")
        .description("Show upcoming tracks in the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page to show")
                .min_int_value(1),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_full_command_set() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|c| serde_json::to_value(c).unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "add", "play", "jukebox", "createjb", "playlist", "skip", "nextup", "loop",
                "shuffle", "pause", "resume", "stop"
            ]
        );
    }
}
