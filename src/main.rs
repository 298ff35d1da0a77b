use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use jukebot::{
    audio::{engine::TransitionEngine, player::AudioPlayer, session::SessionRegistry, voice::VoiceSink},
    bot::Jukebot,
    cache::{self, CacheSettings, MediaCache},
    config::Config,
    sources::{MediaFetcher, SourceResolver, YtDlpFetcher},
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando jukebot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let cache = MediaCache::open(
        config.index_file.clone(),
        config.cache_dir.clone(),
        CacheSettings {
            max_cached_tracks: config.max_cached_tracks,
            max_track_duration: config.max_track_duration,
        },
    )
    .await;

    let removed = cache.sweep_orphans().await;
    if removed > 0 {
        info!("🧹 {} archivos huérfanos eliminados al iniciar", removed);
    }
    let maintenance = cache::spawn_maintenance(
        cache.clone(),
        config.maintenance_period(),
        shutdown.clone(),
    );

    let fetcher = YtDlpFetcher::new(config.ytdlp_path.clone(), config.max_track_duration);
    match fetcher.verify().await {
        Ok(version) => info!("✅ yt-dlp {}", version),
        Err(e) => warn!("⚠️ yt-dlp no disponible, los enlaces no se podrán descargar: {}", e),
    }
    let fetcher: Arc<dyn MediaFetcher> = Arc::new(fetcher);

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let voice = Arc::new(VoiceSink::new(songbird.clone(), http, events_tx.clone()));

    let engine = TransitionEngine::new(Arc::new(SessionRegistry::new()), voice.clone(), events_tx);
    let engine_task = engine.clone().spawn(events_rx, shutdown.clone());

    let player = AudioPlayer::new(
        engine,
        cache,
        fetcher,
        SourceResolver::new(config.jukebox_dir.clone(), config.playlists_dir.clone()),
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = Jukebot::new(config.clone(), player, voice);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("No se pudo escuchar ctrl-c: {}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal.cancel();
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    let _ = tokio::join!(maintenance, engine_task);
    info!("👋 Bot detenido");
    Ok(())
}
