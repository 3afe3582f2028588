use std::sync::Arc;

use clap::Parser;
use moodplay::cli::Cli;
use moodplay::status::render_status;
use moodplay::{
    CommandFrameSource, DirCatalog, DisplaySink, FrameSource, Lifecycle, LogDisplay,
    PlaybackController, ProcessBackend, RunningFlag, Sampler, SensingLoop, SocketClassifier,
    StatusBoard, TrackSelector, config, shutdown_signal,
};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::from(cli.log_level))
        .init();

    let mut cfg = config::load_or_default(&cli.config).await?;
    cli.apply(&mut cfg);
    debug!(?cfg, "configuration loaded");
    info!(
        songs = %cfg.catalog.root.display(),
        classifier = %cfg.classifier.socket.display(),
        "\u{1F3B5}  moodplay starting"
    );

    let running = RunningFlag::new();
    let frames: Arc<dyn FrameSource> = Arc::new(CommandFrameSource::new(
        cfg.capture.program.clone(),
        cfg.capture.args.clone(),
    ));
    let sampler = Sampler::new(
        frames.clone(),
        Arc::new(SocketClassifier::new(cfg.classifier.socket.clone())),
    )
    .timeout(cfg.classify_timeout());
    let catalog = DirCatalog::new(cfg.catalog.root.clone(), cfg.catalog.extensions.clone());
    let playback = PlaybackController::spawn(
        ProcessBackend::new(cfg.player.program.clone(), cfg.player.args.clone()),
        cfg.queue_capacity,
    );

    let board = Arc::new(StatusBoard::new());
    let renderer = (!cli.quiet).then(|| {
        tokio::spawn(render_status(
            board.subscribe(),
            running.clone(),
            tokio::io::stdout(),
        ))
    });
    let sinks: Vec<Box<dyn DisplaySink>> = vec![Box::new(board.clone()), Box::new(LogDisplay)];

    let sensing = SensingLoop::new(
        sampler,
        TrackSelector::new(Arc::new(catalog)),
        playback.clone(),
        Arc::new(sinks),
        running.clone(),
    )
    .period(cfg.period())
    .no_frame_backoff(cfg.no_frame_backoff())
    .spawn();

    let lifecycle =
        Lifecycle::new(running, playback, frames, sensing).grace(cfg.shutdown_grace());

    if let Err(e) = shutdown_signal().await {
        warn!(?e, "signal handling failed; shutting down");
    }
    lifecycle.shutdown().await?;

    if let Some(renderer) = renderer {
        renderer.await??;
    }
    Ok(())
}
