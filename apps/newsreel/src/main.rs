use infrastructure::narration_actor::NarrationActor;
use infrastructure::news_desk::NewsDesk;
use infrastructure::news_wire::NewsWireClient;
use shared::config::ReelConfig;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

mod audio_router;
mod capture;
mod sequencer;
#[cfg(test)]
mod sequencer_tests;

use audio_router::AudioRouter;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use sequencer::{BroadcastSequencer, ShowSettings};
use tuning::PacingProfile;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// ライブ再生モード (生成して1パス再生する)
    Generate,
    /// 収録モード (ミックス音声をキャプチャし、完了オブジェクトを保存する)
    Record,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let capture_mode = matches!(args.command, Some(Commands::Record));

    // 1. 設定を読み込む
    let config = ReelConfig::load().unwrap_or_else(|e| {
        warn!("⚠️ 設定の読み込みに失敗 ({e}), デフォルト値で続行");
        ReelConfig::default()
    });
    info!("⚙️  Config loaded:");
    info!("   Wire:     {} ({}/{})", config.wire_base_url, config.country, config.language);
    info!("   Curation: {}", config.curation_model);
    info!("   TTS:      {} (voice: {})", config.tts_model, config.tts_voice);
    info!("   Mode:     {}", if capture_mode { "record" } else { "live" });

    // 2. ペーシングプロファイル (pacing.toml があれば上書き)
    let pacing_path = std::env::current_dir()?.join("pacing.toml");
    let pacing = PacingProfile::load_from_file(&pacing_path).unwrap_or_else(|_| {
        info!("🎚️  pacing.toml not found, using default profile");
        PacingProfile::default()
    });
    info!("🎚️  Pacing profile: {}", pacing.name);

    // 3. オーディオグラフ (セッションにつき一度だけ構築)
    let router = AudioRouter::initialize(capture_mode);

    // 4. コラボレータの配線
    let wire = Arc::new(NewsWireClient::new(&config));
    let desk = Arc::new(NewsDesk::new(&config.gemini_api_key, &config.curation_model));
    let voice = Arc::new(NarrationActor::new(
        config.gemini_keys(),
        &config.tts_model,
        &config.tts_voice,
        &config.tts_base_url,
    ));

    let settings = ShowSettings::from_config(&config);
    let sequencer = Arc::new(BroadcastSequencer::new(wire, desk, voice, router, pacing, settings));

    info!("🚀 Newsreel starting up");

    let run = run_broadcast(Arc::clone(&sequencer), capture_mode, &config.output_dir);
    tokio::select! {
        result = run => result?,
        _ = signal::ctrl_c() => {
            info!("🛑 Interrupted, shutting down");
        }
    }

    Ok(())
}

async fn run_broadcast(
    sequencer: Arc<BroadcastSequencer>,
    capture_mode: bool,
    output_dir: &str,
) -> Result<(), anyhow::Error> {
    sequencer.generate().await?;
    sequencer.play().await?;

    let Some(payload) = sequencer.take_broadcast() else {
        warn!("⚠️ 完了オブジェクトが掲示されていない");
        return Ok(());
    };

    info!(
        "📋 放送完了: {} 件, 合計ナレーション {:.1} 秒",
        payload.news.len(),
        payload.narration_durations_secs.iter().sum::<f32>()
    );

    if capture_mode {
        persist_broadcast(&payload, Path::new(output_dir))?;
    }
    Ok(())
}

/// 収録モードの成果物を出力先ディレクトリへ保存する。
/// broadcast.json はメタデータ、narration.wav はキャプチャしたミックス音声。
fn persist_broadcast(
    payload: &reel_core::contracts::BroadcastPayload,
    output_dir: &Path,
) -> Result<(), anyhow::Error> {
    std::fs::create_dir_all(output_dir)?;

    let json_path = output_dir.join("broadcast.json");
    std::fs::write(&json_path, serde_json::to_vec_pretty(payload)?)?;
    info!("💾 Broadcast metadata: {}", json_path.display());

    match &payload.audio_wav_base64 {
        Some(encoded) => {
            let wav_path = output_dir.join("narration.wav");
            std::fs::write(&wav_path, BASE64.decode(encoded.as_bytes())?)?;
            info!("💾 Captured mix: {}", wav_path.display());
        }
        None => warn!("⚠️ キャプチャ音声なし (出力デバイス・ポンプ未稼働の可能性)"),
    }
    Ok(())
}
