//! # BroadcastSequencer — 再生シーケンサー
//!
//! 生成サイクル（記事取得 → キュレーション → ナレーション合成 →
//! アセットプリロード）とフェーズプロトコル（overview → detail →
//! logo → stopped）を司る中枢。ライフサイクル状態は本モジュールの
//! 制御フローだけが書き換え、表示層はスナップショットとイベント
//! 購読で読む。

use crate::audio_router::{AudioClip, AudioRouter};
use crate::capture::{CaptureRecorder, OutputSlot};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use reel_core::contracts::{BroadcastPayload, NewsItem, REQUIRED_STORIES};
use reel_core::error::ReelError;
use reel_core::traits::{ArticleSource, Curator, Narrator};
use shared::config::ReelConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tuning::PacingProfile;
use uuid::Uuid;

/// ライフサイクルステージ
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Generating,
    Preloading,
    Ready,
    Playing,
    Finished,
    Error,
}

/// 再生フェーズ。後退遷移は存在しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stopped,
    Overview,
    Detail,
    Logo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// ログペイン用のタイムスタンプ付きイベント行
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// 表示層へ流すステージイベント
#[derive(Debug, Clone)]
pub enum StageEvent {
    Status(Status),
    Phase(Phase),
    ActiveIndex(usize),
    Log(LogEntry),
}

/// 表示層が読むスナップショット
#[derive(Debug, Clone)]
pub struct PresentationState {
    pub status: Status,
    pub phase: Phase,
    pub active_index: usize,
    pub log: Vec<LogEntry>,
    pub last_error: Option<String>,
}

impl PresentationState {
    fn new() -> Self {
        Self {
            status: Status::Idle,
            phase: Phase::Stopped,
            active_index: 0,
            log: Vec::new(),
            last_error: None,
        }
    }
}

/// 1生成サイクル分のステージ済みコンテンツ。再生で消費され、
/// 次のサイクルで丸ごと置き換わる（差分無効化はしない）。
struct StagedShow {
    news: Vec<NewsItem>,
    hashtags_en: String,
    hashtags_bn: String,
    intro_clip: Option<AudioClip>,
    narration_clips: Vec<Option<AudioClip>>,
    music_clip: Option<AudioClip>,
    assets: HashMap<String, Option<Bytes>>,
}

/// 設定のうちシーケンサーが直接使う部分
#[derive(Debug, Clone)]
pub struct ShowSettings {
    pub intro_text: String,
    pub bgm_urls: Vec<String>,
    pub logo_url: String,
    pub background_url: String,
    pub overlay_url: String,
    pub preload_timeout: Duration,
}

impl ShowSettings {
    pub fn from_config(config: &ReelConfig) -> Self {
        Self {
            intro_text: config.intro_text.clone(),
            bgm_urls: config.bgm_choices(),
            logo_url: config.logo_url.clone(),
            background_url: config.background_url.clone(),
            overlay_url: config.overlay_url.clone(),
            preload_timeout: Duration::from_secs(config.preload_timeout_secs),
        }
    }

    #[cfg(test)]
    pub fn bare() -> Self {
        Self {
            intro_text: "intro".to_string(),
            bgm_urls: Vec::new(),
            logo_url: String::new(),
            background_url: String::new(),
            overlay_url: String::new(),
            preload_timeout: Duration::from_secs(20),
        }
    }
}

pub struct BroadcastSequencer {
    wire: Arc<dyn ArticleSource>,
    desk: Arc<dyn Curator>,
    voice: Arc<dyn Narrator>,
    router: AudioRouter,
    pacing: PacingProfile,
    settings: ShowSettings,
    state: Mutex<PresentationState>,
    staged: Mutex<Option<StagedShow>>,
    events: broadcast::Sender<StageEvent>,
    output: OutputSlot<BroadcastPayload>,
}

impl BroadcastSequencer {
    pub fn new(
        wire: Arc<dyn ArticleSource>,
        desk: Arc<dyn Curator>,
        voice: Arc<dyn Narrator>,
        router: AudioRouter,
        pacing: PacingProfile,
        settings: ShowSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            wire,
            desk,
            voice,
            router,
            pacing,
            settings,
            state: Mutex::new(PresentationState::new()),
            staged: Mutex::new(None),
            events,
            output: OutputSlot::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    pub fn state_snapshot(&self) -> PresentationState {
        self.lock_state().clone()
    }

    /// 終端フェーズ後に掲示された完了オブジェクトを消費する（高々一度）
    pub fn take_broadcast(&self) -> Option<BroadcastPayload> {
        self.output.take()
    }

    fn lock_state(&self) -> MutexGuard<'_, PresentationState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_staged(&self) -> MutexGuard<'_, Option<StagedShow>> {
        match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_status(&self, status: Status) {
        self.lock_state().status = status;
        let _ = self.events.send(StageEvent::Status(status));
    }

    fn set_phase(&self, phase: Phase) {
        self.lock_state().phase = phase;
        let _ = self.events.send(StageEvent::Phase(phase));
    }

    fn set_active_index(&self, index: usize) {
        self.lock_state().active_index = index;
        let _ = self.events.send(StageEvent::ActiveIndex(index));
    }

    fn push_log(&self, level: LogLevel, message: String) {
        let entry = LogEntry { at: Utc::now(), level, message };
        self.lock_state().log.push(entry.clone());
        let _ = self.events.send(StageEvent::Log(entry));
    }

    fn log_info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push_log(LogLevel::Info, message);
    }

    fn log_warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push_log(LogLevel::Warn, message);
    }

    fn fail_cycle(&self, err: &ReelError) {
        let message = err.to_string();
        error!("❌ {}", message);
        self.push_log(LogLevel::Error, message.clone());
        {
            let mut state = self.lock_state();
            state.status = Status::Error;
            state.last_error = Some(message);
        }
        // 失敗したサイクルの古いコンテンツは見せない。表示は空の
        // プレースホルダに戻る。
        *self.lock_staged() = None;
        let _ = self.events.send(StageEvent::Status(Status::Error));
    }

    #[cfg(test)]
    pub fn has_staged_content(&self) -> bool {
        self.lock_staged().is_some()
    }

    /// 生成サイクルを1回実行する。generating/preloading/playing 中の
    /// 再入はステート不変の no-op（ネットワーク呼び出しも発生しない）。
    pub async fn generate(&self) -> Result<(), ReelError> {
        {
            let mut state = self.lock_state();
            if matches!(
                state.status,
                Status::Generating | Status::Preloading | Status::Playing
            ) {
                info!("⏭️ 生成サイクルは実行中のためスキップ");
                return Ok(());
            }
            state.status = Status::Generating;
            state.last_error = None;
        }
        let _ = self.events.send(StageEvent::Status(Status::Generating));
        self.log_info("📰 生成サイクル開始");

        match self.run_generation().await {
            Ok(()) => {
                self.set_status(Status::Ready);
                self.log_info("✅ コンテンツとアセットのステージング完了");
                Ok(())
            }
            Err(e) => {
                self.fail_cycle(&e);
                Err(e)
            }
        }
    }

    async fn run_generation(&self) -> Result<(), ReelError> {
        // 記事取得とキュレーションの失敗はサイクル致命 (fatal-to-cycle)
        let (articles, stats) = self.wire.fetch_articles().await?;
        self.log_info(format!(
            "📰 記事取得: {} 件 (画像付き {} 件)",
            stats.total_fetched, stats.with_images
        ));

        let batch = self.desk.curate(&articles).await?;
        if batch.stories.len() != REQUIRED_STORIES {
            return Err(ReelError::CurationFailed {
                reason: format!(
                    "ストーリー数が {} 件 (必要数 {})",
                    batch.stories.len(),
                    REQUIRED_STORIES
                ),
            });
        }
        self.log_info(format!("✅ キュレーション完了: {} 件", batch.stories.len()));

        // ナレーションは逐次合成する。台本の順序がログと進捗表示を決める
        // ため、並行化しない。個別失敗は音声なしに縮退してサイクル続行。
        let intro_audio = self.narrate_step("導入", &self.settings.intro_text).await;

        let mut news = Vec::with_capacity(batch.stories.len());
        for (i, story) in batch.stories.iter().enumerate() {
            self.log_info(format!(
                "🗣️ ナレーション生成中 {}/{}",
                i + 1,
                batch.stories.len()
            ));
            let script = format!("{}. {}", story.headline, story.description);
            let narration = self.narrate_step(&story.headline, &script).await;
            news.push(NewsItem {
                id: Uuid::new_v4().to_string(),
                headline: story.headline.clone(),
                description: story.description.clone(),
                image_url: story.image_url.clone(),
                narration,
            });
        }

        // プリロード: 全リクエスト並行、個別タイムアウト、全件決着バリア
        self.set_status(Status::Preloading);
        self.log_info("🔄 アセットプリロード開始");
        let assets = self.preload_assets(&news).await;
        let resolved = assets.values().filter(|v| v.is_some()).count();
        self.log_info(format!("✅ プリロード決着: {}/{} 件", resolved, assets.len()));

        let music_clip = assets
            .get("bgm")
            .and_then(|bytes| bytes.as_ref())
            .and_then(|bytes| self.decode_clip("BGM", bytes));
        let intro_clip = intro_audio.as_deref().and_then(|b| self.decode_clip("導入", b));
        let narration_clips = news
            .iter()
            .map(|item| {
                item.narration
                    .as_deref()
                    .and_then(|b| self.decode_clip(&item.headline, b))
            })
            .collect();

        *self.lock_staged() = Some(StagedShow {
            hashtags_en: batch.hashtags_en,
            hashtags_bn: batch.hashtags_bn,
            news,
            intro_clip,
            narration_clips,
            music_clip,
            assets,
        });
        Ok(())
    }

    async fn narrate_step(&self, label: &str, script: &str) -> Option<Vec<u8>> {
        match self.voice.narrate(script).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                self.log_warn(format!("⚠️ ナレーション合成失敗 ({}): {} — 音声なしで続行", label, e));
                None
            }
        }
    }

    async fn preload_assets(&self, news: &[NewsItem]) -> HashMap<String, Option<Bytes>> {
        let mut requests: Vec<(String, String)> = news
            .iter()
            .enumerate()
            .map(|(i, item)| (format!("story-{}", i), item.image_url.clone()))
            .collect();
        for (key, url) in [
            ("logo", &self.settings.logo_url),
            ("background", &self.settings.background_url),
            ("overlay", &self.settings.overlay_url),
        ] {
            if !url.is_empty() {
                requests.push((key.to_string(), url.clone()));
            }
        }
        if let Some(bgm) = self.settings.bgm_urls.choose(&mut rand::thread_rng()) {
            requests.push(("bgm".to_string(), bgm.clone()));
        }

        let preloader = infrastructure::preloader::AssetPreloader::new(self.settings.preload_timeout);
        preloader.preload(requests).await
    }

    fn decode_clip(&self, label: &str, bytes: &[u8]) -> Option<AudioClip> {
        match AudioClip::decode(bytes) {
            Ok(clip) => Some(clip),
            Err(e) => {
                self.log_warn(format!("⚠️ 音声デコード失敗 ({}): {}", label, e));
                None
            }
        }
    }

    /// フェーズプロトコルを1パス実行する。`ready` 以外からの起動と
    /// 再生中の再入は no-op。
    pub async fn play(&self) -> Result<(), ReelError> {
        {
            let mut state = self.lock_state();
            if state.status != Status::Ready {
                info!("⏭️ 再生不可 (status={:?})", state.status);
                return Ok(());
            }
            state.status = Status::Playing;
            state.active_index = 0;
        }
        let _ = self.events.send(StageEvent::Status(Status::Playing));
        let _ = self.events.send(StageEvent::ActiveIndex(0));

        let show = match self.lock_staged().take() {
            Some(show) => show,
            None => {
                let e = ReelError::Infrastructure {
                    reason: "ステージ済みコンテンツがない".to_string(),
                };
                self.fail_cycle(&e);
                return Err(e);
            }
        };

        if !self.router.is_driven() {
            self.log_warn("🔇 音声出力なし — ミュートのまま尺を保って再生");
        }
        let recording = CaptureRecorder::start(&self.router);

        self.run_show(&show).await;

        let audio_wav_base64 = if recording { CaptureRecorder::stop(&self.router) } else { None };
        let narration_durations_secs = show
            .narration_clips
            .iter()
            .map(|clip| clip.as_ref().map(|c| c.duration().as_secs_f32()).unwrap_or(0.0))
            .collect();
        let published = self.output.publish(BroadcastPayload {
            news: show.news,
            hashtags_en: show.hashtags_en,
            hashtags_bn: show.hashtags_bn,
            narration_durations_secs,
            audio_wav_base64,
        });
        if !published {
            self.log_warn("⚠️ 前回の完了オブジェクトが未回収のため掲示をスキップ");
        }

        self.set_status(Status::Finished);
        self.log_info("🎉 再生完了");
        Ok(())
    }

    async fn run_show(&self, show: &StagedShow) {
        // BGM は先頭からループ再生、ゲインは 0 から定常値へランプ
        if let Some(music) = &show.music_clip {
            self.router.start_music(music);
            self.router
                .ramp_music_gain(self.pacing.bgm_gain, self.pacing.bgm_ramp_in_secs);
        }

        self.set_phase(Phase::Overview);
        tokio::time::sleep(self.pacing.settle()).await;
        self.play_clip_or_wait(show.intro_clip.as_ref(), self.pacing.overview_fallback())
            .await;

        self.set_phase(Phase::Detail);
        for (i, item) in show.news.iter().enumerate() {
            self.set_active_index(i);
            self.log_info(format!("📺 アイテム {}/{}: {}", i + 1, show.news.len(), item.headline));
            let image_ready = show
                .assets
                .get(&format!("story-{}", i))
                .map(|asset| asset.is_some())
                .unwrap_or(false);
            if !image_ready {
                self.log_warn(format!("⚠️ アイテム {} の画像が未解決 — プレースホルダで表示", i + 1));
            }
            tokio::time::sleep(self.pacing.settle()).await;
            self.play_clip_or_wait(
                show.narration_clips.get(i).and_then(|c| c.as_ref()),
                self.pacing.detail_fallback(),
            )
            .await;
        }

        self.set_phase(Phase::Logo);
        self.router.ramp_music_gain(0.0, self.pacing.bgm_ramp_out_secs);
        tokio::time::sleep(self.pacing.logo_hold()).await;

        self.router.pause_music();
        self.set_phase(Phase::Stopped);
    }

    /// クリップを再生して終了シグナルを待つ。シグナルが来ない環境や
    /// クリップ欠損時もフォールバック尺で必ず進行する（視覚ペーシングを
    /// 壊れた音声リソースで停止させない契約）。
    async fn play_clip_or_wait(&self, clip: Option<&AudioClip>, fallback: Duration) {
        match clip {
            Some(clip) if self.router.is_driven() => {
                let done = self.router.play_narration(clip);
                let grace = clip.duration() + self.pacing.clip_grace();
                if tokio::time::timeout(grace, done).await.is_err() {
                    self.log_warn("⚠️ 終了シグナル待ちがタイムアウト — 次のステップへ");
                }
            }
            Some(clip) => {
                // 誰もグラフを引いていないので、尺だけ寝て進める
                tokio::time::sleep(clip.duration()).await;
            }
            None => {
                tokio::time::sleep(fallback).await;
            }
        }
    }

    /// finished / error からの手動リセット。ステージ済みコンテンツと
    /// アセットを破棄して idle へ戻す。
    pub fn reset(&self) {
        {
            let mut state = self.lock_state();
            if !matches!(state.status, Status::Finished | Status::Error) {
                info!("⏭️ リセット不可 (status={:?})", state.status);
                return;
            }
            state.status = Status::Idle;
            state.phase = Phase::Stopped;
            state.active_index = 0;
            state.last_error = None;
        }
        *self.lock_staged() = None;
        let _ = self.output.take();
        let _ = self.events.send(StageEvent::Status(Status::Idle));
        self.log_info("🔄 リセット完了");
    }
}
