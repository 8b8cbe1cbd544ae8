//! BroadcastSequencer のフェーズプロトコルとライフサイクルのテスト。
//! コラボレータはすべてモックし、時間は paused クロックで進める。

use crate::audio_router::{AudioRouter, GRAPH_SAMPLE_RATE};
use crate::sequencer::{
    BroadcastSequencer, Phase, ShowSettings, StageEvent, Status,
};
use async_trait::async_trait;
use reel_core::contracts::{CuratedBatch, CuratedStory, FetchStats, RawArticle, REQUIRED_STORIES};
use reel_core::error::ReelError;
use reel_core::traits::{ArticleSource, Curator, Narrator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tuning::PacingProfile;

struct FakeWire {
    calls: AtomicUsize,
    /// この呼び出し番号 (1始まり) 以降は失敗する
    fail_from_call: Option<usize>,
    gate: Option<Arc<Notify>>,
}

impl FakeWire {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), fail_from_call: None, gate: None }
    }

    fn failing() -> Self {
        Self { fail_from_call: Some(1), ..Self::new() }
    }

    fn failing_from(call: usize) -> Self {
        Self { fail_from_call: Some(call), ..Self::new() }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Self::new() }
    }
}

#[async_trait]
impl ArticleSource for FakeWire {
    async fn fetch_articles(&self) -> Result<(Vec<RawArticle>, FetchStats), ReelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_from_call.is_some_and(|n| call >= n) {
            return Err(ReelError::WireFetch { source: anyhow::anyhow!("connection refused") });
        }
        let articles: Vec<RawArticle> = (0..8)
            .map(|i| RawArticle {
                article_id: format!("a{}", i),
                title: format!("Title {}", i),
                description: format!("Description {}", i),
                image_url: String::new(),
            })
            .collect();
        let stats = FetchStats { total_fetched: articles.len(), with_images: articles.len() };
        Ok((articles, stats))
    }
}

struct FakeDesk {
    stories: usize,
}

#[async_trait]
impl Curator for FakeDesk {
    async fn curate(&self, articles: &[RawArticle]) -> Result<CuratedBatch, ReelError> {
        let stories = articles
            .iter()
            .take(self.stories)
            .enumerate()
            .map(|(i, a)| CuratedStory {
                headline: format!("খবর {}", i),
                headline_en: a.title.clone(),
                description: a.description.clone(),
                image_url: a.image_url.clone(),
                category: "Social".to_string(),
            })
            .collect();
        Ok(CuratedBatch {
            stories,
            hashtags_en: "#News".to_string(),
            hashtags_bn: "#খবর".to_string(),
        })
    }
}

struct FakeVoice {
    fail: bool,
}

#[async_trait]
impl Narrator for FakeVoice {
    async fn narrate(&self, _text: &str) -> Result<Vec<u8>, ReelError> {
        if self.fail {
            return Err(ReelError::TtsFailure { reason: "synthesis unavailable".to_string() });
        }
        // グラフレートの 10ms クリップ
        let samples = vec![1000i16; (GRAPH_SAMPLE_RATE / 100) as usize];
        Ok(infrastructure::wav::encode_wav_i16(&samples, GRAPH_SAMPLE_RATE))
    }
}

fn fast_pacing() -> PacingProfile {
    PacingProfile {
        name: "test".to_string(),
        settle_ms: 5,
        overview_fallback_ms: 10,
        detail_fallback_ms: 20,
        logo_hold_ms: 5,
        clip_grace_ms: 10,
        bgm_gain: 0.08,
        bgm_ramp_in_secs: 0.01,
        bgm_ramp_out_secs: 0.01,
    }
}

fn make_sequencer(
    wire: FakeWire,
    desk: FakeDesk,
    voice: FakeVoice,
) -> (Arc<BroadcastSequencer>, broadcast::Receiver<StageEvent>) {
    let (router, _mixer) = AudioRouter::detached(false);
    let sequencer = Arc::new(BroadcastSequencer::new(
        Arc::new(wire),
        Arc::new(desk),
        Arc::new(voice),
        router,
        fast_pacing(),
        ShowSettings::bare(),
    ));
    let events = sequencer.subscribe();
    (sequencer, events)
}

fn drain(events: &mut broadcast::Receiver<StageEvent>) -> Vec<StageEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

fn phases(events: &[StageEvent]) -> Vec<Phase> {
    events
        .iter()
        .filter_map(|e| match e {
            StageEvent::Phase(p) => Some(*p),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[StageEvent]) -> Vec<Status> {
    events
        .iter()
        .filter_map(|e| match e {
            StageEvent::Status(s) => Some(*s),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_run_reaches_finished_without_error() {
    let (sequencer, mut events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    sequencer.generate().await.unwrap();
    sequencer.play().await.unwrap();

    let seen = statuses(&drain(&mut events));
    assert_eq!(
        seen,
        vec![
            Status::Generating,
            Status::Preloading,
            Status::Ready,
            Status::Playing,
            Status::Finished
        ]
    );
    assert!(sequencer.state_snapshot().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_phase_order_is_overview_detail_logo_stopped() {
    let (sequencer, mut events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    sequencer.generate().await.unwrap();
    sequencer.play().await.unwrap();

    let seen = phases(&drain(&mut events));
    assert_eq!(seen, vec![Phase::Overview, Phase::Detail, Phase::Logo, Phase::Stopped]);
}

#[tokio::test(start_paused = true)]
async fn test_detail_visits_each_item_once_in_order() {
    let (sequencer, mut events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    sequencer.generate().await.unwrap();
    sequencer.play().await.unwrap();

    let seen = drain(&mut events);
    let mut indexes = Vec::new();
    let mut last_index_before_logo = None;
    for event in &seen {
        match event {
            StageEvent::ActiveIndex(i) => indexes.push(*i),
            StageEvent::Phase(Phase::Logo) => last_index_before_logo = indexes.last().copied(),
            _ => {}
        }
    }
    // 先頭の 0 は playing 移行時のリセット
    assert_eq!(indexes, vec![0, 0, 1, 2, 3, 4]);
    assert_eq!(last_index_before_logo, Some(REQUIRED_STORIES - 1));
}

#[tokio::test(start_paused = true)]
async fn test_missing_narration_elapses_fallback_without_blocking() {
    let (sequencer, _events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: true });

    sequencer.generate().await.unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Ready);

    let pacing = fast_pacing();
    let expected = std::time::Duration::from_millis(
        pacing.settle_ms * 6
            + pacing.overview_fallback_ms
            + pacing.detail_fallback_ms * 5
            + pacing.logo_hold_ms,
    );

    let started = tokio::time::Instant::now();
    sequencer.play().await.unwrap();
    let elapsed = started.elapsed();

    // paused クロックでは sleep の合計がそのまま経過時間になる
    assert!(elapsed >= expected, "dwell too short: {:?} < {:?}", elapsed, expected);
    assert_eq!(sequencer.state_snapshot().status, Status::Finished);

    let payload = sequencer.take_broadcast().unwrap();
    assert!(payload.narration_durations_secs.iter().all(|d| *d == 0.0));
}

#[tokio::test(start_paused = true)]
async fn test_generate_reentry_is_a_noop() {
    let gate = Arc::new(Notify::new());
    let wire = Arc::new(FakeWire::gated(Arc::clone(&gate)));
    let (router, _mixer) = AudioRouter::detached(false);
    let sequencer = Arc::new(BroadcastSequencer::new(
        Arc::clone(&wire) as Arc<dyn ArticleSource>,
        Arc::new(FakeDesk { stories: REQUIRED_STORIES }),
        Arc::new(FakeVoice { fail: false }),
        router,
        fast_pacing(),
        ShowSettings::bare(),
    ));

    let running = tokio::spawn({
        let sequencer = Arc::clone(&sequencer);
        async move { sequencer.generate().await }
    });
    // 1回目の generate がゲートで停止するまで譲る
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(sequencer.state_snapshot().status, Status::Generating);
    assert_eq!(wire.calls.load(Ordering::SeqCst), 1);

    // 再入: ステート不変、fetch は再実行されない
    sequencer.generate().await.unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Generating);
    assert_eq!(wire.calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    running.await.unwrap().unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Ready);
    // 完走後も fetch は1回のまま
    assert_eq!(wire.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_failure_discards_staged_content() {
    let (sequencer, _events) = make_sequencer(
        FakeWire::failing_from(2),
        FakeDesk { stories: REQUIRED_STORIES },
        FakeVoice { fail: false },
    );

    sequencer.generate().await.unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Ready);
    assert!(sequencer.has_staged_content());

    // 2サイクル目は取得に失敗: 前回のステージ済みコンテンツも破棄される
    let result = sequencer.generate().await;
    assert!(matches!(result, Err(ReelError::WireFetch { .. })));
    assert_eq!(sequencer.state_snapshot().status, Status::Error);
    assert!(!sequencer.has_staged_content());
}

#[tokio::test(start_paused = true)]
async fn test_wire_failure_aborts_cycle_to_error() {
    let (sequencer, _events) =
        make_sequencer(FakeWire::failing(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    let result = sequencer.generate().await;
    assert!(matches!(result, Err(ReelError::WireFetch { .. })));

    let state = sequencer.state_snapshot();
    assert_eq!(state.status, Status::Error);
    assert!(state.last_error.is_some());

    // error からは手動リセットで idle に戻れる
    sequencer.reset();
    let state = sequencer.state_snapshot();
    assert_eq!(state.status, Status::Idle);
    assert!(state.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_short_curation_aborts_cycle() {
    let (sequencer, _events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: 3 }, FakeVoice { fail: false });

    let result = sequencer.generate().await;
    assert!(matches!(result, Err(ReelError::CurationFailed { .. })));
    assert_eq!(sequencer.state_snapshot().status, Status::Error);
}

#[tokio::test(start_paused = true)]
async fn test_play_requires_ready_state() {
    let (sequencer, mut events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    // idle からの play は no-op
    sequencer.play().await.unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Idle);
    assert!(phases(&drain(&mut events)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_slot_is_consumed_at_most_once() {
    let (sequencer, _events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    sequencer.generate().await.unwrap();
    sequencer.play().await.unwrap();

    let payload = sequencer.take_broadcast().unwrap();
    assert_eq!(payload.news.len(), REQUIRED_STORIES);
    assert_eq!(payload.narration_durations_secs.len(), REQUIRED_STORIES);
    assert_eq!(payload.hashtags_en, "#News");
    // キャプチャ無効のセッションでは音声ペイロードは載らない
    assert!(payload.audio_wav_base64.is_none());
    // 2度目の取り出しは空
    assert!(sequencer.take_broadcast().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reset_from_finished_discards_staged_content() {
    let (sequencer, _events) =
        make_sequencer(FakeWire::new(), FakeDesk { stories: REQUIRED_STORIES }, FakeVoice { fail: false });

    sequencer.generate().await.unwrap();
    sequencer.play().await.unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Finished);

    sequencer.reset();
    let state = sequencer.state_snapshot();
    assert_eq!(state.status, Status::Idle);
    assert_eq!(state.phase, Phase::Stopped);
    assert_eq!(state.active_index, 0);
    // 未回収の完了オブジェクトも破棄される
    assert!(sequencer.take_broadcast().is_none());
    // ステージ済みコンテンツが消えたので play は進まない
    sequencer.play().await.unwrap();
    assert_eq!(sequencer.state_snapshot().status, Status::Idle);
}
