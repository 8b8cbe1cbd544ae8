//! # AudioRouter — 再生・収録兼用のオーディオルーティング
//!
//! ナレーションと BGM の2系統を1つのミキシンググラフに配線する。
//! ナレーション系統は常に等倍ゲイン、BGM 系統のみゲインステージを通す。
//! ゲインのランプはサンプル単位の線形補間で、壁時計ではなくオーディオ
//! クロック上で進む。収録モードではミックス結果をキャプチャシンクにも
//! 分配する。グラフはセッションにつき一度だけ構築し、再構築しない。
//!
//! 出力デバイスが開けない場合の縮退:
//! - ライブ再生: ミュートのまま続行（尺はクリップ長のスリープで保存）
//! - 収録モード: 実時間ペースのポンプスレッドがグラフを駆動する

use reel_core::error::ReelError;
use rodio::source::{Source, UniformSourceIterator};
use rodio::{Decoder, OutputStream, Sink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// グラフの固定フォーマット (TTS ネイティブの 24kHz / mono)
pub const GRAPH_SAMPLE_RATE: u32 = 24_000;

/// デコード済みの再生可能クリップ
#[derive(Clone)]
pub struct AudioClip {
    samples: Arc<Vec<f32>>,
}

impl AudioClip {
    /// エンコード済み音声 (WAV/MP3 等) をグラフのフォーマットへデコードする
    pub fn decode(bytes: &[u8]) -> Result<Self, ReelError> {
        let cursor = std::io::Cursor::new(bytes.to_vec());
        let decoder = Decoder::new(cursor).map_err(|e| ReelError::Infrastructure {
            reason: format!("音声デコード失敗: {}", e),
        })?;
        let converted: UniformSourceIterator<_, f32> =
            UniformSourceIterator::new(decoder, 1, GRAPH_SAMPLE_RATE);
        let samples: Vec<f32> = converted.collect();
        if samples.is_empty() {
            return Err(ReelError::Infrastructure {
                reason: "音声デコード結果が空".to_string(),
            });
        }
        Ok(Self { samples: Arc::new(samples) })
    }

    #[cfg(test)]
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples: Arc::new(samples) }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / GRAPH_SAMPLE_RATE as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// サンプル単位の線形ゲインランプ
struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u64,
}

impl GainRamp {
    fn new(initial: f32) -> Self {
        Self { current: initial, target: initial, step: 0.0, remaining: 0 }
    }

    fn ramp_to(&mut self, target: f32, secs: f32) {
        let samples = ((secs * GRAPH_SAMPLE_RATE as f32).max(1.0)) as u64;
        self.target = target;
        self.step = (target - self.current) / samples as f32;
        self.remaining = samples;
    }

    /// 1サンプル分ランプを進めて現在ゲインを返す
    fn advance(&mut self) -> f32 {
        if self.remaining > 0 {
            self.current += self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                // 丸め誤差を残さず目標値に着地させる
                self.current = self.target;
            }
        }
        self.current = self.current.clamp(0.0, 1.0);
        self.current
    }
}

struct NarrationVoice {
    clip: AudioClip,
    pos: usize,
    done: Option<oneshot::Sender<()>>,
}

struct MusicBed {
    clip: AudioClip,
    pos: usize,
    playing: bool,
}

struct GraphState {
    narration: Option<NarrationVoice>,
    music: Option<MusicBed>,
    music_gain: GainRamp,
}

impl GraphState {
    fn new() -> Self {
        Self { narration: None, music: None, music_gain: GainRamp::new(0.0) }
    }
}

fn lock_state(state: &Mutex<GraphState>) -> MutexGuard<'_, GraphState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// グラフ本体。出力シンク (rodio) またはポンプスレッドに引かれる。
pub struct MixerSource {
    state: Arc<Mutex<GraphState>>,
    capture: Option<Arc<Mutex<Vec<f32>>>>,
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let mut sample = 0.0f32;
        {
            let mut graph = lock_state(&self.state);

            if let Some(voice) = &mut graph.narration {
                // ナレーションは等倍ゲインで素通し
                sample += voice.clip.samples[voice.pos];
                voice.pos += 1;
                if voice.pos >= voice.clip.samples.len() {
                    if let Some(done) = voice.done.take() {
                        let _ = done.send(());
                    }
                    graph.narration = None;
                }
            }

            // ゲインはクリップの有無に関わらずオーディオクロックで進む
            let gain = graph.music_gain.advance();
            if let Some(music) = &mut graph.music {
                if music.playing {
                    sample += music.clip.samples[music.pos] * gain;
                    music.pos = (music.pos + 1) % music.clip.samples.len();
                }
            }
        }

        if let Some(capture) = &self.capture {
            if let Ok(mut sink) = capture.lock() {
                sink.push(sample);
            }
        }

        // グラフはセッション中ずっと生きる (アイドル時は無音)
        Some(sample)
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        GRAPH_SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// グラフを駆動している主体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveMode {
    /// 物理出力デバイス
    Device,
    /// 実時間ポンプ (収録モードのヘッドレス縮退)
    Pump,
    /// 誰も引いていない (ミュート再生)
    Muted,
}

/// オーディオルーター。セッションにつき一度だけ構築する。
pub struct AudioRouter {
    state: Arc<Mutex<GraphState>>,
    capture: Option<Arc<Mutex<Vec<f32>>>>,
    mode: DriveMode,
    stop: Arc<AtomicBool>,
}

impl AudioRouter {
    /// グラフを構築し、専用スレッドで出力を開始する。
    /// デバイスが開けなくてもエラーにはせず縮退する（プラットフォームエラー方針）。
    pub fn initialize(capture_mode: bool) -> Self {
        let state = Arc::new(Mutex::new(GraphState::new()));
        let capture = capture_mode.then(|| Arc::new(Mutex::new(Vec::new())));
        let mixer = MixerSource { state: Arc::clone(&state), capture: capture.clone() };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let (mode_tx, mode_rx) = std::sync::mpsc::channel();

        let spawned = std::thread::Builder::new()
            .name("audio-graph".to_string())
            .spawn(move || run_graph_thread(mixer, capture_mode, stop_flag, mode_tx));

        let mode = match spawned {
            Ok(_) => mode_rx.recv_timeout(Duration::from_secs(5)).unwrap_or(DriveMode::Muted),
            Err(e) => {
                warn!("⚠️ AudioRouter: failed to spawn audio thread: {}", e);
                DriveMode::Muted
            }
        };

        match mode {
            DriveMode::Device => info!("🔊 AudioRouter: graph wired to output device"),
            DriveMode::Pump => info!("🎛️ AudioRouter: headless pump driving the graph"),
            DriveMode::Muted => warn!("🔇 AudioRouter: no output device, playback will be muted"),
        }

        Self { state, capture, mode, stop }
    }

    /// グラフが実際に引かれているか (ミュート縮退の判定に使う)
    pub fn is_driven(&self) -> bool {
        self.mode != DriveMode::Muted
    }

    /// ナレーションクリップを再生し、終了シグナルの受信側を返す。
    /// 前のクリップが残っていれば置き換える (シグナルは破棄される)。
    pub fn play_narration(&self, clip: &AudioClip) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut graph = lock_state(&self.state);
        graph.narration = Some(NarrationVoice { clip: clip.clone(), pos: 0, done: Some(tx) });
        rx
    }

    /// BGM を先頭からループ再生する。空クリップはループ位置の計算が
    /// 成り立たないため配線しない。
    pub fn start_music(&self, clip: &AudioClip) {
        if clip.is_empty() {
            warn!("⚠️ AudioRouter: empty music clip, leaving the bus silent");
            return;
        }
        let mut graph = lock_state(&self.state);
        graph.music = Some(MusicBed { clip: clip.clone(), pos: 0, playing: true });
    }

    pub fn pause_music(&self) {
        let mut graph = lock_state(&self.state);
        if let Some(music) = &mut graph.music {
            music.playing = false;
        }
    }

    /// BGM ゲインを線形ランプで目標値へ遷移させる (オーディオクロック基準)
    pub fn ramp_music_gain(&self, target: f32, secs: f32) {
        let mut graph = lock_state(&self.state);
        graph.music_gain.ramp_to(target, secs);
    }

    pub fn current_music_gain(&self) -> f32 {
        lock_state(&self.state).music_gain.current
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture.is_some()
    }

    /// キャプチャシンクを空にする (収録開始時)
    pub fn clear_capture(&self) {
        if let Some(capture) = &self.capture {
            if let Ok(mut sink) = capture.lock() {
                sink.clear();
            }
        }
    }

    /// 蓄積されたキャプチャサンプルを取り出す (収録停止時)
    pub fn take_capture(&self) -> Vec<f32> {
        match &self.capture {
            Some(capture) => match capture.lock() {
                Ok(mut sink) => std::mem::take(&mut *sink),
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// テスト・解析用: スレッドを起こさずグラフとミキサーを直接組む
    #[cfg(test)]
    pub fn detached(capture_mode: bool) -> (Self, MixerSource) {
        let state = Arc::new(Mutex::new(GraphState::new()));
        let capture = capture_mode.then(|| Arc::new(Mutex::new(Vec::new())));
        let mixer = MixerSource { state: Arc::clone(&state), capture: capture.clone() };
        let router = Self {
            state,
            capture,
            mode: DriveMode::Muted,
            stop: Arc::new(AtomicBool::new(false)),
        };
        (router, mixer)
    }
}

impl Drop for AudioRouter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn run_graph_thread(
    mixer: MixerSource,
    capture_mode: bool,
    stop: Arc<AtomicBool>,
    mode_tx: std::sync::mpsc::Sender<DriveMode>,
) {
    // OutputStream は !Send のため、このスレッド内で開いてここで保持する
    match OutputStream::try_default() {
        Ok((_stream, handle)) => match Sink::try_new(&handle) {
            Ok(sink) => {
                let _ = mode_tx.send(DriveMode::Device);
                sink.append(mixer);
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                sink.stop();
            }
            Err(e) => {
                warn!("⚠️ AudioRouter: sink creation failed: {}", e);
                degrade_without_device(mixer, capture_mode, stop, mode_tx);
            }
        },
        Err(e) => {
            warn!("⚠️ AudioRouter: no output device available: {}", e);
            degrade_without_device(mixer, capture_mode, stop, mode_tx);
        }
    }
}

fn degrade_without_device(
    mixer: MixerSource,
    capture_mode: bool,
    stop: Arc<AtomicBool>,
    mode_tx: std::sync::mpsc::Sender<DriveMode>,
) {
    if capture_mode {
        let _ = mode_tx.send(DriveMode::Pump);
        pump_realtime(mixer, stop);
    } else {
        let _ = mode_tx.send(DriveMode::Muted);
    }
}

/// 実時間ペースでグラフを引き続ける。収録モードのヘッドレス環境で、
/// 終了シグナルとキャプチャを生かすために必要になる。
fn pump_realtime(mut mixer: MixerSource, stop: Arc<AtomicBool>) {
    const CHUNK_MS: u64 = 100;
    let chunk = (GRAPH_SAMPLE_RATE as u64 * CHUNK_MS / 1000) as usize;
    let mut deadline = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        deadline += Duration::from_millis(CHUNK_MS);
        for _ in 0..chunk {
            let _ = mixer.next();
        }
        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }
}
