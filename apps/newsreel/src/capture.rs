//! # 収録フック
//!
//! 収録モードではミックス出力をキャプチャし、停止時に WAV へエンコードして
//! base64 文字列として出力スロットに置く。スロットは一度だけ書き込まれ、
//! 外部の収集側が一度だけ取り出す想定。

use crate::audio_router::{AudioRouter, GRAPH_SAMPLE_RATE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use infrastructure::wav::encode_wav_i16;
use std::sync::Mutex;
use tracing::info;

/// 一度だけ値が現れる出力スロット。取り出すと空に戻る。
pub struct OutputSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> OutputSlot<T> {
    pub fn new() -> Self {
        Self { value: Mutex::new(None) }
    }

    /// 値を置く。すでに値がある場合は上書きしない (先着優先)。
    pub fn publish(&self, value: T) -> bool {
        let mut slot = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// 値を消費して取り出す
    pub fn take(&self) -> Option<T> {
        let mut slot = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }

    pub fn is_filled(&self) -> bool {
        match self.value.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}

impl<T> Default for OutputSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// キャプチャセッションの開始・停止を司る
pub struct CaptureRecorder;

impl CaptureRecorder {
    /// 収録開始。キャプチャシンクを空にして録り始める。
    pub fn start(router: &AudioRouter) -> bool {
        if !router.capture_enabled() {
            return false;
        }
        router.clear_capture();
        info!("🔴 収録開始");
        true
    }

    /// 収録停止。蓄積サンプルを WAV 化して base64 文字列で返す。
    /// 何も録れていなければ None。
    pub fn stop(router: &AudioRouter) -> Option<String> {
        let samples = router.take_capture();
        if samples.is_empty() {
            return None;
        }
        let encoded = encode_capture(&samples);
        info!(
            "⏹️ 収録停止: {:.1}秒 ({} bytes base64)",
            samples.len() as f64 / GRAPH_SAMPLE_RATE as f64,
            encoded.len()
        );
        Some(encoded)
    }
}

/// f32 サンプル列を 16bit WAV にして base64 文字列へ
pub fn encode_capture(samples: &[f32]) -> String {
    let pcm: Vec<i16> = samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    let wav = encode_wav_i16(&pcm, GRAPH_SAMPLE_RATE);
    BASE64.encode(wav)
}
