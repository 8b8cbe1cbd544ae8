//! # tuning — 再生ペーシングプロファイル
//!
//! フェーズ遷移の待機時間・フォールバック尺・BGM ゲインカーブを
//! 1つのプロファイルにまとめる。`pacing.toml` で上書き可能。

use reel_core::error::ReelError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 再生ペーシングの定義
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingProfile {
    /// プロファイル名
    pub name: String,
    /// 視覚遷移が落ち着くまでの待機 (ms)
    pub settle_ms: u64,
    /// 導入ナレーション欠損時のフォールバック尺 (ms)
    pub overview_fallback_ms: u64,
    /// アイテムナレーション欠損時のフォールバック尺 (ms)
    pub detail_fallback_ms: u64,
    /// ロゴ表示の保持時間 (ms)
    pub logo_hold_ms: u64,
    /// ナレーション終了シグナル待ちの猶予 (ms)
    pub clip_grace_ms: u64,
    /// BGM の定常ゲイン (0.0 - 1.0)
    pub bgm_gain: f32,
    /// BGM フェードインの長さ（秒・オーディオクロック基準）
    pub bgm_ramp_in_secs: f32,
    /// BGM フェードアウトの長さ（秒・オーディオクロック基準）
    pub bgm_ramp_out_secs: f32,
}

impl Default for PacingProfile {
    fn default() -> Self {
        Self {
            name: "default".into(),
            settle_ms: 500,
            overview_fallback_ms: 4000,
            detail_fallback_ms: 7000,
            logo_hold_ms: 3000,
            clip_grace_ms: 2000,
            bgm_gain: 0.08,
            bgm_ramp_in_secs: 3.0,
            bgm_ramp_out_secs: 2.5,
        }
    }
}

impl PacingProfile {
    /// pacing.toml からプロファイルをロードする
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReelError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReelError::ConfigLoad {
            source: anyhow::anyhow!("Failed to read pacing.toml: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| ReelError::ConfigLoad {
            source: anyhow::anyhow!("Failed to parse pacing.toml: {}", e),
        })
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn overview_fallback(&self) -> Duration {
        Duration::from_millis(self.overview_fallback_ms)
    }

    pub fn detail_fallback(&self) -> Duration {
        Duration::from_millis(self.detail_fallback_ms)
    }

    pub fn logo_hold(&self) -> Duration {
        Duration::from_millis(self.logo_hold_ms)
    }

    pub fn clip_grace(&self) -> Duration {
        Duration::from_millis(self.clip_grace_ms)
    }
}
