//! # ドメインエラー型
//!
//! `thiserror` を使い、すべてのドメインエラーに明確な型を付与する。
//! 非テストコードでは `unwrap()` / `expect()` を使わず、必ずこの型で伝播する。
//!
//! エラーは4分類に対応する:
//! サイクル致命 (記事取得・キュレーション) / 縮退可能 (個別ナレーション・
//! プリロード) / 環境 (認証情報欠落) / プラットフォーム (オーディオ初期化)。

use thiserror::Error;

/// NewsreelFactory のドメインエラー
#[derive(Debug, Error)]
pub enum ReelError {
    // === 記事収集 ===
    #[error("記事取得に失敗: {source}")]
    WireFetch {
        #[source]
        source: anyhow::Error,
    },

    // === キュレーション ===
    #[error("キュレーション失敗: {reason}")]
    CurationFailed { reason: String },

    #[error("LLM 応答エラー: {source}")]
    LlmResponse {
        #[source]
        source: anyhow::Error,
    },

    // === 音声合成 ===
    #[error("音声合成失敗 (TTS): {reason}")]
    TtsFailure { reason: String },

    /// コンテンツブロックは再試行禁止
    #[error("音声合成がブロックされた: {reason}")]
    NarrationBlocked { reason: String },

    // === 環境 ===
    #[error("必須の認証情報が未設定: {name}")]
    MissingCredential { name: String },

    #[error("設定ファイル読み込みエラー: {source}")]
    ConfigLoad {
        #[source]
        source: anyhow::Error,
    },

    // === プラットフォーム ===
    #[error("オーディオエンジン初期化失敗: {reason}")]
    AudioEngine { reason: String },

    #[error("インフラ構造エラー: {reason}")]
    Infrastructure { reason: String },
}
