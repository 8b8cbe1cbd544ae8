//! # The Contract — コラボレータ間通信契約
//!
//! 記事収集・キュレーション・音声合成・再生シーケンサーの間で
//! やり取りされるペイロードを型安全に定義する。

use serde::{Deserialize, Serialize};

/// 1サイクルあたりに必要なニュース件数（再生プロトコルの前提）
pub const REQUIRED_STORIES: usize = 5;

// --- Wire クラスター ---

/// 記事ソースから取得した生記事（フィルタ・重複排除済み）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub article_id: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
}

/// 取得統計（ログペインに表示する）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FetchStats {
    /// ページネーション込みの総取得件数
    pub total_fetched: usize,
    /// 画像付きでキュレーションに渡せた件数
    pub with_images: usize,
}

// --- Desk クラスター ---

/// キュレーション済みの1ストーリー
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedStory {
    /// 口語調に書き直した見出し（表示・ナレーション台本）
    pub headline: String,
    /// SNS 向けの英語見出し
    #[serde(default)]
    pub headline_en: String,
    /// ナレーション用の短い要約
    pub description: String,
    /// 元記事の画像ロケータ（書き換え禁止）
    pub image_url: String,
    /// 多様性確保のためのカテゴリキー
    #[serde(default)]
    pub category: String,
}

/// キュレーション結果（必ず [`REQUIRED_STORIES`] 件）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedBatch {
    pub stories: Vec<CuratedStory>,
    pub hashtags_en: String,
    pub hashtags_bn: String,
}

// --- Show クラスター ---

/// 再生サイクルの1アイテム。生成完了後は不変。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub headline: String,
    pub description: String,
    pub image_url: String,
    /// ナレーション音声（WAV バイト列）。合成失敗時は None に縮退。
    #[serde(skip)]
    pub narration: Option<Vec<u8>>,
}

/// 終端フェーズ到達後に出力スロットへ掲示される完了オブジェクト。
/// 外部の収録・アップロード工程が高々一度だけ消費する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub news: Vec<NewsItem>,
    pub hashtags_en: String,
    pub hashtags_bn: String,
    /// アイテムごとのナレーション尺（秒）。欠損クリップは 0.0。
    pub narration_durations_secs: Vec<f32>,
    /// キャプチャシンクから収録したミックス音声（WAV, base64）
    pub audio_wav_base64: Option<String>,
}
