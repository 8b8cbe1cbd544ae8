//! # コラボレータトレイト定義
//!
//! 再生シーケンサーが依存する3つの外部サービスのインターフェースを定義する。

use crate::contracts::{CuratedBatch, FetchStats, RawArticle};
use crate::error::ReelError;
use async_trait::async_trait;

/// 記事ソース (NewsWire)
///
/// ページネーション・重複排除・フィルタ済みの生記事リストを返す。
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_articles(&self) -> Result<(Vec<RawArticle>, FetchStats), ReelError>;
}

/// キュレーションサービス (NewsDesk)
///
/// 生記事リストから必ず 5 件のストーリーを選定・整形して返す。
/// 不足分は生記事から補充する寛容契約（詳細は実装側に記載）。
#[async_trait]
pub trait Curator: Send + Sync {
    async fn curate(&self, articles: &[RawArticle]) -> Result<CuratedBatch, ReelError>;
}

/// ナレーションサービス (NarrationActor)
///
/// テキストを再生可能な WAV バイト列に変換する。一時障害には指数
/// バックオフで再試行し、ブロック応答は再試行せずに返す。
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, text: &str) -> Result<Vec<u8>, ReelError>;
}
