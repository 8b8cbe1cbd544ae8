//! # AssetPreloader — 資産プリローダー
//!
//! 画像・音声をローカルのバイト列として先読みする。1件ごとに個別の
//! タイムアウトを持ち、失敗は None に縮退する。バッチは全決着バリアで
//! 合流するため、1件の停滞が他を塞ぐことはない。

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// 1つのプリロードを個別タイムアウト付きで実行し、失敗を None に畳む
pub async fn load_with_timeout<T, F>(future: F, timeout: Duration, label: &str) -> Option<T>
where
    F: Future<Output = Result<T, anyhow::Error>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("⚠️ Preloading failed for {}: {}", label, e);
            None
        }
        Err(_) => {
            warn!("⚠️ Preloading timed out after {:?} for {}", timeout, label);
            None
        }
    }
}

/// 資産プリローダー
pub struct AssetPreloader {
    client: reqwest::Client,
    timeout: Duration,
}

impl AssetPreloader {
    pub fn new(timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), timeout }
    }

    /// (キー, URL) のバッチを並行取得する。戻り値のマップは必ず全キーを含み、
    /// 取得できなかったものは None になる。
    pub async fn preload(&self, requests: Vec<(String, String)>) -> HashMap<String, Option<Bytes>> {
        info!("📦 AssetPreloader: Preloading {} assets...", requests.len());

        let futures = requests.into_iter().map(|(key, url)| async move {
            let body = load_with_timeout(self.fetch(&url), self.timeout, &url).await;
            (key, body)
        });

        let results: HashMap<String, Option<Bytes>> =
            futures::future::join_all(futures).await.into_iter().collect();

        let loaded = results.values().filter(|v| v.is_some()).count();
        info!("✅ AssetPreloader: {}/{} assets resolved", loaded, results.len());
        results
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, anyhow::Error> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("fetch failed with status {}", response.status());
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_to_none_without_blocking() {
        // 永遠に解決しないリクエストでもバリアは完了する
        let result: Option<()> = load_with_timeout(
            std::future::pending(),
            Duration::from_secs(20),
            "http://never.resolves",
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_success_resolves_to_some() {
        let result =
            load_with_timeout(async { Ok(42u32) }, Duration::from_secs(1), "answer").await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_error_resolves_to_none() {
        let result: Option<u32> = load_with_timeout(
            async { Err(anyhow::anyhow!("boom")) },
            Duration::from_secs(1),
            "broken",
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_settles_with_partial_failures() {
        // 1件は成功、1件はタイムアウト: 両方のキーが揃って返る
        let ok = load_with_timeout(
            async { Ok(Bytes::from_static(b"img")) },
            Duration::from_secs(20),
            "ok",
        );
        let hung = load_with_timeout::<Bytes, _>(
            std::future::pending(),
            Duration::from_secs(20),
            "hung",
        );
        let (a, b) = tokio::join!(ok, hung);
        assert_eq!(a, Some(Bytes::from_static(b"img")));
        assert!(b.is_none());
    }
}
