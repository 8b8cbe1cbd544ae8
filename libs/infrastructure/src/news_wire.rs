//! # NewsWire — 記事収集クライアント
//!
//! Newsdata.io 互換の API からページネーションで記事を取得し、
//! フィルタ・重複排除・件数制限を適用して返す。

use async_trait::async_trait;
use reel_core::contracts::{FetchStats, RawArticle};
use reel_core::error::ReelError;
use reel_core::traits::ArticleSource;
use shared::ReelConfig;
use tracing::{debug, info};

/// 記事収集クライアント
pub struct NewsWireClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    country: String,
    language: String,
    keyword: String,
    page_size: usize,
    max_pages: usize,
    max_articles: usize,
}

impl NewsWireClient {
    pub fn new(config: &ReelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.newsdata_api_key.clone(),
            base_url: config.wire_base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
            language: config.language.clone(),
            keyword: config.keyword.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages,
            max_articles: config.max_articles,
        }
    }
}

#[async_trait]
impl ArticleSource for NewsWireClient {
    async fn fetch_articles(&self) -> Result<(Vec<RawArticle>, FetchStats), ReelError> {
        // 環境エラー: ネットワークに触れる前に失敗させる
        if self.api_key.is_empty() {
            return Err(ReelError::MissingCredential {
                name: "NEWSDATA_API_KEY".to_string(),
            });
        }

        info!("📰 NewsWire: Fetching latest articles ({} pages max)...", self.max_pages);

        let mut fetched: Vec<serde_json::Value> = Vec::new();
        let mut next_page: Option<String> = None;

        for page in 0..self.max_pages {
            let mut request = self.client.get(&self.base_url).query(&[
                ("apikey", self.api_key.as_str()),
                ("country", self.country.as_str()),
                ("language", self.language.as_str()),
                ("q", self.keyword.as_str()),
                ("prioritydomain", "top"),
                ("image", "1"),
                ("size", &self.page_size.to_string()),
            ]);
            if let Some(token) = &next_page {
                request = request.query(&[("page", token.as_str())]);
            }

            let response = request.send().await.map_err(|e| ReelError::WireFetch {
                source: anyhow::anyhow!("Failed to reach article source: {}", e),
            })?;

            if !response.status().is_success() {
                return Err(ReelError::WireFetch {
                    source: anyhow::anyhow!(
                        "Article source request failed (status {})",
                        response.status()
                    ),
                });
            }

            let body: serde_json::Value =
                response.json().await.map_err(|e| ReelError::WireFetch {
                    source: anyhow::anyhow!("Failed to parse article response: {}", e),
                })?;

            if let Some(results) = body["results"].as_array() {
                debug!("NewsWire: page {} returned {} rows", page, results.len());
                fetched.extend(results.iter().cloned());
            }

            next_page = page_token(&body);
            if next_page.is_none() {
                break; // no more pages
            }
        }

        let (articles, stats) = sift_articles(fetched, self.max_articles);
        info!(
            "✅ NewsWire: {} articles fetched, {} usable after filtering",
            stats.total_fetched, articles.len()
        );
        Ok((articles, stats))
    }
}

fn page_token(body: &serde_json::Value) -> Option<String> {
    match &body["nextPage"] {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// フィルタ（id・タイトル・本文・画像が揃った行のみ）、id による重複排除、
/// 上限までの切り詰めを順に適用する
pub fn sift_articles(
    raw: Vec<serde_json::Value>,
    max_articles: usize,
) -> (Vec<RawArticle>, FetchStats) {
    let total_fetched = raw.len();
    let mut seen = std::collections::HashSet::new();
    let mut articles = Vec::new();
    let mut with_images = 0usize;

    for row in raw {
        let (Some(id), Some(title), Some(description), Some(image_url)) = (
            row["article_id"].as_str(),
            row["title"].as_str(),
            row["description"].as_str(),
            row["image_url"].as_str(),
        ) else {
            continue;
        };
        if id.is_empty() || title.is_empty() || description.is_empty() || image_url.is_empty() {
            continue;
        }
        with_images += 1;
        if !seen.insert(id.to_string()) {
            continue;
        }
        articles.push(RawArticle {
            article_id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            image_url: image_url.to_string(),
        });
    }

    articles.truncate(max_articles);
    (articles, FetchStats { total_fetched, with_images })
}
