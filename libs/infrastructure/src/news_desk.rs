//! # NewsDesk — ニュースキュレーション機 (The Editor)
//!
//! 生記事リストを入力として受け取り、LLM (Gemini) にストーリーの選定・
//! 見出しの書き直し・ハッシュタグ生成を依頼する。応答が崩れていても
//! サイクルを止めないため、最終選定はローカルの寛容契約で必ず 5 件に揃える。

use async_trait::async_trait;
use reel_core::contracts::{CuratedBatch, CuratedStory, RawArticle, REQUIRED_STORIES};
use reel_core::error::ReelError;
use reel_core::traits::Curator;
use rig::completion::Prompt;
use rig::prelude::*;
use rig::providers::gemini;
use serde::Deserialize;
use tracing::{error, info, warn};

const FALLBACK_HASHTAGS_EN: &str = "#news #bangladesh #breakingnews";
const FALLBACK_HASHTAGS_BN: &str = "#খবর #বাংলাদেশ #শিরোনাম";

/// キュレーションデスク
pub struct NewsDesk {
    api_key: String,
    model: String,
}

impl NewsDesk {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn get_client(&self) -> Result<gemini::Client, ReelError> {
        gemini::Client::new(&self.api_key)
            .map_err(|e| ReelError::Infrastructure { reason: format!("Gemini Client error: {}", e) })
    }
}

/// LLM に期待する応答形
#[derive(Debug, Deserialize)]
struct DeskResponse {
    #[serde(default)]
    news_items: Vec<CuratedStory>,
    #[serde(default)]
    hashtags_en: String,
    #[serde(default)]
    hashtags_bn: String,
}

#[async_trait]
impl Curator for NewsDesk {
    /// 寛容契約: LLM 候補から 2 パス（カテゴリ+画像ユニーク → 画像ユニーク）で
    /// 選定し、不足分は生記事を元の順で補充、超過分は切り捨てて必ず 5 件返す。
    async fn curate(&self, articles: &[RawArticle]) -> Result<CuratedBatch, ReelError> {
        if self.api_key.is_empty() {
            return Err(ReelError::MissingCredential { name: "GEMINI_API_KEY".to_string() });
        }
        if articles.is_empty() {
            return Err(ReelError::CurationFailed {
                reason: "キュレーション対象の記事が 0 件".to_string(),
            });
        }

        info!("🗞️ NewsDesk: Curating top {} stories with Gemini ({})...", REQUIRED_STORIES, self.model);

        let client = self.get_client()?;

        let preamble = r#"You are a meticulous and discerning breaking news editor for a viral
social media news channel in Bangladesh. From the provided raw articles, select 8-10 unique,
engaging, visually-backed stories.

Rules:
- Every candidate MUST keep its original, non-empty 'image_url'.
- Eliminate stories that are thematically or factually related; the final candidates must
  cover completely distinct subjects.
- For each candidate produce:
  * headline: rewritten in modern, natural-sounding, spoken Bangladeshi Bangla, under 12 words.
  * headline_en: a short, catchy English version.
  * description: a concise spoken-style Bangla summary, maximum 18 words.
  * image_url: the original value, unchanged.
  * category: one of ['Politics','Business','Technology','Sports','Entertainment','Social','International','Crime','Weather'].
- Also produce hashtags_en and hashtags_bn: single strings of trending hashtags.

Return ONLY a JSON object: {"news_items": [...], "hashtags_en": "...", "hashtags_bn": "..."}"#;

        let agent = client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(0.7)
            .build();

        let slimmed: Vec<serde_json::Value> = articles
            .iter()
            .map(|a| {
                serde_json::json!({
                    "title": a.title,
                    "description": a.description,
                    "image_url": a.image_url,
                })
            })
            .collect();
        let user_prompt = format!(
            "Here are the raw articles to choose from:\n{}",
            serde_json::to_string(&slimmed).map_err(|e| ReelError::CurationFailed {
                reason: format!("記事リストのシリアライズに失敗: {}", e),
            })?
        );

        let response: String = agent.prompt(user_prompt).await.map_err(|e| {
            error!("Gemini Error: {}", e);
            ReelError::LlmResponse { source: anyhow::anyhow!("Gemini Prompt Error: {}", e) }
        })?;

        // 応答の崩れは縮退: 候補 0 件として生記事フォールバックに任せる
        let desk: DeskResponse = match extract_json(&response)
            .and_then(|json| {
                serde_json::from_str(&json).map_err(|e| ReelError::CurationFailed {
                    reason: format!("Gemini JSON Parse Error: {}", e),
                })
            }) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("⚠️ NewsDesk: Failed to parse AI response, falling back to raw articles: {}", e);
                DeskResponse { news_items: Vec::new(), hashtags_en: String::new(), hashtags_bn: String::new() }
            }
        };

        let candidate_count = desk.news_items.len();
        let stories = select_final_five(desk.news_items, articles);
        if candidate_count < REQUIRED_STORIES {
            warn!(
                "⚠️ NewsDesk: AI returned only {} stories, filled the rest from raw articles",
                candidate_count
            );
        }
        info!("✅ NewsDesk: Curation complete ({} stories)", stories.len());

        Ok(CuratedBatch {
            stories,
            hashtags_en: if desk.hashtags_en.is_empty() {
                FALLBACK_HASHTAGS_EN.to_string()
            } else {
                desk.hashtags_en
            },
            hashtags_bn: if desk.hashtags_bn.is_empty() {
                FALLBACK_HASHTAGS_BN.to_string()
            } else {
                desk.hashtags_bn
            },
        })
    }
}

/// 候補から最終 5 件を選定する。
/// パス1: カテゴリも画像もユニークなものを優先（多様性確保）。
/// パス2: 画像がユニークなら残りを採用。
/// 不足分: 未使用画像の生記事を元の順で補充し、必ず 5 件に切り揃える。
pub fn select_final_five(candidates: Vec<CuratedStory>, raw: &[RawArticle]) -> Vec<CuratedStory> {
    let mut finals: Vec<CuratedStory> = Vec::new();
    let mut used_categories = std::collections::HashSet::new();
    let mut used_images = std::collections::HashSet::new();

    for item in &candidates {
        if finals.len() >= REQUIRED_STORIES {
            break;
        }
        if item.image_url.is_empty() {
            continue;
        }
        if !used_images.contains(&item.image_url) && !used_categories.contains(&item.category) {
            used_categories.insert(item.category.clone());
            used_images.insert(item.image_url.clone());
            finals.push(item.clone());
        }
    }

    if finals.len() < REQUIRED_STORIES {
        for item in &candidates {
            if finals.len() >= REQUIRED_STORIES {
                break;
            }
            if !item.image_url.is_empty() && !used_images.contains(&item.image_url) {
                used_images.insert(item.image_url.clone());
                finals.push(item.clone());
            }
        }
    }

    if finals.len() < REQUIRED_STORIES {
        for article in raw {
            if finals.len() >= REQUIRED_STORIES {
                break;
            }
            if article.image_url.is_empty() || used_images.contains(&article.image_url) {
                continue;
            }
            used_images.insert(article.image_url.clone());
            // 見出しの書き直しは諦め、元記事をそのまま使う
            finals.push(CuratedStory {
                headline: article.title.clone(),
                headline_en: article.title.clone(),
                description: article.description.clone(),
                image_url: article.image_url.clone(),
                category: "Social".to_string(),
            });
        }
    }

    finals.truncate(REQUIRED_STORIES);
    finals
}

/// 文字列から JSON ブロックを探して抽出する
fn extract_json(text: &str) -> Result<String, ReelError> {
    let mut clean_text = text.to_string();

    // 1. markdown code block: ```json ... ``` の中身を抽出
    if let Some(start_idx) = clean_text.find("```json") {
        let after_start = &clean_text[start_idx + 7..];
        if let Some(end_idx) = after_start.find("```") {
            clean_text = after_start[..end_idx].to_string();
        }
    } else if let Some(start_idx) = clean_text.find("```") {
        // フォールバック: 言語指定なしの ``` ... ``` も試す
        let after_start = &clean_text[start_idx + 3..];
        if let Some(end_idx) = after_start.find("```") {
            clean_text = after_start[..end_idx].to_string();
        }
    }

    if let (Some(start), Some(end)) = (clean_text.find('{'), clean_text.rfind('}')) {
        let mut json_str = clean_text[start..=end].to_string();
        // Remove trailing commas before closing braces/brackets, which is a common LLM hallucination
        json_str = json_str
            .replace(",\n}", "\n}")
            .replace(",}", "}")
            .replace(",\n]", "\n]")
            .replace(",]", "]");

        // 欠落したダブルクオートを修復する簡易的な処理 (LLMが先頭のクオートを忘れがち)
        // `"key": 値,` -> `"key": "値",`
        // ただし [ や { または " で始まるものは除外
        let re_missing_both =
            regex::Regex::new(r#""([a-zA-Z_]+)"\s*:\s*([^"\[\{\s][^",\n]+)\s*,"#)
                .map_err(|e| ReelError::Infrastructure { reason: format!("regex error: {}", e) })?;
        json_str = re_missing_both.replace_all(&json_str, "\"$1\": \"$2\",").to_string();

        // 先頭だけ忘れて末尾はある場合: `"key": 値",` -> `"key": "値",`
        let re_missing_start =
            regex::Regex::new(r#""([a-zA-Z_]+)"\s*:\s*([^"\[\{\s][^"\n]+)","#)
                .map_err(|e| ReelError::Infrastructure { reason: format!("regex error: {}", e) })?;
        json_str = re_missing_start.replace_all(&json_str, "\"$1\": \"$2\",").to_string();

        Ok(json_str)
    } else {
        Err(ReelError::CurationFailed { reason: "LLM response did not contain JSON".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(cat: &str, image: &str) -> CuratedStory {
        CuratedStory {
            headline: format!("hl-{image}"),
            headline_en: format!("en-{image}"),
            description: format!("desc-{image}"),
            image_url: image.to_string(),
            category: cat.to_string(),
        }
    }

    fn article(id: usize) -> RawArticle {
        RawArticle {
            article_id: format!("raw-{id}"),
            title: format!("raw title {id}"),
            description: format!("raw desc {id}"),
            image_url: format!("http://raw/{id}"),
        }
    }

    #[test]
    fn test_extract_json_block() {
        let text = "Here is the result: {\"title\": \"test\"} Hope you like it.";
        let result = extract_json(text).unwrap();
        assert_eq!(result, "{\"title\": \"test\"}");
    }

    #[test]
    fn test_extract_json_from_code_fence() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text).unwrap().trim(), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_no_block() {
        let text = "There is no json here";
        assert!(extract_json(text).is_err());
    }

    #[test]
    fn test_select_prefers_unique_categories() {
        let candidates = vec![
            story("Politics", "http://c/1"),
            story("Politics", "http://c/2"), // 同一カテゴリはパス1で飛ばされる
            story("Sports", "http://c/3"),
            story("Weather", "http://c/4"),
            story("Crime", "http://c/5"),
            story("Business", "http://c/6"),
        ];
        let finals = select_final_five(candidates, &[]);
        assert_eq!(finals.len(), 5);
        // パス1で 1,3,4,5,6 が選ばれ、2 は不要
        assert!(finals.iter().all(|s| s.image_url != "http://c/2"));
    }

    #[test]
    fn test_select_second_pass_fills_duplicate_categories() {
        let candidates = vec![
            story("Politics", "http://c/1"),
            story("Politics", "http://c/2"),
            story("Politics", "http://c/3"),
            story("Politics", "http://c/4"),
            story("Politics", "http://c/5"),
        ];
        let finals = select_final_five(candidates, &[]);
        assert_eq!(finals.len(), 5);
    }

    #[test]
    fn test_select_fills_shortfall_from_raw_in_order() {
        let candidates = vec![story("Politics", "http://c/1"), story("Sports", "http://c/2")];
        let raw: Vec<_> = (0..6).map(article).collect();
        let finals = select_final_five(candidates, &raw);
        assert_eq!(finals.len(), 5);
        assert_eq!(finals[2].headline, "raw title 0");
        assert_eq!(finals[3].headline, "raw title 1");
        assert_eq!(finals[4].headline, "raw title 2");
    }

    #[test]
    fn test_select_never_duplicates_images_when_alternatives_exist() {
        let candidates = vec![
            story("Politics", "http://shared"),
            story("Sports", "http://shared"), // 画像重複は採用されない
        ];
        let raw: Vec<_> = (0..8).map(article).collect();
        let finals = select_final_five(candidates, &raw);
        assert_eq!(finals.len(), 5);
        let mut images: Vec<_> = finals.iter().map(|s| s.image_url.clone()).collect();
        images.sort();
        images.dedup();
        assert_eq!(images.len(), 5);
    }

    #[test]
    fn test_select_truncates_excess_candidates() {
        let candidates: Vec<_> = (0..9)
            .map(|i| story(&format!("cat-{i}"), &format!("http://c/{i}")))
            .collect();
        let finals = select_final_five(candidates, &[]);
        assert_eq!(finals.len(), 5);
    }
}
