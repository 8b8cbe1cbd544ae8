use serde::{Deserialize, Serialize};

/// NewsreelFactory 全体の設定
#[derive(Clone, Serialize, Deserialize)]
pub struct ReelConfig {
    /// Newsdata.io API Key（記事ソース）
    pub newsdata_api_key: String,
    /// Gemini API Key（キュレーション・音声合成）
    pub gemini_api_key: String,
    /// Gemini のフォールバック鍵（カンマ区切り、空可）
    pub gemini_fallback_keys: String,
    /// キュレーション用モデル名
    pub curation_model: String,
    /// 音声合成用モデル名
    pub tts_model: String,
    /// 音声合成のプリセットボイス名
    pub tts_voice: String,
    /// 記事ソースのベース URL
    pub wire_base_url: String,
    /// Gemini REST API のベース URL
    pub tts_base_url: String,
    /// 記事検索: 国コード
    pub country: String,
    /// 記事検索: 言語
    pub language: String,
    /// 記事検索: キーワード
    pub keyword: String,
    /// 1ページあたりの記事数
    pub page_size: usize,
    /// ページネーション上限
    pub max_pages: usize,
    /// キュレーションに渡す記事数の上限
    pub max_articles: usize,
    /// 導入ナレーションの台本
    pub intro_text: String,
    /// BGM 候補 URL（カンマ区切り、ランダムに1曲選ぶ）
    pub bgm_urls: String,
    /// ロゴ画像 URL
    pub logo_url: String,
    /// 背景画像 URL
    pub background_url: String,
    /// 下部オーバーレイ画像 URL
    pub overlay_url: String,
    /// 成果物の出力先ディレクトリ
    pub output_dir: String,
    /// アセット1件あたりのプリロードタイムアウト（秒）
    pub preload_timeout_secs: u64,
}

impl std::fmt::Debug for ReelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReelConfig")
            .field(
                "newsdata_api_key",
                if self.newsdata_api_key.is_empty() { &"" } else { &"***" },
            )
            .field(
                "gemini_api_key",
                if self.gemini_api_key.is_empty() { &"" } else { &"***" },
            )
            .field(
                "gemini_fallback_keys",
                if self.gemini_fallback_keys.is_empty() { &"" } else { &"***" },
            )
            .field("curation_model", &self.curation_model)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field("wire_base_url", &self.wire_base_url)
            .field("country", &self.country)
            .field("language", &self.language)
            .field("keyword", &self.keyword)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("max_articles", &self.max_articles)
            .field("output_dir", &self.output_dir)
            .field("preload_timeout_secs", &self.preload_timeout_secs)
            .finish()
    }
}

impl ReelConfig {
    /// 設定をファイルまたは環境変数から読み込む
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            // デフォルト値の設定
            .set_default(
                "newsdata_api_key",
                std::env::var("NEWSDATA_API_KEY").unwrap_or_default(),
            )?
            .set_default(
                "gemini_api_key",
                std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            )?
            .set_default(
                "gemini_fallback_keys",
                std::env::var("GEMINI_API_KEY_FALLBACKS").unwrap_or_default(),
            )?
            .set_default("curation_model", "gemini-2.5-flash")?
            .set_default("tts_model", "gemini-2.5-flash-preview-tts")?
            .set_default("tts_voice", "Kore")?
            .set_default("wire_base_url", "https://newsdata.io/api/1/latest")?
            .set_default(
                "tts_base_url",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("country", "bd")?
            .set_default("language", "en")?
            .set_default("keyword", "Bangladesh")?
            .set_default("page_size", 10)?
            .set_default("max_pages", 3)?
            .set_default("max_articles", 30)?
            .set_default("intro_text", "এই হলো আজকের প্রধান খবর.")?
            .set_default(
                "bgm_urls",
                "https://res.cloudinary.com/dho5purny/video/upload/v1754022296/Untitled_lngxhv.mp3,\
                 https://res.cloudinary.com/dho5purny/video/upload/v1754022521/Untitled_1_k29dkn.mp3,\
                 https://res.cloudinary.com/dho5purny/video/upload/v1754022536/Untitled_2_lat2xt.mp3",
            )?
            .set_default(
                "logo_url",
                "https://res.cloudinary.com/dho5purny/image/upload/v1754000603/Logo_nevggd.png",
            )?
            .set_default(
                "background_url",
                "https://res.cloudinary.com/dy80ftu9k/image/upload/v1754000569/Add_a_heading_x5yd2x.png",
            )?
            .set_default(
                "overlay_url",
                "https://res.cloudinary.com/dy80ftu9k/image/upload/v1753644798/Untitled-1_hxkjvt.png",
            )?
            .set_default("output_dir", "./workspace/newsreel")?
            .set_default("preload_timeout_secs", 20)?
            // newsreel.toml があれば読み込む
            .add_source(config::File::with_name("newsreel").required(false))
            // 環境変数 (NEWSREEL_*) があれば上書き
            .add_source(config::Environment::with_prefix("NEWSREEL"))
            .build()?;

        settings.try_deserialize()
    }

    /// フォールバック鍵をリストに展開する（空要素は除去）
    pub fn gemini_keys(&self) -> Vec<String> {
        std::iter::once(self.gemini_api_key.clone())
            .chain(self.gemini_fallback_keys.split(',').map(|s| s.trim().to_string()))
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// BGM 候補をリストに展開する
    pub fn bgm_choices(&self) -> Vec<String> {
        self.bgm_urls
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for ReelConfig {
    fn default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("⚠️ 設定の読み込みに失敗、組み込みデフォルトを使用: {}", e);
            Self {
                newsdata_api_key: std::env::var("NEWSDATA_API_KEY").unwrap_or_default(),
                gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
                gemini_fallback_keys: std::env::var("GEMINI_API_KEY_FALLBACKS")
                    .unwrap_or_default(),
                curation_model: "gemini-2.5-flash".to_string(),
                tts_model: "gemini-2.5-flash-preview-tts".to_string(),
                tts_voice: "Kore".to_string(),
                wire_base_url: "https://newsdata.io/api/1/latest".to_string(),
                tts_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                country: "bd".to_string(),
                language: "en".to_string(),
                keyword: "Bangladesh".to_string(),
                page_size: 10,
                max_pages: 3,
                max_articles: 30,
                intro_text: "এই হলো আজকের প্রধান খবর.".to_string(),
                bgm_urls: String::new(),
                logo_url: String::new(),
                background_url: String::new(),
                overlay_url: String::new(),
                output_dir: "./workspace/newsreel".to_string(),
                preload_timeout_secs: 20,
            }
        })
    }
}
