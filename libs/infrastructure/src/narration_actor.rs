//! # NarrationActor — 音声合成アクター (Gemini TTS Client)
//!
//! テキストを Gemini TTS の AUDIO モダリティで合成し、生 PCM に RIFF
//! ヘッダを付与して再生可能な WAV として返す。一時障害には指数バックオフ、
//! 鍵の枯渇にはフォールバック鍵へのフェイルオーバーで対処する。
//! コンテンツブロック応答は再試行しない。

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reel_core::error::ReelError;
use reel_core::traits::Narrator;
use tracing::{info, warn};

use crate::wav;

/// Gemini TTS が返す PCM の形式 (24kHz / mono / 16bit)
const TTS_SAMPLE_RATE: u32 = 24_000;
const TTS_CHANNELS: u16 = 1;
const TTS_BYTES_PER_SAMPLE: u16 = 2;

/// 音声合成アクター
pub struct NarrationActor {
    client: reqwest::Client,
    keys: Vec<String>,
    model: String,
    voice: String,
    base_url: String,
    max_attempts: usize,
    base_backoff_ms: u64,
}

impl NarrationActor {
    pub fn new(keys: Vec<String>, model: &str, voice: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            keys,
            model: model.to_string(),
            voice: voice.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }

    async fn request_once(&self, key: &str, text: &str) -> Result<Vec<u8>, ReelError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, key);

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReelError::TtsFailure { reason: format!("Failed to reach TTS endpoint: {}", e) })?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().await.unwrap_or_default();
            return Err(ReelError::TtsFailure {
                reason: format!("TTS request failed (status {}): {}", status, err_text),
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReelError::TtsFailure { reason: format!("Failed to parse TTS response: {}", e) })?;

        decode_tts_payload(&payload, text)
    }
}

#[async_trait]
impl Narrator for NarrationActor {
    async fn narrate(&self, text: &str) -> Result<Vec<u8>, ReelError> {
        let keys: Vec<&String> = self.keys.iter().filter(|k| !k.is_empty()).collect();
        if keys.is_empty() {
            return Err(ReelError::MissingCredential { name: "GEMINI_API_KEY".to_string() });
        }

        info!("🗣️ NarrationActor: Synthesizing voice for text: '{}'...", truncate(text, 24));

        let mut last_err = None;
        for (key_index, key) in keys.iter().enumerate() {
            let mut backoff_ms = self.base_backoff_ms;
            for attempt in 1..=self.max_attempts {
                match self.request_once(key, text).await {
                    Ok(audio) => {
                        info!("✅ NarrationActor: Voice synthesis completed ({} bytes)", audio.len());
                        return Ok(audio);
                    }
                    // ブロック応答は内容起因のため、鍵を替えても再試行しても無駄
                    Err(e @ ReelError::NarrationBlocked { .. }) => return Err(e),
                    Err(e) => {
                        if attempt < self.max_attempts {
                            warn!(
                                "🔄 NarrationActor: attempt {}/{} failed, retrying in {}ms: {}",
                                attempt, self.max_attempts, backoff_ms, e
                            );
                            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                            backoff_ms = backoff_ms.saturating_mul(2);
                        } else if key_index + 1 < keys.len() {
                            warn!(
                                "🔑 NarrationActor: key {}/{} exhausted, failing over: {}",
                                key_index + 1,
                                keys.len(),
                                e
                            );
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or(ReelError::TtsFailure {
            reason: "音声合成の再試行回数を使い切った".to_string(),
        }))
    }
}

/// Gemini TTS 応答から WAV を組み立てる。音声が無ければ失敗理由を調べる。
fn decode_tts_payload(payload: &serde_json::Value, text: &str) -> Result<Vec<u8>, ReelError> {
    if let Some(data) = payload["candidates"][0]["content"]["parts"][0]["inlineData"]["data"].as_str()
    {
        let pcm = BASE64
            .decode(data.trim())
            .map_err(|e| ReelError::TtsFailure { reason: format!("Invalid base64 audio data: {}", e) })?;

        let wav = wav::encode_wav(&pcm, TTS_CHANNELS, TTS_SAMPLE_RATE, TTS_BYTES_PER_SAMPLE);
        if wav.len() <= wav::WAV_HEADER_LEN {
            return Err(ReelError::TtsFailure { reason: "Received empty audio data from API".to_string() });
        }
        return Ok(wav);
    }

    // 音声が無い場合: まずコンテンツブロックを確認
    if let Some(reason) = payload["promptFeedback"]["blockReason"].as_str() {
        let message = payload["promptFeedback"]["blockReasonMessage"].as_str().unwrap_or("");
        return Err(ReelError::NarrationBlocked {
            reason: format!("text: '{}', reason: {} {}", truncate(text, 24), reason, message),
        });
    }

    // 音声の代わりにテキストが返ることもある
    if let Some(reply) = payload["candidates"][0]["content"]["parts"][0]["text"].as_str() {
        return Err(ReelError::TtsFailure {
            reason: format!("TTS returned text instead of audio: {}", truncate(reply, 80)),
        });
    }

    Err(ReelError::TtsFailure {
        reason: "TTS API did not return audio data or a clear error message".to_string(),
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
