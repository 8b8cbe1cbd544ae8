//! # WAV コーデック
//!
//! Gemini TTS は生の PCM を返すため、再生・保存には RIFF ヘッダの付与が
//! 必要になる。ここでは 16bit PCM の最小限のエンコーダのみを持つ。

/// WAV ヘッダのサイズ（バイト）
pub const WAV_HEADER_LEN: usize = 44;

/// 生 PCM バイト列を WAV ファイル形式に包む
pub fn encode_wav(pcm: &[u8], channels: u16, sample_rate: u32, bytes_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bytes_per_sample;
    let byte_rate = sample_rate * block_align as u32;
    let data_size = pcm.len() as u32;

    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // "fmt " sub-chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes()); // bits per sample

    // "data" sub-chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    buf.extend_from_slice(pcm);

    buf
}

/// i16 サンプル列をモノラル WAV に変換する（キャプチャ収録用）
pub fn encode_wav_i16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        pcm.extend_from_slice(&s.to_le_bytes());
    }
    encode_wav(&pcm, 1, sample_rate, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let pcm = [0u8, 1, 2, 3];
        let wav = encode_wav(&pcm, 1, 24_000, 2);

        assert_eq!(wav.len(), WAV_HEADER_LEN + 4);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        // PCM format, mono
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 1);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        // sample rate / byte rate
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 24_000);
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), 48_000);
        // bits per sample
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
        // data chunk size
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 4);
        assert_eq!(&wav[44..], &pcm);
    }

    #[test]
    fn test_i16_roundtrip_bytes() {
        let wav = encode_wav_i16(&[0, i16::MAX, i16::MIN], 24_000);
        assert_eq!(wav.len(), WAV_HEADER_LEN + 6);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), i16::MAX);
    }
}
