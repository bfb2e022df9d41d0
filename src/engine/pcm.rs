//! s16le PCM の変換とレベル計算

/// little-endian i16 のバイト列を -1.0..1.0 の f32 へ展開（端数バイトは無視）
pub fn s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

pub fn root_mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum = samples.iter().map(|s| s * s).sum::<f32>();
    (sum / samples.len() as f32).sqrt()
}

pub fn db_to_linear(db: f32) -> f32 {
    10_f32.powf(db / 20.0)
}
