/// 線形補間でクライアントのサンプルレートをエンジンの入力レートへ合わせる
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_hz: u32,
    to_hz: u32,
}

impl LinearResampler {
    pub fn new(from_hz: u32, to_hz: u32) -> Self {
        Self { from_hz, to_hz }
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_hz == self.to_hz
    }

    pub fn resample(&self, samples: &[f32]) -> Vec<f32> {
        if self.is_passthrough() || samples.is_empty() || self.from_hz == 0 {
            return samples.to_vec();
        }

        let step = self.from_hz as f64 / self.to_hz as f64;
        let out_len = (samples.len() as f64 / step).round() as usize;
        let last = samples[samples.len() - 1];

        (0..out_len)
            .map(|n| {
                let pos = n as f64 * step;
                let idx = pos.floor() as usize;
                let frac = (pos - idx as f64) as f32;
                let a = samples.get(idx).copied().unwrap_or(last);
                let b = samples.get(idx + 1).copied().unwrap_or(a);
                a + (b - a) * frac
            })
            .collect()
    }
}
