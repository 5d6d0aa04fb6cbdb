#[cfg(feature = "wav")]
use crate::error::DiarizeError;

/// Mono audio in memory: f32 samples at a fixed rate.
///
/// The identification pipeline works on 16 kHz mono audio by convention;
/// the rate is carried explicitly so slice arithmetic never guesses.
#[derive(Debug, Clone)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Copies out the `[start_secs, end_secs)` range, clamped to the
    /// waveform bounds.
    pub fn slice(&self, start_secs: f64, end_secs: f64) -> Waveform {
        let rate = self.sample_rate as f64;
        let start = ((start_secs.max(0.0) * rate) as usize).min(self.samples.len());
        let end = ((end_secs.max(0.0) * rate) as usize).min(self.samples.len());
        let range = if start < end { start..end } else { start..start };
        Waveform {
            samples: self.samples[range].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    /// Reads a WAV file, downmixing multi-channel audio to mono by
    /// averaging. The sample rate is taken from the file header.
    #[cfg(feature = "wav")]
    pub fn from_wav_file(path: &std::path::Path) -> Result<Self, DiarizeError> {
        if !path.exists() {
            return Err(DiarizeError::MissingAudio(path.display().to_string()));
        }
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| DiarizeError::Audio(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| DiarizeError::Audio(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| DiarizeError::Audio(e.to_string()))?
            }
        };

        let samples = if channels <= 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };
        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Writes the waveform as 16-bit PCM WAV.
    #[cfg(feature = "wav")]
    pub fn write_wav_file(&self, path: &std::path::Path) -> Result<(), DiarizeError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| DiarizeError::Audio(format!("{}: {e}", path.display())))?;
        for &s in &self.samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(v)
                .map_err(|e| DiarizeError::Audio(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| DiarizeError::Audio(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_and_len() {
        let w = Waveform::new(vec![0.0; 32000], 16000);
        assert_eq!(w.len(), 32000);
        assert!((w.duration_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn slice_extracts_the_range() {
        let samples: Vec<f32> = (0..16000).map(|i| i as f32).collect();
        let w = Waveform::new(samples, 16000);
        let s = w.slice(0.25, 0.5);
        assert_eq!(s.len(), 4000);
        assert_eq!(s.samples()[0], 4000.0);
    }

    #[test]
    fn slice_clamps_to_bounds() {
        let w = Waveform::new(vec![0.0; 8000], 16000);
        assert_eq!(w.slice(0.25, 10.0).len(), 4000);
        assert_eq!(w.slice(5.0, 10.0).len(), 0);
        assert_eq!(w.slice(-1.0, 0.1).len(), 1600);
        // Inverted range yields nothing rather than panicking.
        assert_eq!(w.slice(0.4, 0.2).len(), 0);
    }
}
