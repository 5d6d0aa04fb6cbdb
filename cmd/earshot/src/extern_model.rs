//! Subprocess adapters for the external embedding and diarization models.
//!
//! The pipeline never loads neural models itself; it hands a WAV clip to a
//! configured external tool and parses a JSON vector (or segment list)
//! from its stdout. A missing or unconfigured tool is a configuration
//! error: fatal, surfaced immediately, no retry.

use std::process::Command;

use earshot_diarize::{Diarization, DiarizeError, Diarizer, EmbeddingExtractor, Turn, Waveform};
use earshot_voicedb::EmbeddingModelSpec;

/// Environment variable naming the embedding extractor command.
pub const EXTRACTOR_ENV: &str = "EARSHOT_EXTRACTOR";

/// Environment variable naming the diarizer command.
pub const DIARIZER_ENV: &str = "EARSHOT_DIARIZER";

/// Model identity per supported backend. A new backend is a new entry,
/// never a mutation of an existing one.
pub fn model_spec_for(backend: &str) -> Result<EmbeddingModelSpec, DiarizeError> {
    match backend {
        "pyannote" => Ok(EmbeddingModelSpec::new(
            "pyannote",
            "pyannote/embedding",
            512,
            "3.1",
        )),
        "ecapa-tdnn" => Ok(EmbeddingModelSpec::new(
            "ecapa-tdnn",
            "speechbrain/spkrec-ecapa-voxceleb",
            192,
            "v2",
        )),
        other => Err(DiarizeError::Configuration(format!(
            "unknown embedding backend: {other}"
        ))),
    }
}

/// Runs an external tool on a temp WAV clip and parses a JSON embedding
/// vector from stdout.
///
/// Invocation: `<program> --backend <backend> <clip.wav>`, expected to
/// print either a bare JSON array or `{"embedding": [...]}`.
#[derive(Debug)]
pub struct CommandExtractor {
    model: EmbeddingModelSpec,
    program: String,
}

impl CommandExtractor {
    pub fn from_env(backend: &str, override_cmd: Option<&str>) -> Result<Self, DiarizeError> {
        let program = override_cmd
            .map(str::to_string)
            .or_else(|| std::env::var(EXTRACTOR_ENV).ok())
            .ok_or_else(|| {
                DiarizeError::Configuration(format!(
                    "no extractor command configured (--extractor-cmd or {EXTRACTOR_ENV})"
                ))
            })?;
        Ok(Self {
            model: model_spec_for(backend)?,
            program,
        })
    }
}

impl EmbeddingExtractor for CommandExtractor {
    fn model(&self) -> &EmbeddingModelSpec {
        &self.model
    }

    fn extract(&self, audio: &Waveform) -> Result<Vec<f32>, DiarizeError> {
        if audio.is_empty() {
            return Err(DiarizeError::Extraction("empty audio".to_string()));
        }
        let clip = write_clip(audio)?;
        let output = Command::new(&self.program)
            .arg("--backend")
            .arg(&self.model.backend)
            .arg(clip.path())
            .output()
            .map_err(|e| {
                DiarizeError::Configuration(format!(
                    "failed to run extractor {}: {e}",
                    self.program
                ))
            })?;
        if !output.status.success() {
            return Err(DiarizeError::Extraction(format!(
                "extractor exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let embedding = parse_embedding_output(&stdout)?;
        if embedding.len() != self.model.embedding_dim {
            return Err(DiarizeError::Extraction(format!(
                "extractor returned {} dims, expected {}",
                embedding.len(),
                self.model.embedding_dim
            )));
        }
        Ok(embedding)
    }
}

/// Runs an external diarization tool on a temp WAV file and parses the
/// segment list from stdout.
///
/// Invocation: `<program> [--speakers N] <audio.wav>`, expected to print
/// either a full diarization document or `{"segments": [...]}`.
pub struct CommandDiarizer {
    program: String,
}

impl CommandDiarizer {
    pub fn from_env(override_cmd: Option<&str>) -> Result<Self, DiarizeError> {
        let program = override_cmd
            .map(str::to_string)
            .or_else(|| std::env::var(DIARIZER_ENV).ok())
            .ok_or_else(|| {
                DiarizeError::Configuration(format!(
                    "no diarizer command configured ({DIARIZER_ENV})"
                ))
            })?;
        Ok(Self { program })
    }
}

impl Diarizer for CommandDiarizer {
    fn diarize(
        &self,
        audio: &Waveform,
        num_speakers: Option<usize>,
    ) -> Result<Diarization, DiarizeError> {
        let clip = write_clip(audio)?;
        let mut command = Command::new(&self.program);
        if let Some(n) = num_speakers {
            command.arg("--speakers").arg(n.to_string());
        }
        let output = command.arg(clip.path()).output().map_err(|e| {
            DiarizeError::Configuration(format!("failed to run diarizer {}: {e}", self.program))
        })?;
        if !output.status.success() {
            return Err(DiarizeError::Diarization(format!(
                "diarizer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_diarization_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn write_clip(audio: &Waveform) -> Result<tempfile::NamedTempFile, DiarizeError> {
    let clip = tempfile::Builder::new()
        .prefix("earshot_clip_")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| DiarizeError::Audio(format!("temp clip: {e}")))?;
    audio.write_wav_file(clip.path())?;
    Ok(clip)
}

/// Accepts a bare JSON array or an object with an `embedding` field.
pub fn parse_embedding_output(stdout: &str) -> Result<Vec<f32>, DiarizeError> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim())
        .map_err(|e| DiarizeError::Extraction(format!("bad extractor output: {e}")))?;
    let array = match &value {
        serde_json::Value::Array(_) => &value,
        serde_json::Value::Object(map) => map
            .get("embedding")
            .ok_or_else(|| DiarizeError::Extraction("missing embedding field".to_string()))?,
        _ => {
            return Err(DiarizeError::Extraction(
                "extractor output is neither array nor object".to_string(),
            ));
        }
    };
    serde_json::from_value(array.clone())
        .map_err(|e| DiarizeError::Extraction(format!("bad embedding vector: {e}")))
}

/// Accepts a full diarization document or an object with a `segments`
/// array.
pub fn parse_diarization_output(stdout: &str) -> Result<Diarization, DiarizeError> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim())
        .map_err(|e| DiarizeError::Diarization(format!("bad diarizer output: {e}")))?;
    if let Ok(full) = serde_json::from_value::<Diarization>(value.clone()) {
        return Ok(full);
    }
    let segments = value
        .get("segments")
        .cloned()
        .ok_or_else(|| DiarizeError::Diarization("missing segments field".to_string()))?;
    let turns: Vec<Turn> = serde_json::from_value(segments)
        .map_err(|e| DiarizeError::Diarization(format!("bad segments: {e}")))?;
    Ok(Diarization::from_turns(turns))
}
