use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};

use crate::entity::{
    CentroidRecord, EmbeddingModelRecord, EmbeddingModelSpec, MAX_SAMPLE_DATES, NewSample,
    SampleInfo, SampleSource, SampleType, SpeakerSummary, StoredSample, default_short_name,
    l2_norm,
};
use crate::error::VoiceDbError;
use crate::store::{
    IntegrityIssue, IntegrityReport, RebuildReport, RemovedSpeaker, VoiceStore,
};

/// Relational [`VoiceStore`] backed by SQLite. The authoritative store:
/// retains every sample row, so rebuild and verification operate on real
/// data rather than aggregates.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies the
    /// schema.
    pub fn open(path: &Path) -> Result<Self, VoiceDbError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database. Data is lost on drop; for tests and scratch use.
    pub fn open_in_memory() -> Result<Self, VoiceDbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, VoiceDbError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backend TEXT NOT NULL,
                model_id TEXT NOT NULL,
                embedding_dim INTEGER NOT NULL,
                dtype TEXT NOT NULL DEFAULT 'f32',
                version_tag TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(backend, model_id, embedding_dim, dtype, version_tag)
            );

            CREATE TABLE IF NOT EXISTS voice_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sample_key TEXT NOT NULL UNIQUE,
                speaker_name TEXT NOT NULL,
                sample_type TEXT NOT NULL DEFAULT 'speaker',
                episode_id INTEGER,
                segment_idx INTEGER,
                file_path TEXT,
                transcript_text TEXT,
                sample_date TEXT,
                start_time REAL,
                end_time REAL,
                source TEXT NOT NULL DEFAULT 'manual',
                rating INTEGER NOT NULL DEFAULT 0,
                embedding_model_id INTEGER NOT NULL REFERENCES embedding_models(id),
                embedding BLOB NOT NULL,
                vector_norm REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_voice_samples_speaker
                ON voice_samples(speaker_name, sample_type);
            CREATE INDEX IF NOT EXISTS idx_voice_samples_model
                ON voice_samples(embedding_model_id);

            CREATE TABLE IF NOT EXISTS speaker_centroids (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                speaker_name TEXT NOT NULL,
                sample_type TEXT NOT NULL DEFAULT 'speaker',
                short_name TEXT NOT NULL,
                representative_sample_file TEXT,
                sample_count INTEGER NOT NULL DEFAULT 0,
                sample_dates TEXT NOT NULL DEFAULT '[]',
                centroid BLOB NOT NULL,
                embedding_model_id INTEGER NOT NULL REFERENCES embedding_models(id),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(speaker_name, sample_type, embedding_model_id)
            );
            CREATE INDEX IF NOT EXISTS idx_speaker_centroids_model
                ON speaker_centroids(embedding_model_id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All embedding-model rows, oldest first.
    pub fn models(&self) -> Result<Vec<EmbeddingModelRecord>, VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, backend, model_id, embedding_dim, dtype, version_tag, active
             FROM embedding_models ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmbeddingModelRecord {
                id: row.get(0)?,
                spec: EmbeddingModelSpec {
                    backend: row.get(1)?,
                    model_id: row.get(2)?,
                    embedding_dim: row.get::<_, i64>(3)? as usize,
                    dtype: row.get(4)?,
                    version_tag: row.get(5)?,
                },
                active: row.get::<_, i64>(6)? != 0,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Activates or deactivates a model row. Deactivating supersedes the
    /// model: its centroids stop appearing in `load_centroids` but its
    /// samples stay interpretable.
    pub fn set_model_active(&self, model_id: i64, active: bool) -> Result<(), VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE embedding_models SET active = ?1 WHERE id = ?2",
            params![active as i64, model_id],
        )?;
        Ok(())
    }
}

fn resolve_model(conn: &Connection, spec: &EmbeddingModelSpec) -> Result<i64, VoiceDbError> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM embedding_models
             WHERE backend = ?1 AND model_id = ?2 AND embedding_dim = ?3
               AND dtype = ?4 AND version_tag = ?5",
            params![
                spec.backend,
                spec.model_id,
                spec.embedding_dim as i64,
                spec.dtype,
                spec.version_tag
            ],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO embedding_models (backend, model_id, embedding_dim, dtype, version_tag)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            spec.backend,
            spec.model_id,
            spec.embedding_dim as i64,
            spec.dtype,
            spec.version_tag
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for &x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn dates_to_json(dates: &[NaiveDate]) -> String {
    serde_json::to_string(dates).unwrap_or_else(|_| "[]".to_string())
}

fn dates_from_json(raw: &str) -> Vec<NaiveDate> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Keeps the most recent `MAX_SAMPLE_DATES` dates, oldest evicted first.
fn bound_dates(mut dates: Vec<NaiveDate>) -> Vec<NaiveDate> {
    dates.sort_unstable();
    if dates.len() > MAX_SAMPLE_DATES {
        dates.drain(..dates.len() - MAX_SAMPLE_DATES);
    }
    dates
}

/// One accumulating `(speaker, sample_type, model)` group during rebuild.
struct RebuildGroup {
    speaker: String,
    sample_type: SampleType,
    model_row_id: i64,
    sum: Vec<f64>,
    count: u32,
    dates: Vec<NaiveDate>,
    rep_file: Option<String>,
}

impl RebuildGroup {
    fn into_centroid(
        self,
        short_names: &BTreeMap<(String, String, i64), String>,
        specs: &BTreeMap<i64, EmbeddingModelSpec>,
    ) -> Option<(i64, CentroidRecord)> {
        if self.count == 0 {
            return None;
        }
        let spec = specs.get(&self.model_row_id)?.clone();
        let n = self.count as f64;
        let centroid: Vec<f32> = self.sum.iter().map(|&s| (s / n) as f32).collect();
        let short = short_names
            .get(&(
                self.speaker.clone(),
                self.sample_type.as_str().to_string(),
                self.model_row_id,
            ))
            .cloned()
            .unwrap_or_else(|| default_short_name(&self.speaker));
        Some((
            self.model_row_id,
            CentroidRecord {
                speaker_name: self.speaker,
                sample_type: self.sample_type,
                short_name: short,
                representative_sample_file: self.rep_file,
                sample_count: self.count,
                sample_dates: bound_dates(self.dates),
                centroid,
                model: spec,
            },
        ))
    }
}

/// Recomputes centroids for the backend within an open transaction,
/// optionally restricted to one speaker. Samples are folded in sample-key
/// order so the result is independent of insertion order.
fn rebuild_in_tx(
    tx: &Connection,
    backend: &str,
    speaker: Option<&str>,
) -> Result<RebuildReport, VoiceDbError> {
    // Preserve curated short names across the rebuild.
    let mut short_names: BTreeMap<(String, String, i64), String> = BTreeMap::new();
    {
        let mut stmt = tx.prepare(
            "SELECT c.speaker_name, c.sample_type, c.embedding_model_id, c.short_name
             FROM speaker_centroids c
             JOIN embedding_models m ON m.id = c.embedding_model_id
             WHERE m.backend = ?1",
        )?;
        let rows = stmt.query_map(params![backend], |row| {
            Ok((
                (row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?),
                row.get::<_, String>(3)?,
            ))
        })?;
        for r in rows {
            let (k, v) = r?;
            short_names.insert(k, v);
        }
    }

    let mut specs: BTreeMap<i64, EmbeddingModelSpec> = BTreeMap::new();
    {
        let mut stmt = tx.prepare(
            "SELECT id, backend, model_id, embedding_dim, dtype, version_tag
             FROM embedding_models WHERE backend = ?1",
        )?;
        let rows = stmt.query_map(params![backend], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                EmbeddingModelSpec {
                    backend: row.get(1)?,
                    model_id: row.get(2)?,
                    embedding_dim: row.get::<_, i64>(3)? as usize,
                    dtype: row.get(4)?,
                    version_tag: row.get(5)?,
                },
            ))
        })?;
        for r in rows {
            let (id, spec) = r?;
            specs.insert(id, spec);
        }
    }

    let sql = format!(
        "SELECT s.speaker_name, s.sample_type, s.embedding_model_id, m.embedding_dim,
                s.embedding, s.file_path, s.sample_date
         FROM voice_samples s
         JOIN embedding_models m ON m.id = s.embedding_model_id
         WHERE m.backend = ?1{}
         ORDER BY s.speaker_name, s.sample_type, s.embedding_model_id, s.sample_key",
        if speaker.is_some() { " AND s.speaker_name = ?2" } else { "" },
    );

    type SampleRow = (String, String, i64, i64, Vec<u8>, Option<String>, Option<String>);
    let mut raw: Vec<SampleRow> = Vec::new();
    {
        let mut stmt = tx.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<SampleRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        };
        if let Some(name) = speaker {
            let rows = stmt.query_map(params![backend, name], map_row)?;
            for r in rows {
                raw.push(r?);
            }
        } else {
            let rows = stmt.query_map(params![backend], map_row)?;
            for r in rows {
                raw.push(r?);
            }
        }
    }

    let mut groups: Vec<RebuildGroup> = Vec::new();
    let mut sample_rows = 0usize;
    for (name, type_raw, model_row_id, dim_raw, blob, file_path, date_raw) in raw {
        sample_rows += 1;
        let sample_type: SampleType = type_raw.parse()?;
        let dim = dim_raw as usize;
        let vector = blob_to_vector(&blob);
        if vector.len() != dim {
            tracing::warn!(
                speaker = %name,
                expected = dim,
                got = vector.len(),
                "skipping corrupt sample vector during rebuild"
            );
            continue;
        }

        let fresh = match groups.last() {
            Some(g) => {
                g.speaker != name || g.sample_type != sample_type || g.model_row_id != model_row_id
            }
            None => true,
        };
        if fresh {
            groups.push(RebuildGroup {
                speaker: name.clone(),
                sample_type,
                model_row_id,
                sum: vec![0.0; dim],
                count: 0,
                dates: Vec::new(),
                rep_file: None,
            });
        }
        let g = groups.last_mut().unwrap();
        for (acc, &x) in g.sum.iter_mut().zip(vector.iter()) {
            *acc += x as f64;
        }
        g.count += 1;
        if g.rep_file.is_none() {
            g.rep_file = file_path;
        }
        if let Some(date_str) = date_raw {
            if let Ok(d) = date_str.parse::<NaiveDate>() {
                g.dates.push(d);
            }
        }
    }

    match speaker {
        Some(name) => {
            tx.execute(
                "DELETE FROM speaker_centroids
                 WHERE speaker_name = ?1
                   AND embedding_model_id IN
                       (SELECT id FROM embedding_models WHERE backend = ?2)",
                params![name, backend],
            )?;
        }
        None => {
            tx.execute(
                "DELETE FROM speaker_centroids
                 WHERE embedding_model_id IN
                       (SELECT id FROM embedding_models WHERE backend = ?1)",
                params![backend],
            )?;
        }
    }

    let group_count = groups.len();
    let mut centroids_written = 0usize;
    for g in groups {
        if let Some((model_row_id, record)) = g.into_centroid(&short_names, &specs) {
            tx.execute(
                "INSERT INTO speaker_centroids
                 (speaker_name, sample_type, short_name, representative_sample_file,
                  sample_count, sample_dates, centroid, embedding_model_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.speaker_name,
                    record.sample_type.as_str(),
                    record.short_name,
                    record.representative_sample_file,
                    record.sample_count as i64,
                    dates_to_json(&record.sample_dates),
                    vector_to_blob(&record.centroid),
                    model_row_id,
                ],
            )?;
            centroids_written += 1;
        }
    }

    Ok(RebuildReport {
        sample_rows,
        group_count,
        centroids_written,
    })
}

fn upsert_centroid_in_tx(
    conn: &Connection,
    centroid: &CentroidRecord,
) -> Result<(), VoiceDbError> {
    let model_row_id = resolve_model(conn, &centroid.model)?;
    if centroid.centroid.len() != centroid.model.embedding_dim {
        return Err(VoiceDbError::DimensionMismatch {
            expected: centroid.model.embedding_dim,
            got: centroid.centroid.len(),
        });
    }
    conn.execute(
        "INSERT INTO speaker_centroids
         (speaker_name, sample_type, short_name, representative_sample_file,
          sample_count, sample_dates, centroid, embedding_model_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(speaker_name, sample_type, embedding_model_id) DO UPDATE SET
             short_name = excluded.short_name,
             representative_sample_file = excluded.representative_sample_file,
             sample_count = excluded.sample_count,
             sample_dates = excluded.sample_dates,
             centroid = excluded.centroid,
             updated_at = datetime('now')",
        params![
            centroid.speaker_name,
            centroid.sample_type.as_str(),
            centroid.short_name,
            centroid.representative_sample_file,
            centroid.sample_count as i64,
            dates_to_json(&centroid.sample_dates),
            vector_to_blob(&centroid.centroid),
            model_row_id,
        ],
    )?;
    Ok(())
}

impl VoiceStore for SqliteStore {
    fn upsert_sample(&self, sample: &NewSample) -> Result<StoredSample, VoiceDbError> {
        if sample.embedding.len() != sample.model.embedding_dim {
            return Err(VoiceDbError::DimensionMismatch {
                expected: sample.model.embedding_dim,
                got: sample.embedding.len(),
            });
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let model_row_id = resolve_model(&tx, &sample.model)?;
        let key = sample.sample_key();
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM voice_samples WHERE sample_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        let blob = vector_to_blob(&sample.embedding);
        let norm = l2_norm(&sample.embedding) as f64;
        let date = sample.sample_date.map(|d| d.to_string());

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE voice_samples SET
                         embedding = ?1, vector_norm = ?2, transcript_text = ?3,
                         sample_date = ?4, source = ?5, embedding_model_id = ?6
                     WHERE id = ?7",
                    params![
                        blob,
                        norm,
                        sample.transcript_text,
                        date,
                        sample.source.as_str(),
                        model_row_id,
                        id
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO voice_samples
                     (sample_key, speaker_name, sample_type, episode_id, segment_idx,
                      file_path, transcript_text, sample_date, start_time, end_time,
                      source, embedding_model_id, embedding, vector_norm)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        key,
                        sample.speaker_name,
                        sample.sample_type.as_str(),
                        sample.episode_id,
                        sample.segment_idx,
                        sample.file_path,
                        sample.transcript_text,
                        date,
                        sample.start_time,
                        sample.end_time,
                        sample.source.as_str(),
                        model_row_id,
                        blob,
                        norm
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };
        let created = existing.is_none();
        tx.commit()?;
        Ok(StoredSample {
            id: Some(id),
            sample_key: key,
            created,
        })
    }

    fn upsert_centroid(&self, centroid: &CentroidRecord) -> Result<(), VoiceDbError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        upsert_centroid_in_tx(&tx, centroid)?;
        tx.commit()?;
        Ok(())
    }

    fn load_centroids(
        &self,
        backend: &str,
        sample_type: SampleType,
    ) -> Result<BTreeMap<String, CentroidRecord>, VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.speaker_name, c.sample_type, c.short_name,
                    c.representative_sample_file, c.sample_count, c.sample_dates,
                    c.centroid,
                    m.backend, m.model_id, m.embedding_dim, m.dtype, m.version_tag
             FROM speaker_centroids c
             JOIN embedding_models m ON m.id = c.embedding_model_id
             WHERE m.backend = ?1 AND m.active = 1 AND c.sample_type = ?2
             ORDER BY c.speaker_name, m.id",
        )?;
        type Raw = (
            String,
            String,
            String,
            Option<String>,
            i64,
            String,
            Vec<u8>,
            String,
            String,
            i64,
            String,
            String,
        );
        let rows = stmt.query_map(params![backend, sample_type.as_str()], |row| {
            Ok::<Raw, _>((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
            ))
        })?;

        let mut out = BTreeMap::new();
        for r in rows {
            let (name, type_raw, short, rep, count, dates_raw, blob, be, mid, dim, dtype, tag) = r?;
            // Later rows belong to newer model rows; last one wins.
            out.insert(
                name.clone(),
                CentroidRecord {
                    speaker_name: name,
                    sample_type: type_raw.parse()?,
                    short_name: short,
                    representative_sample_file: rep,
                    sample_count: count as u32,
                    sample_dates: dates_from_json(&dates_raw),
                    centroid: blob_to_vector(&blob),
                    model: EmbeddingModelSpec {
                        backend: be,
                        model_id: mid,
                        embedding_dim: dim as usize,
                        dtype,
                        version_tag: tag,
                    },
                },
            );
        }
        Ok(out)
    }

    fn replace_centroids(
        &self,
        backend: &str,
        centroids: &[CentroidRecord],
    ) -> Result<(), VoiceDbError> {
        for c in centroids {
            if c.model.backend != backend {
                return Err(VoiceDbError::BackendMismatch {
                    requested: backend.to_string(),
                    found: c.model.backend.clone(),
                });
            }
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM speaker_centroids
             WHERE embedding_model_id IN
                   (SELECT id FROM embedding_models WHERE backend = ?1)",
            params![backend],
        )?;
        for c in centroids {
            upsert_centroid_in_tx(&tx, c)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn import_centroids_missing_only(
        &self,
        centroids: &[CentroidRecord],
    ) -> Result<usize, VoiceDbError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut added = 0usize;
        for c in centroids {
            let model_row_id = resolve_model(&tx, &c.model)?;
            let changed = tx.execute(
                "INSERT INTO speaker_centroids
                 (speaker_name, sample_type, short_name, representative_sample_file,
                  sample_count, sample_dates, centroid, embedding_model_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(speaker_name, sample_type, embedding_model_id) DO NOTHING",
                params![
                    c.speaker_name,
                    c.sample_type.as_str(),
                    c.short_name,
                    c.representative_sample_file,
                    c.sample_count as i64,
                    dates_to_json(&c.sample_dates),
                    vector_to_blob(&c.centroid),
                    model_row_id,
                ],
            )?;
            added += changed;
        }
        tx.commit()?;
        Ok(added)
    }

    fn rebuild_centroids_from_samples(&self, backend: &str) -> Result<RebuildReport, VoiceDbError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let report = rebuild_in_tx(&tx, backend, None)?;
        tx.commit()?;
        tracing::info!(
            backend,
            sample_rows = report.sample_rows,
            centroids = report.centroids_written,
            "rebuilt centroids from samples"
        );
        Ok(report)
    }

    fn rebuild_speaker(&self, backend: &str, speaker: &str) -> Result<RebuildReport, VoiceDbError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let report = rebuild_in_tx(&tx, backend, Some(speaker))?;
        tx.commit()?;
        Ok(report)
    }

    fn verify_integrity(&self, backend: &str) -> Result<IntegrityReport, VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        let mut issues = Vec::new();

        // Samples whose model row is gone entirely.
        {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.sample_key
                 FROM voice_samples s
                 LEFT JOIN embedding_models m ON m.id = s.embedding_model_id
                 WHERE m.id IS NULL",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for r in rows {
                let (sample_id, sample_key) = r?;
                issues.push(IntegrityIssue::OrphanedSample {
                    sample_id,
                    sample_key,
                });
            }
        }

        // Per-sample checks: vector width, referenced file present.
        let mut samples_checked = 0usize;
        {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.speaker_name, s.file_path, length(s.embedding), m.embedding_dim
                 FROM voice_samples s
                 JOIN embedding_models m ON m.id = s.embedding_model_id
                 WHERE m.backend = ?1",
            )?;
            let rows = stmt.query_map(params![backend], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;
            for r in rows {
                let (sample_id, speaker, file_path, blob_len, dim) = r?;
                samples_checked += 1;
                let expected_len = dim as usize * 4;
                if blob_len as usize != expected_len {
                    issues.push(IntegrityIssue::CorruptVector {
                        sample_id,
                        expected_len,
                        got_len: blob_len as usize,
                    });
                }
                if let Some(path) = file_path {
                    if !Path::new(&path).exists() {
                        issues.push(IntegrityIssue::MissingFile {
                            speaker_name: speaker.clone(),
                            path,
                        });
                    }
                }
            }
        }

        // Speakers with samples but no centroid.
        {
            let mut stmt = conn.prepare(
                "SELECT s.speaker_name, s.sample_type, COUNT(*)
                 FROM voice_samples s
                 JOIN embedding_models m ON m.id = s.embedding_model_id
                 LEFT JOIN speaker_centroids c
                   ON c.speaker_name = s.speaker_name
                  AND c.sample_type = s.sample_type
                  AND c.embedding_model_id = s.embedding_model_id
                 WHERE m.backend = ?1 AND c.id IS NULL
                 GROUP BY s.speaker_name, s.sample_type, s.embedding_model_id",
            )?;
            let rows = stmt.query_map(params![backend], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for r in rows {
                let (speaker_name, type_raw, count) = r?;
                issues.push(IntegrityIssue::MissingCentroid {
                    speaker_name,
                    sample_type: type_raw.parse()?,
                    sample_count: count as u32,
                });
            }
        }

        // Centroid vector widths.
        let mut centroids_checked = 0usize;
        {
            let mut stmt = conn.prepare(
                "SELECT c.speaker_name, length(c.centroid), m.embedding_dim
                 FROM speaker_centroids c
                 JOIN embedding_models m ON m.id = c.embedding_model_id
                 WHERE m.backend = ?1",
            )?;
            let rows = stmt.query_map(params![backend], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for r in rows {
                let (speaker_name, blob_len, dim) = r?;
                centroids_checked += 1;
                if blob_len as usize != dim as usize * 4 {
                    issues.push(IntegrityIssue::CorruptCentroid {
                        speaker_name,
                        expected_dim: dim as usize,
                        got_dim: blob_len as usize / 4,
                    });
                }
            }
        }

        Ok(IntegrityReport {
            samples_checked,
            centroids_checked,
            issues,
        })
    }

    fn list_speakers(
        &self,
        backend: &str,
        sample_type: SampleType,
    ) -> Result<Vec<SpeakerSummary>, VoiceDbError> {
        let map = self.load_centroids(backend, sample_type)?;
        Ok(map
            .into_values()
            .map(|c| SpeakerSummary {
                name: c.speaker_name,
                short_name: c.short_name,
                sample_count: c.sample_count,
                sample_file: c.representative_sample_file,
            })
            .collect())
    }

    fn remove_speaker(&self, backend: &str, speaker: &str) -> Result<RemovedSpeaker, VoiceDbError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let samples_deleted = tx.execute(
            "DELETE FROM voice_samples
             WHERE speaker_name = ?1
               AND embedding_model_id IN
                   (SELECT id FROM embedding_models WHERE backend = ?2)",
            params![speaker, backend],
        )?;
        let centroids_deleted = tx.execute(
            "DELETE FROM speaker_centroids
             WHERE speaker_name = ?1
               AND embedding_model_id IN
                   (SELECT id FROM embedding_models WHERE backend = ?2)",
            params![speaker, backend],
        )?;
        tx.commit()?;
        Ok(RemovedSpeaker {
            samples_deleted,
            centroids_deleted,
        })
    }

    fn samples_for_speaker(
        &self,
        backend: &str,
        speaker: &str,
    ) -> Result<Vec<SampleInfo>, VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.sample_key, s.speaker_name, s.sample_type, s.episode_id,
                    s.segment_idx, s.file_path, s.transcript_text, s.sample_date,
                    s.start_time, s.end_time, s.source, s.rating
             FROM voice_samples s
             JOIN embedding_models m ON m.id = s.embedding_model_id
             WHERE m.backend = ?1 AND s.speaker_name = ?2
             ORDER BY s.id",
        )?;
        type Raw = (
            i64,
            String,
            String,
            String,
            Option<i64>,
            Option<i64>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<f64>,
            Option<f64>,
            String,
            i64,
        );
        let rows = stmt.query_map(params![backend, speaker], |row| {
            Ok::<Raw, _>((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, key, name, type_raw, ep, seg, file, text, date, start, end, src, rating) = r?;
            out.push(SampleInfo {
                id,
                sample_key: key,
                speaker_name: name,
                sample_type: type_raw.parse()?,
                episode_id: ep,
                segment_idx: seg,
                file_path: file,
                transcript_text: text,
                sample_date: date.and_then(|d| d.parse().ok()),
                start_time: start,
                end_time: end,
                source: src.parse()?,
                rating: rating as i32,
            });
        }
        Ok(out)
    }

    fn set_sample_rating(&self, sample_id: i64, rating: i32) -> Result<(), VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE voice_samples SET rating = ?1 WHERE id = ?2",
            params![rating, sample_id],
        )?;
        if changed == 0 {
            return Err(VoiceDbError::SampleNotFound(sample_id));
        }
        Ok(())
    }

    fn delete_sample(&self, sample_id: i64) -> Result<Option<String>, VoiceDbError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let speaker: Option<String> = tx
            .query_row(
                "SELECT speaker_name FROM voice_samples WHERE id = ?1",
                params![sample_id],
                |row| row.get(0),
            )
            .optional()?;
        if speaker.is_some() {
            tx.execute("DELETE FROM voice_samples WHERE id = ?1", params![sample_id])?;
        }
        tx.commit()?;
        Ok(speaker)
    }

    fn delete_samples_by_source(
        &self,
        backend: &str,
        source: SampleSource,
    ) -> Result<usize, VoiceDbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM voice_samples
             WHERE source = ?1
               AND embedding_model_id IN
                   (SELECT id FROM embedding_models WHERE backend = ?2)",
            params![source.as_str(), backend],
        )?;
        Ok(deleted)
    }
}
