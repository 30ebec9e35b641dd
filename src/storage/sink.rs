use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cli::config::OutputSettings;
use crate::crawler::record::CandidateRecord;

/// Destination for the records of a finished run
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, records: &[CandidateRecord]) -> Result<()>;
}

/// Header row plus one quoted row per record
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub fn to_csv(records: &[CandidateRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(CandidateRecord::COLUMNS)
        .context("Failed to write CSV header")?;
    for record in records {
        writer
            .serialize(record)
            .context(format!("Failed to write CSV row for candidate {}", record.id))?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e))
}

#[async_trait]
impl ResultSink for CsvSink {
    async fn persist(&self, records: &[CandidateRecord]) -> Result<()> {
        let contents = to_csv(records)?;
        write_file(&self.path, &contents).await?;

        info!("Saved {} candidates to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Pretty-printed JSON array with non-ASCII text kept as is
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultSink for JsonSink {
    async fn persist(&self, records: &[CandidateRecord]) -> Result<()> {
        let contents = serde_json::to_vec_pretty(records).context("Failed to serialize candidates")?;
        write_file(&self.path, &contents).await?;

        info!("Saved {} candidates to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Writes the same records to every configured sink
pub struct FileSink {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl FileSink {
    pub fn from_settings(settings: &OutputSettings) -> Self {
        Self {
            sinks: vec![
                Box::new(CsvSink::new(settings.directory.join(&settings.csv_file))),
                Box::new(JsonSink::new(settings.directory.join(&settings.json_file))),
            ],
        }
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, records: &[CandidateRecord]) -> Result<()> {
        for sink in &self.sinks {
            sink.persist(records).await?;
        }
        Ok(())
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    tokio::fs::write(path, contents)
        .await
        .context(format!("Failed to write output file: {}", path.display()))?;

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}
