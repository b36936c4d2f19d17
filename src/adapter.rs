//! Writes discovered target groups to a Prometheus file_sd file.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::discovery::TargetGroup;
use crate::error::ResultOkLogExt;
use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to serialize target groups: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error(transparent)]
    Write(#[from] fsutil::FileWriteError),
}

/// One entry of a file_sd file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileSdGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl From<&TargetGroup> for FileSdGroup {
    fn from(value: &TargetGroup) -> Self {
        Self {
            targets: value.targets.clone(),
            labels: value.labels.clone(),
        }
    }
}

/// Renders a batch in the file_sd JSON shape.
pub fn render(batch: &[TargetGroup]) -> Result<Vec<u8>, Error> {
    let groups: Vec<FileSdGroup> = batch.iter().map(FileSdGroup::from).collect();
    let mut out = serde_json::to_vec_pretty(&groups).map_err(Error::Serialize)?;
    out.push(b'\n');
    Ok(out)
}

/// Consumes target group batches and persists each one to `output`.
#[derive(Debug, Clone)]
pub struct Adapter {
    output: PathBuf,
}

impl Adapter {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Atomically replaces the output file with `batch`.
    pub fn write(&self, batch: &[TargetGroup]) -> Result<(), Error> {
        let rendered = render(batch)?;
        fsutil::write_atomic(&self.output, &rendered)?;
        log::debug!(
            "Wrote {} target groups to `{}`",
            batch.len(),
            self.output.display()
        );
        Ok(())
    }

    /// Writes every received batch until the channel is closed.
    ///
    /// Failed writes are logged; the previous file content stays in place.
    pub async fn run(self, mut rx: mpsc::Receiver<Vec<TargetGroup>>) {
        while let Some(batch) = rx.recv().await {
            self.write(&batch).ok_log();
        }
        log::debug!("Target group channel closed, adapter stopped");
    }
}
