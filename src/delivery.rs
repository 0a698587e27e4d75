//! Artifact delivery: where rendered documents go once a row succeeds.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::binder::{InputMap, ID_FIELD};
use crate::error::RenderError;

/// One rendered document and its suggested download name
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// 1-based row number in the input
    pub row: usize,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// `diploma_<id>.pdf`; an empty id gives `diploma_.pdf`.
pub fn suggested_file_name(inputs: &InputMap) -> String {
    format!("diploma_{}.pdf", inputs.get(ID_FIELD))
}

pub trait ArtifactSink {
    fn deliver(&mut self, artifact: &Artifact) -> Result<(), RenderError>;
}

/// Writes artifacts into a directory, creating it on first delivery.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in delivery order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&mut self, artifact: &Artifact) -> Result<(), RenderError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| RenderError::Delivery(format!("{}: {}", self.dir.display(), e)))?;

        // The id comes from user data; keep it from escaping the directory
        let path = self.dir.join(sanitize_filename::sanitize(&artifact.file_name));
        if path.exists() {
            debug!("Overwriting {}", path.display());
        }

        std::fs::write(&path, &artifact.bytes)
            .map_err(|e| RenderError::Delivery(format!("{}: {}", path.display(), e)))?;

        info!("Wrote {} ({} bytes)", path.display(), artifact.bytes.len());
        self.written.push(path);
        Ok(())
    }
}

/// Keeps artifacts in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub artifacts: Vec<Artifact>,
}

impl ArtifactSink for MemorySink {
    fn deliver(&mut self, artifact: &Artifact) -> Result<(), RenderError> {
        self.artifacts.push(artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(file_name: &str) -> Artifact {
        Artifact {
            row: 1,
            file_name: file_name.to_string(),
            bytes: b"%PDF-1.3".to_vec(),
        }
    }

    #[test]
    fn test_suggested_file_name() {
        let mut inputs = InputMap::default();
        assert_eq!(suggested_file_name(&inputs), "diploma_.pdf");

        inputs.insert(ID_FIELD, "17");
        assert_eq!(suggested_file_name(&inputs), "diploma_17.pdf");
    }

    #[test]
    fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out"));

        sink.deliver(&artifact("diploma_1.pdf")).unwrap();

        let path = dir.path().join("out").join("diploma_1.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.3");
        assert_eq!(sink.written(), &[path]);
    }

    #[test]
    fn test_directory_sink_keeps_files_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());

        sink.deliver(&artifact("diploma_../../etc.pdf")).unwrap();

        let written = &sink.written()[0];
        assert_eq!(written.parent().unwrap(), dir.path());
    }
}
