//! CSV policy file adapter
//!
//! One row per line, the definition name first:
//!
//! ```text
//! p, alice, data1, read
//! g, alice, data2_admin
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{load_policy_line, policy_lines, Adapter, Filter};
use crate::error::{AdapterError, Result};
use crate::model::Model;

/// Whole-file adapter. Incremental operations are not supported; use
/// `save_policy` to persist.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
    is_filtered: bool,
}

impl FileAdapter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            is_filtered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse file contents into persisted lines
    fn parse(text: &str) -> std::result::Result<Vec<Vec<String>>, AdapterError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());

        let mut lines = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line: Vec<String> = record.iter().map(str::to_string).collect();
            if line.iter().all(String::is_empty) {
                continue;
            }
            if line.len() < 2 {
                return Err(AdapterError::Parse {
                    line: record.position().map_or(0, |p| p.line() as usize),
                    msg: "expected a definition name followed by at least one field".to_string(),
                });
            }
            lines.push(line);
        }
        Ok(lines)
    }

    async fn read_lines(&self) -> Result<Vec<Vec<String>>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(AdapterError::from)?;
        Ok(Self::parse(&text)?)
    }
}

#[async_trait]
impl Adapter for FileAdapter {
    async fn load_policy(&mut self, m: &mut Model) -> Result<()> {
        let lines = self.read_lines().await?;
        let count = lines.len();
        for line in lines {
            load_policy_line(line, m)?;
        }
        self.is_filtered = false;
        info!(path = %self.path.display(), rows = count, "Loaded policy file");
        Ok(())
    }

    async fn load_filtered_policy(&mut self, m: &mut Model, filter: Filter) -> Result<()> {
        let lines = self.read_lines().await?;
        for line in lines.into_iter().filter(|line| filter.accepts(line)) {
            load_policy_line(line, m)?;
        }
        self.is_filtered = true;
        debug!(path = %self.path.display(), ?filter, "Loaded filtered policy file");
        Ok(())
    }

    async fn save_policy(&mut self, m: &Model) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(Vec::new());
        for line in policy_lines(m) {
            writer.write_record(&line).map_err(AdapterError::from)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AdapterError::Io(e.into_error()))?;

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(AdapterError::from)?;
        info!(path = %self.path.display(), "Saved policy file");
        Ok(())
    }

    async fn clear_policy(&mut self) -> Result<()> {
        tokio::fs::write(&self.path, b"")
            .await
            .map_err(AdapterError::from)?;
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.is_filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let text = "p, alice, data1, read\n\n# comment\ng,  alice , admin\n";
        let lines = FileAdapter::parse(text).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], vec!["g", "alice", "admin"]);
    }

    #[test]
    fn test_parse_rejects_bare_names() {
        let err = FileAdapter::parse("p, alice, data1, read\np\n").unwrap_err();
        assert!(matches!(err, AdapterError::Parse { line: 2, .. }));
    }
}
