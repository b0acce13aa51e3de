use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Class names backed by a JSON array on disk. The file is read on every
/// `resolve` so edits apply without a restart.
#[derive(Debug, Clone)]
pub struct LabelSource {
    path: PathBuf,
}

impl LabelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LabelSource { path: path.into() }
    }

    /// Falls back to `"0".."N-1"` (N = `output_width`, or 1 when unknown) if
    /// the file is missing or is not an array of strings.
    pub fn resolve(&self, output_width: Option<usize>) -> Vec<String> {
        match self.read() {
            Ok(Some(names)) => names,
            Ok(None) => numeric_labels(output_width.unwrap_or(1)),
            Err(reason) => {
                log::warn!(
                    "Ignoring class names at {}: {}",
                    self.path.display(),
                    reason
                );
                numeric_labels(output_width.unwrap_or(1))
            }
        }
    }

    fn read(&self) -> Result<Option<Vec<String>>, String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("read failed: {}", e)),
        };
        serde_json::from_str::<Vec<String>>(&contents)
            .map(Some)
            .map_err(|e| format!("expected a JSON array of strings: {}", e))
    }
}

pub fn numeric_labels(count: usize) -> Vec<String> {
    (0..count).map(|i| i.to_string()).collect()
}
