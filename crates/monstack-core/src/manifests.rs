//! Manifest groups
//!
//! A [`ConfigGroupSpec`] names raw Kubernetes manifests by glob pattern.
//! Every YAML document in every matched file becomes one independent object
//! to apply.

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Manifest files to apply as independent objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigGroupSpec {
    files: Vec<String>,
    base_dir: Option<PathBuf>,
}

impl ConfigGroupSpec {
    pub fn new(files: Vec<String>) -> Self {
        Self {
            files,
            base_dir: None,
        }
    }

    /// Resolve relative patterns against `dir` instead of the working directory
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Expand every pattern into the sorted list of matching files
    ///
    /// A pattern that matches nothing is not an error.
    pub fn expand(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for pattern in &self.files {
            let full = match &self.base_dir {
                Some(dir) if Path::new(pattern).is_relative() => {
                    dir.join(pattern).to_string_lossy().into_owned()
                }
                _ => pattern.clone(),
            };

            let entries = glob::glob(&full).map_err(|e| CoreError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;

            let mut matched: Vec<PathBuf> = entries
                .filter_map(|entry| match entry {
                    Ok(path) if path.is_file() => Some(path),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable manifest path");
                        None
                    }
                })
                .collect();
            matched.sort();

            if matched.is_empty() {
                tracing::warn!(pattern = %pattern, "manifest pattern matched no files");
            }
            paths.extend(matched);
        }

        paths.dedup();
        Ok(paths)
    }

    /// Read and parse every document of every matched file
    pub fn load_documents(&self) -> Result<Vec<ManifestDocument>> {
        let mut documents = Vec::new();
        for path in self.expand()? {
            let content = std::fs::read_to_string(&path)?;
            documents.extend(parse_documents(&path, &content)?);
        }
        Ok(documents)
    }
}

/// One object out of a manifest file
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    /// File the document came from
    pub source: PathBuf,
    /// Position of the document within its file
    pub index: usize,
    pub object: JsonValue,
}

impl ManifestDocument {
    pub fn api_version(&self) -> Option<&str> {
        self.object.get("apiVersion").and_then(JsonValue::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.object.get("kind").and_then(JsonValue::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.object
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(JsonValue::as_str)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.object
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(JsonValue::as_str)
    }

    /// `Kind/name`, or `namespace/Kind/name` when namespaced
    pub fn display_name(&self) -> String {
        let kind = self.kind().unwrap_or("Unknown");
        let name = self.name().unwrap_or("unnamed");
        match self.namespace() {
            Some(ns) => format!("{}/{}/{}", ns, kind, name),
            None => format!("{}/{}", kind, name),
        }
    }
}

/// Split a multi-document YAML file and parse each non-empty document
pub fn parse_documents(source: &Path, content: &str) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();

    for (index, doc) in split_documents(content).into_iter().enumerate() {
        // Comment-only documents carry no object
        if doc
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let object: JsonValue = serde_yaml::from_str(doc).map_err(|e| CoreError::InvalidManifest {
            path: source.display().to_string(),
            message: format!("document {}: {}", index, e),
        })?;

        if object.get("apiVersion").is_none() || object.get("kind").is_none() {
            return Err(CoreError::InvalidManifest {
                path: source.display().to_string(),
                message: format!("document {} is missing apiVersion or kind", index),
            });
        }

        documents.push(ManifestDocument {
            source: source.to_path_buf(),
            index,
            object,
        });
    }

    Ok(documents)
}

/// Split on `---` separator lines
fn split_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            docs.push(&content[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&content[start..]);

    docs.into_iter().filter(|d| !d.trim().is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SERVICE_MONITOR: &str = r#"apiVersion: monitoring.coreos.com/v1
kind: ServiceMonitor
metadata:
  name: statsd
  namespace: prometheus
spec:
  endpoints:
    - port: http
"#;

    #[test]
    fn test_split_multi_document() {
        let content = format!("---\n{}---\n# only a comment\n---\n{}", SERVICE_MONITOR, SERVICE_MONITOR);
        let docs = parse_documents(Path::new("sm.yaml"), &content).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].kind(), Some("ServiceMonitor"));
        assert_eq!(docs[0].display_name(), "prometheus/ServiceMonitor/statsd");
    }

    #[test]
    fn test_separator_inside_value_is_not_a_split() {
        let content = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: banner\ndata:\n  text: \"a---b\"\n";
        let docs = parse_documents(Path::new("cm.yaml"), content).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].object["data"]["text"], "a---b");
    }

    #[test]
    fn test_document_without_kind_rejected() {
        let err = parse_documents(Path::new("bad.yaml"), "metadata:\n  name: x\n").unwrap_err();
        assert!(err.to_string().contains("missing apiVersion or kind"));
    }

    #[test]
    fn test_expand_relative_to_base_dir() {
        let dir = TempDir::new().unwrap();
        let manifests = dir.path().join("manifests");
        fs::create_dir(&manifests).unwrap();
        fs::write(manifests.join("b.yaml"), SERVICE_MONITOR).unwrap();
        fs::write(manifests.join("a.yaml"), SERVICE_MONITOR).unwrap();
        fs::write(manifests.join("notes.txt"), "ignored").unwrap();

        let spec = ConfigGroupSpec::new(vec!["manifests/*.yaml".to_string()])
            .with_base_dir(dir.path());
        let paths = spec.expand().unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.yaml"));
        assert_eq!(spec.load_documents().unwrap().len(), 2);
    }

    #[test]
    fn test_expand_no_match_is_empty() {
        let dir = TempDir::new().unwrap();
        let spec = ConfigGroupSpec::new(vec!["manifests/*.yaml".to_string()])
            .with_base_dir(dir.path());
        assert!(spec.expand().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let spec = ConfigGroupSpec::new(vec!["manifests/[.yaml".to_string()]);
        assert!(matches!(spec.expand(), Err(CoreError::InvalidPattern { .. })));
    }
}
