//! Built-in format handlers

use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{FormatHandler, Payload};
use crate::error::StoreError;

/// Collect part files under a dataset directory with one of the given
/// extensions, sorted by file name for deterministic ordering.
fn dataset_parts(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, StoreError> {
    let mut parts = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
            {
                parts.push(path);
            }
        }
    }
    parts.sort();
    Ok(parts)
}

/// JSON documents via serde_json
pub struct JsonHandler;

impl FormatHandler for JsonHandler {
    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    fn handles_payload(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Json(_))
    }

    fn read_from_file(&self, path: &Path) -> Result<Payload, StoreError> {
        let data = std::fs::read(path)?;
        Ok(Payload::Json(serde_json::from_slice(&data)?))
    }

    fn write_to_file(&self, payload: &Payload, path: &Path) -> Result<(), StoreError> {
        let value = match payload {
            Payload::Json(value) => value.clone(),
            Payload::Text(text) => serde_json::Value::String(text.clone()),
            Payload::Bytes(_) => {
                return Err(StoreError::FormatNotSupported(
                    "raw bytes cannot be encoded as JSON".to_string(),
                ))
            }
        };
        std::fs::write(path, serde_json::to_vec_pretty(&value)?)?;
        Ok(())
    }

    fn read_dataset(&self, dir: &Path) -> Result<Payload, StoreError> {
        let mut docs = Vec::new();
        for part in dataset_parts(dir, self.extensions())? {
            let data = std::fs::read(&part)?;
            docs.push(serde_json::from_slice(&data)?);
        }
        Ok(Payload::Json(serde_json::Value::Array(docs)))
    }
}

/// YAML documents, decoded into the same document model as JSON
pub struct YamlHandler;

impl FormatHandler for YamlHandler {
    fn extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }

    fn handles_payload(&self, _payload: &Payload) -> bool {
        // JSON handler owns document payloads; YAML is extension-selected only
        false
    }

    fn read_from_file(&self, path: &Path) -> Result<Payload, StoreError> {
        let data = std::fs::read(path)?;
        Ok(Payload::Json(serde_yaml::from_slice(&data)?))
    }

    fn write_to_file(&self, payload: &Payload, path: &Path) -> Result<(), StoreError> {
        let value = match payload {
            Payload::Json(value) => value.clone(),
            Payload::Text(text) => serde_json::Value::String(text.clone()),
            Payload::Bytes(_) => {
                return Err(StoreError::FormatNotSupported(
                    "raw bytes cannot be encoded as YAML".to_string(),
                ))
            }
        };
        std::fs::write(path, serde_yaml::to_string(&value)?)?;
        Ok(())
    }

    fn read_dataset(&self, dir: &Path) -> Result<Payload, StoreError> {
        let mut docs = Vec::new();
        for part in dataset_parts(dir, self.extensions())? {
            let data = std::fs::read(&part)?;
            docs.push(serde_yaml::from_slice(&data)?);
        }
        Ok(Payload::Json(serde_json::Value::Array(docs)))
    }
}

/// Plain text files
pub struct TextHandler;

impl FormatHandler for TextHandler {
    fn extensions(&self) -> &[&str] {
        &["txt", "text", "md", "log"]
    }

    fn handles_payload(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Text(_))
    }

    fn read_from_file(&self, path: &Path) -> Result<Payload, StoreError> {
        Ok(Payload::Text(std::fs::read_to_string(path)?))
    }

    fn write_to_file(&self, payload: &Payload, path: &Path) -> Result<(), StoreError> {
        let text = match payload {
            Payload::Text(text) => text.clone(),
            Payload::Json(value) => value.to_string(),
            Payload::Bytes(_) => {
                return Err(StoreError::FormatNotSupported(
                    "raw bytes cannot be encoded as text".to_string(),
                ))
            }
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    fn read_dataset(&self, dir: &Path) -> Result<Payload, StoreError> {
        let mut chunks = Vec::new();
        for part in dataset_parts(dir, self.extensions())? {
            chunks.push(std::fs::read_to_string(&part)?);
        }
        Ok(Payload::Text(chunks.join("\n")))
    }
}

/// Raw bytes, no interpretation
pub struct BytesHandler;

impl FormatHandler for BytesHandler {
    fn extensions(&self) -> &[&str] {
        &["bin", "dat", "bytes"]
    }

    fn handles_payload(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Bytes(_))
    }

    fn read_from_file(&self, path: &Path) -> Result<Payload, StoreError> {
        Ok(Payload::Bytes(Bytes::from(std::fs::read(path)?)))
    }

    fn write_to_file(&self, payload: &Payload, path: &Path) -> Result<(), StoreError> {
        match payload {
            Payload::Bytes(data) => std::fs::write(path, data)?,
            Payload::Text(text) => std::fs::write(path, text.as_bytes())?,
            Payload::Json(value) => std::fs::write(path, serde_json::to_vec(value)?)?,
        }
        Ok(())
    }

    fn read_dataset(&self, dir: &Path) -> Result<Payload, StoreError> {
        let mut combined = Vec::new();
        for part in dataset_parts(dir, self.extensions())? {
            combined.extend_from_slice(&std::fs::read(&part)?);
        }
        Ok(Payload::Bytes(Bytes::from(combined)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_handler_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let payload = Payload::Json(serde_json::json!({"x": 1, "y": [1, 2, 3]}));

        JsonHandler.write_to_file(&payload, &path).unwrap();
        let back = JsonHandler.read_from_file(&path).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_json_handler_rejects_bytes_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let payload = Payload::Bytes(Bytes::from_static(b"\x00"));

        let result = JsonHandler.write_to_file(&payload, &path);
        assert!(matches!(result, Err(StoreError::FormatNotSupported(_))));
    }

    #[test]
    fn test_json_handler_read_invalid_document_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(JsonHandler.read_from_file(&path).is_err());
    }

    #[test]
    fn test_yaml_handler_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.yaml");
        let payload = Payload::Json(serde_json::json!({"name": "atlas", "count": 2}));

        YamlHandler.write_to_file(&payload, &path).unwrap();
        let back = YamlHandler.read_from_file(&path).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_text_handler_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        let payload = Payload::Text("line one\nline two".to_string());

        TextHandler.write_to_file(&payload, &path).unwrap();
        assert_eq!(TextHandler.read_from_file(&path).unwrap(), payload);
    }

    #[test]
    fn test_bytes_handler_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        let payload = Payload::Bytes(Bytes::from_static(b"\x00\x01\x02\xff"));

        BytesHandler.write_to_file(&payload, &path).unwrap();
        assert_eq!(BytesHandler.read_from_file(&path).unwrap(), payload);
    }

    #[test]
    fn test_json_dataset_reads_parts_in_name_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("part-0.json"), br#"{"n": 0}"#).unwrap();
        std::fs::write(dir.path().join("part-1.json"), br#"{"n": 1}"#).unwrap();
        // non-matching extensions are skipped
        std::fs::write(dir.path().join("_SUCCESS"), b"").unwrap();

        let payload = JsonHandler.read_dataset(dir.path()).unwrap();
        assert_eq!(
            payload,
            Payload::Json(serde_json::json!([{"n": 0}, {"n": 1}]))
        );
    }

    #[test]
    fn test_json_dataset_recurses_into_subdirectories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/part.json"), br#"{"deep": true}"#).unwrap();

        let payload = JsonHandler.read_dataset(dir.path()).unwrap();
        assert_eq!(payload, Payload::Json(serde_json::json!([{"deep": true}])));
    }

    #[test]
    fn test_text_dataset_concatenates_parts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();

        let payload = TextHandler.read_dataset(dir.path()).unwrap();
        assert_eq!(payload, Payload::Text("alpha\nbeta".to_string()));
    }
}
