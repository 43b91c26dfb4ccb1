use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonStyle {
    Compact,
    /// Pretty printed with the given number of spaces per level
    Pretty(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Couldn't encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Couldn't write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Encodes `value` as UTF-8 JSON, non-ASCII characters are kept as is.
pub fn to_json_bytes<T>(value: &T, style: JsonStyle) -> Result<Vec<u8>, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    match style {
        JsonStyle::Compact => serde_json::to_vec(value),
        JsonStyle::Pretty(width) => {
            let indent = " ".repeat(width);
            let mut buf = Vec::new();
            let mut ser =
                Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
            value.serialize(&mut ser)?;
            Ok(buf)
        }
    }
}

/// Writes `value` to `path`, nothing is written when encoding fails.
pub fn write_json<T>(path: &Path, value: &T, style: JsonStyle) -> Result<(), WriteError>
where
    T: Serialize + ?Sized,
{
    let bytes = to_json_bytes(value, style)?;
    fs::write(path, bytes).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn output_file_name(index: usize) -> String {
    format!("test{index}.json")
}

/// Writes the payload of the link at `index` into `dir`, returns the written path.
pub fn write_output<T>(dir: &Path, index: usize, payload: &T) -> Result<PathBuf, WriteError>
where
    T: Serialize + ?Sized,
{
    let path = dir.join(output_file_name(index));
    write_json(&path, payload, JsonStyle::Pretty(4))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn non_ascii_is_not_escaped() {
        let bytes = to_json_bytes(&json!({"name": "José Peñalosa"}), JsonStyle::Compact).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"name":"José Peñalosa"}"#
        );
    }

    #[test]
    fn pretty_uses_requested_indent() {
        let bytes = to_json_bytes(&json!({"title": "A"}), JsonStyle::Pretty(4)).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\n    \"title\": \"A\"\n}"
        );
    }

    #[test]
    fn output_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!([{"title": "Café Noir — Shark Week", "tags": ["été"]}]);
        let path = write_output(dir.path(), 3, &payload).unwrap();

        assert_eq!(path, dir.path().join("test3.json"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Café Noir — Shark Week"));
        assert!(!text.contains("\\u"));
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = write_output(&missing, 0, &json!({})).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
