use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::payload::{Payload, Verse};

/// Errors that can occur while reading a JSON dataset file
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dataset: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One chapter record from the fetched text dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Chapter {
    /// Chapter (surah) number
    pub chapter: u32,

    /// Chapter name, if the source provided one
    #[serde(default)]
    pub name: Option<String>,

    /// Verses in order
    pub verses: Vec<Verse>,
}

impl Chapter {
    /// Converts the record into a text payload for sealing
    pub fn into_payload(self) -> Payload {
        let surah_name = self
            .name
            .unwrap_or_else(|| format!("Surah {}", self.chapter));

        Payload::QuranText {
            surah_number: self.chapter,
            surah_name,
            verses: self.verses,
        }
    }
}

/// Reads a JSON array of chapters
pub fn load_chapters<P: AsRef<Path>>(path: P) -> Result<Vec<Chapter>, DatasetError> {
    let raw = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_name_fallback() {
        let chapter = Chapter {
            chapter: 112,
            name: None,
            verses: Vec::new(),
        };

        match chapter.into_payload() {
            Payload::QuranText { surah_number, surah_name, .. } => {
                assert_eq!(surah_number, 112);
                assert_eq!(surah_name, "Surah 112");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_load_chapters() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"chapter": 1, "name": "Al-Fatihah", "verses": [{{"arabic": "ا", "english": "a"}}]}},
                {{"chapter": 2, "verses": []}}
            ]"#
        )
        .unwrap();

        let chapters = load_chapters(file.path()).unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].name.as_deref(), Some("Al-Fatihah"));
        assert_eq!(chapters[0].verses[0].english, "a");
        assert_eq!(chapters[1].name, None);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load_chapters("/nonexistent/quran.json"),
            Err(DatasetError::Io(_))
        ));
    }
}
