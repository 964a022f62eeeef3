//! Decoder seams for policy and shortcut files.
//!
//! Parsing the binary registry-policy format is an external concern; the
//! engine consumes an already-decoded, ordered sequence of entries through
//! the [`PolicyDecoder`] trait. The bundled implementations read the JSON
//! dumps produced by the decode stage of the deployment pipeline.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::store::{PolicyEntry, Shortcut};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Decodes one policy file into an ordered entry sequence.
pub trait PolicyDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<PolicyEntry>, DecodeError>;
}

/// Decodes one shortcuts preference file.
pub trait ShortcutDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<Shortcut>, DecodeError>;
}

/// Reads a JSON array of decoded policy entries.
#[derive(Debug, Default)]
pub struct JsonPolicyDecoder;

impl PolicyDecoder for JsonPolicyDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<PolicyEntry>, DecodeError> {
        let contents = read(path)?;
        serde_json::from_str(&contents).map_err(|e| DecodeError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Reads a JSON array of decoded shortcuts.
#[derive(Debug, Default)]
pub struct JsonShortcutDecoder;

impl ShortcutDecoder for JsonShortcutDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<Shortcut>, DecodeError> {
        let contents = read(path)?;
        serde_json::from_str(&contents).map_err(|e| DecodeError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn read(path: &Path) -> Result<String, DecodeError> {
    fs::read_to_string(path).map_err(|source| DecodeError::Read {
        path: path.display().to_string(),
        source,
    })
}
