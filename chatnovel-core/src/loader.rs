//! Script sources.
//!
//! The engine never touches the filesystem directly. It asks a
//! [`ScriptSource`] for a document by [`ScriptId`], either a chapter part or
//! a named global script (an interrupt, for example).

use crate::script::ScriptDocument;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Identifies a loadable script document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptId {
    Part { chapter: u32, part: u32 },
    Named(String),
}

impl ScriptId {
    pub fn part(chapter: u32, part: u32) -> Self {
        ScriptId::Part { chapter, part }
    }

    pub fn named(name: impl Into<String>) -> Self {
        ScriptId::Named(name.into())
    }

    /// Conventional file name for this script.
    pub fn file_name(&self) -> String {
        match self {
            ScriptId::Part { chapter, part } => format!("chapter{chapter}_part{part}.json"),
            ScriptId::Named(name) => {
                let sanitized = name
                    .chars()
                    .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
                    .collect::<String>();
                format!("{sanitized}.json")
            }
        }
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptId::Part { chapter, part } => write!(f, "chapter {chapter} part {part}"),
            ScriptId::Named(name) => write!(f, "script '{name}'"),
        }
    }
}

/// Errors from loading a script document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0} not found")]
    NotFound(ScriptId),

    #[error("IO error reading {id}: {source}")]
    Io {
        id: ScriptId,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {id}: {source}")]
    Malformed {
        id: ScriptId,
        #[source]
        source: serde_json::Error,
    },
}

/// Provides script documents by id.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn load(&self, id: &ScriptId) -> Result<ScriptDocument, LoadError>;
}

/// Reads `chapter{c}_part{p}.json` and `{name}.json` from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryScriptSource {
    root: PathBuf,
}

impl DirectoryScriptSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, id: &ScriptId) -> PathBuf {
        self.root.join(id.file_name())
    }
}

#[async_trait]
impl ScriptSource for DirectoryScriptSource {
    async fn load(&self, id: &ScriptId) -> Result<ScriptDocument, LoadError> {
        let content = match fs::read_to_string(self.path_for(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound(id.clone()))
            }
            Err(source) => {
                return Err(LoadError::Io {
                    id: id.clone(),
                    source,
                })
            }
        };

        ScriptDocument::from_json(&content).map_err(|source| LoadError::Malformed {
            id: id.clone(),
            source,
        })
    }
}

/// Registry of documents resolved in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticScriptSource {
    documents: HashMap<ScriptId, ScriptDocument>,
    raw: HashMap<ScriptId, String>,
}

impl StaticScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parsed document.
    pub fn with_document(mut self, id: ScriptId, document: ScriptDocument) -> Self {
        self.insert(id, document);
        self
    }

    /// Register raw JSON, parsed on every load.
    pub fn with_json(mut self, id: ScriptId, json: impl Into<String>) -> Self {
        self.documents.remove(&id);
        self.raw.insert(id, json.into());
        self
    }

    pub fn insert(&mut self, id: ScriptId, document: ScriptDocument) {
        self.raw.remove(&id);
        self.documents.insert(id, document);
    }
}

#[async_trait]
impl ScriptSource for StaticScriptSource {
    async fn load(&self, id: &ScriptId) -> Result<ScriptDocument, LoadError> {
        if let Some(document) = self.documents.get(id) {
            return Ok(document.clone());
        }
        let json = self
            .raw
            .get(id)
            .ok_or_else(|| LoadError::NotFound(id.clone()))?;
        ScriptDocument::from_json(json).map_err(|source| LoadError::Malformed {
            id: id.clone(),
            source,
        })
    }
}
