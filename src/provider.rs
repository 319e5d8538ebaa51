use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed payload from the data source: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("the data source answered with an unexpected payload")]
    UnexpectedPayload,

    #[error("the data source rejected the request: {reason}")]
    Rejected { reason: String },
}

/// One typed request of the compile pipeline, in the order the stages
/// issue them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// The map file itself.
    MapFile { name: &'a str },
    /// The form file the map's `StartUpForm` names.
    FormFile { name: &'a str },
    /// The schema document of the map's `Source`.
    DataSchema { source: &'a str },
    /// Rows for one translated query.
    Query {
        source: &'a str,
        relation: &'a str,
        sql: &'a str,
    },
}

/// What a provider answers with.
#[derive(Debug, Clone)]
pub enum Resource {
    Text(String),
    Rows(Vec<serde_json::Value>),
}

impl Resource {
    pub fn into_text(self) -> Result<String, TransportError> {
        match self {
            Resource::Text(text) => Ok(text),
            Resource::Rows(_) => Err(TransportError::UnexpectedPayload),
        }
    }

    pub fn into_rows(self) -> Result<Vec<serde_json::Value>, TransportError> {
        match self {
            Resource::Rows(rows) => Ok(rows),
            Resource::Text(_) => Err(TransportError::UnexpectedPayload),
        }
    }
}

/// Where the compiler gets its inputs from.
///
/// The pipeline is synchronous and issues requests one at a time; a
/// provider only has to answer them, it never sees the pipeline's state.
pub trait ResourceProvider {
    fn fetch(&self, request: Request<'_>) -> Result<Resource, TransportError>;
}

/// Provider reading everything from a directory tree: map and form files
/// from the root, query rows from `<data_dir>/<relation>.json`.
///
/// Stands in for a live database during development and in tests; the SQL
/// of a query request is ignored, the canned rows are expected to match
/// the translated statement's shape.
pub struct FsResourceProvider {
    root: PathBuf,
    data_dir: PathBuf,
}

impl FsResourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data_dir = root.join("data");
        FsResourceProvider { root, data_dir }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    fn read_text(&self, path: &Path) -> Result<Resource, TransportError> {
        Ok(Resource::Text(fs::read_to_string(path)?))
    }
}

impl ResourceProvider for FsResourceProvider {
    fn fetch(&self, request: Request<'_>) -> Result<Resource, TransportError> {
        match request {
            Request::MapFile { name } | Request::FormFile { name } => {
                self.read_text(&self.root.join(name))
            }
            Request::DataSchema { source } => self.read_text(&self.root.join(source)),
            Request::Query { relation, .. } => {
                let text = fs::read_to_string(self.data_dir.join(format!("{relation}.json")))?;
                match serde_json::from_str(&text)? {
                    serde_json::Value::Array(rows) => Ok(Resource::Rows(rows)),
                    _ => Err(TransportError::UnexpectedPayload),
                }
            }
        }
    }
}
