//! Typed indexing job requests.
//!
//! Each [`TaskKind`] has one parameter struct. Requests are validated before a
//! task record exists, and the validated parameters are what the record keeps
//! as `request_params` so a retry can rebuild the exact same job.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::{Result, TaskError};
use crate::tasks::TaskKind;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexCodebaseParams {
    pub root_path: String,
    pub collection: String,
    pub incremental: bool,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub extra_skip_dirs: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDocumentsParams {
    pub paths: Vec<String>,
    pub collection: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub source_tag: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexImagesParams {
    pub root_path: String,
    pub collection: String,
    pub vision_model: String,
    pub caption_prompt: String,
    pub incremental: bool,
    pub max_image_size_kb: i64,
    pub extra_skip_dirs: Vec<String>,
}

/// Files already persisted by the upload endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexUploadsParams {
    pub saved_paths: Vec<String>,
    pub collection: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub source_tag: String,
    pub vision_model: String,
    pub caption_prompt: String,
}

/// Remote share indexing. The share is addressed either by a registered
/// `share_id` or by explicit `server` + `share` connection details.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSmbParams {
    pub share_id: String,
    pub remote_paths: Vec<String>,
    pub collection: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub source_tag: String,
    pub server: String,
    pub share: String,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub port: i64,
}

/// A validated indexing request, one variant per task kind.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexJob {
    Codebase(IndexCodebaseParams),
    Documents(IndexDocumentsParams),
    Images(IndexImagesParams),
    Uploads(IndexUploadsParams),
    Smb(IndexSmbParams),
}

impl IndexJob {
    pub fn kind(&self) -> TaskKind {
        match self {
            IndexJob::Codebase(_) => TaskKind::IndexCodebase,
            IndexJob::Documents(_) => TaskKind::IndexDocuments,
            IndexJob::Images(_) => TaskKind::IndexImages,
            IndexJob::Uploads(_) => TaskKind::IndexUploads,
            IndexJob::Smb(_) => TaskKind::IndexSmb,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            IndexJob::Codebase(p) => {
                require_text("root_path", &p.root_path)?;
                validate_chunking(p.chunk_size, p.chunk_overlap)
            }
            IndexJob::Documents(p) => {
                require_list("paths", &p.paths)?;
                validate_chunking(p.chunk_size, p.chunk_overlap)
            }
            IndexJob::Images(p) => {
                require_text("root_path", &p.root_path)?;
                if p.max_image_size_kb < 0 {
                    return Err(TaskError::validation(
                        "max_image_size_kb must not be negative",
                    ));
                }
                Ok(())
            }
            IndexJob::Uploads(p) => {
                require_list("saved_paths", &p.saved_paths)?;
                validate_chunking(p.chunk_size, p.chunk_overlap)
            }
            IndexJob::Smb(p) => {
                require_list("remote_paths", &p.remote_paths)?;
                let has_share_id = !p.share_id.trim().is_empty();
                let has_inline =
                    !p.server.trim().is_empty() && !p.share.trim().is_empty();
                if !has_share_id && !has_inline {
                    return Err(TaskError::validation(
                        "either share_id or both server and share are required",
                    ));
                }
                if !(0..=i64::from(u16::MAX)).contains(&p.port) {
                    return Err(TaskError::validation(format!(
                        "port {} is out of range",
                        p.port
                    )));
                }
                validate_chunking(p.chunk_size, p.chunk_overlap)
            }
        }
    }

    /// The JSON object stored on the task record and sent to the worker.
    pub fn to_parameters(&self) -> Map<String, Value> {
        let value = match self {
            IndexJob::Codebase(p) => serde_json::to_value(p),
            IndexJob::Documents(p) => serde_json::to_value(p),
            IndexJob::Images(p) => serde_json::to_value(p),
            IndexJob::Uploads(p) => serde_json::to_value(p),
            IndexJob::Smb(p) => serde_json::to_value(p),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Rebuild a job from stored parameters. The result is validated.
    pub fn from_parameters(kind: TaskKind, parameters: &Map<String, Value>) -> Result<Self> {
        let job = match kind {
            TaskKind::IndexCodebase => IndexJob::Codebase(decode(kind, parameters)?),
            TaskKind::IndexDocuments => IndexJob::Documents(decode(kind, parameters)?),
            TaskKind::IndexImages => IndexJob::Images(decode(kind, parameters)?),
            TaskKind::IndexUploads => IndexJob::Uploads(decode(kind, parameters)?),
            TaskKind::IndexSmb => IndexJob::Smb(decode(kind, parameters)?),
        };
        job.validate()?;
        Ok(job)
    }
}

fn decode<T: DeserializeOwned>(kind: TaskKind, parameters: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|err| TaskError::validation(format!("{kind} parameters: {err}")))
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TaskError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_list(field: &str, values: &[String]) -> Result<()> {
    if values.is_empty() {
        return Err(TaskError::validation(format!("{field} must not be empty")));
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(TaskError::validation(format!(
            "{field} must not contain blank entries"
        )));
    }
    Ok(())
}

// Zero means "use the worker default" for both values.
fn validate_chunking(chunk_size: i64, chunk_overlap: i64) -> Result<()> {
    if chunk_size < 0 || chunk_overlap < 0 {
        return Err(TaskError::validation(
            "chunk_size and chunk_overlap must not be negative",
        ));
    }
    if chunk_size > 0 && chunk_overlap >= chunk_size {
        return Err(TaskError::validation(format!(
            "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}
