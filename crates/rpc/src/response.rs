//! Response enum for successful calls.
//!
//! Every request produces exactly one final response. Streaming requests
//! (`FindObjects`, `Sql`) deliver their rows as records before it.

use serde::{Deserialize, Serialize};

use crate::types::{Bucket, ObjectRecord};

/// Final result of a successful request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// No return value
    Unit,

    /// Server version string
    Version(String),

    /// One bucket
    Bucket(Bucket),

    /// Every bucket
    Buckets(Vec<Bucket>),

    /// One object
    Object(ObjectRecord),

    /// Etag of a written object
    Etag(String),

    /// Etag per batch step (`None` for steps that do not write one object)
    Etags(Vec<Option<String>>),

    /// Number of objects affected
    Count(u64),
}

impl Response {
    /// Variant name, for mismatch diagnostics.
    pub fn variant(&self) -> &'static str {
        match self {
            Response::Unit => "Unit",
            Response::Version(_) => "Version",
            Response::Bucket(_) => "Bucket",
            Response::Buckets(_) => "Buckets",
            Response::Object(_) => "Object",
            Response::Etag(_) => "Etag",
            Response::Etags(_) => "Etags",
            Response::Count(_) => "Count",
        }
    }
}
