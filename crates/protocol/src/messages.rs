use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Stable wire error codes reported in `complete` messages.
///
/// The integer values are part of the contract with the git-lfs client and
/// must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ConfigFile = 1,
    FileNotFound = 2,
    Download = 3,
    Upload = 4,
    CannotCreateTmpFile = 5,
    Unhandled = 9,
}

impl ErrorCode {
    /// The integer sent on the wire.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Error details attached to a failed `complete` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectError {
    pub code: i32,
    pub message: String,
}

impl ObjectError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound messages (git-lfs -> agent)
// ---------------------------------------------------------------------------

/// The side of the transfer a session was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
}

/// Transfer action hint sent by git-lfs.
///
/// Carried for wire compatibility; objects are always located by name in
/// the remote container, so the hint is decoded and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub href: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub header: HashMap<String, String>,
}

/// A command read from the input channel, one per line.
///
/// Decoding is strict about the `event` discriminant and tolerant of absent
/// optional fields, which default to the kind's zero value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Request {
    Init {
        operation: Operation,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        remote: String,
        #[serde(default, skip_serializing_if = "is_false")]
        concurrent: bool,
        #[serde(
            rename = "concurrenttransfers",
            default,
            skip_serializing_if = "is_zero_u32"
        )]
        concurrent_transfers: u32,
    },
    Upload {
        oid: String,
        #[serde(default, skip_serializing_if = "is_zero_u64")]
        size: u64,
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<Action>,
    },
    Download {
        oid: String,
        #[serde(default, skip_serializing_if = "is_zero_u64")]
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<Action>,
    },
    Terminate,
}

// ---------------------------------------------------------------------------
// Outbound messages (agent -> git-lfs)
// ---------------------------------------------------------------------------

/// Acknowledgement for `init`. Serializes to `{}` on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

impl InitAck {
    pub fn ok() -> Self {
        Self::default()
    }
}

/// A reply written to the output channel, one per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Reply {
    #[serde(rename_all = "camelCase")]
    Progress {
        oid: String,
        bytes_so_far: u64,
        bytes_since_last: u64,
    },
    Complete {
        oid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ObjectError>,
    },
}

impl Reply {
    /// Progress report for one transfer step.
    pub fn progress(oid: impl Into<String>, bytes_so_far: u64, bytes_since_last: u64) -> Self {
        Reply::Progress {
            oid: oid.into(),
            bytes_so_far,
            bytes_since_last,
        }
    }

    /// Successful terminal message for an upload (no local path).
    pub fn complete(oid: impl Into<String>) -> Self {
        Reply::Complete {
            oid: oid.into(),
            path: None,
            error: None,
        }
    }

    /// Successful terminal message for a download, advertising the local path.
    pub fn complete_with_path(oid: impl Into<String>, path: PathBuf) -> Self {
        Reply::Complete {
            oid: oid.into(),
            path: Some(path),
            error: None,
        }
    }

    /// Failed terminal message carrying a stable error code.
    pub fn failed(oid: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Reply::Complete {
            oid: oid.into(),
            path: None,
            error: Some(ObjectError::new(code, message)),
        }
    }
}

// Serde helpers so zero-value fields are omitted from output.
fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}
