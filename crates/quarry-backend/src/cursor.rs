//! The opaque reference-pagination cursor.
//!
//! The server mints a cursor when a reference query has remote pages left;
//! the client echoes it back verbatim. On the wire it is base64-wrapped JSON
//! with an explicit version tag so incompatible servers reject rather than
//! misread it.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use quarry_core::DumpId;

use crate::error::QueryError;

const CURSOR_VERSION: u32 = 1;

/// Which scope the pagination state machine is draining.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorPhase {
    /// Dumps of the same repository at other commits/roots.
    #[serde(rename = "same-repo")]
    SameRepo,
    /// Dumps of other repositories.
    #[serde(rename = "remote-repo")]
    RemoteRepo,
}

/// Resume state for a paginated reference query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCursor {
    /// The dump the initial query ran against; its own results are never
    /// repeated in remote pages.
    pub dump_id: DumpId,
    pub scheme: String,
    pub identifier: String,
    pub name: String,
    pub version: Option<String>,
    pub phase: CursorPhase,
    pub offset: u64,
}

#[derive(Serialize, Deserialize)]
struct WireCursor {
    v: u32,
    #[serde(flatten)]
    cursor: ReferenceCursor,
}

impl ReferenceCursor {
    /// Encodes the cursor into its opaque wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        let wire = WireCursor {
            v: CURSOR_VERSION,
            cursor: self.clone(),
        };
        let json = serde_json::to_vec(&wire).expect("cursor serializes");
        STANDARD_NO_PAD.encode(json)
    }

    /// Decodes a cursor the server previously minted.
    pub fn decode(token: &str) -> Result<Self, QueryError> {
        let bytes = STANDARD_NO_PAD
            .decode(token.trim())
            .map_err(|err| QueryError::cursor_invalid(format!("not base64: {err}")))?;
        let wire: WireCursor = serde_json::from_slice(&bytes)
            .map_err(|err| QueryError::cursor_invalid(format!("malformed payload: {err}")))?;
        if wire.v != CURSOR_VERSION {
            return Err(QueryError::cursor_invalid(format!(
                "unsupported cursor version {}",
                wire.v
            )));
        }
        Ok(wire.cursor)
    }
}
