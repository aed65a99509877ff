//! Session source: one login credential per line of a text file.
//!
//! Each non-empty line is a URL-encoded query string as produced by the
//! game's web-app launcher (`query_id`, `user`, `auth_date`, `hash`). The
//! file is re-read on every lookup so edits take effect on the next pass
//! without a restart.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Base used only to borrow `Url`'s form-urlencoded codec.
const QUERY_CODEC_BASE: &str = "http://session.invalid/";

/// Why a line could not be turned into a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("line is empty")]
    Empty,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid user payload: {0}")]
    InvalidUser(String),
}

/// The `user` object embedded in a session line.
///
/// Fields other than `id`, `username` and `first_name` are kept in `extra`
/// so the auth payload echoes the user object unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionUser {
    /// Best human-readable label for log lines.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.first_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// One parsed session line.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescriptor {
    /// The query string, re-encoded.
    pub init_data: String,
    pub query_id: Option<String>,
    pub user: SessionUser,
    pub auth_date: String,
    pub hash: String,
}

impl SessionDescriptor {
    /// Body for `POST auth/telegram`.
    pub fn auth_payload(&self) -> Value {
        json!({
            "initData": self.init_data,
            "initDataUnsafe": {
                "query_id": self.query_id,
                "user": self.user,
                "auth_date": self.auth_date,
                "hash": self.hash,
            }
        })
    }
}

/// Parses a single session line.
pub fn parse_session_line(line: &str) -> Result<SessionDescriptor, SessionError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SessionError::Empty);
    }

    let mut url =
        Url::parse(QUERY_CODEC_BASE).map_err(|e| SessionError::InvalidUser(e.to_string()))?;
    url.set_query(Some(line));
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    let field = |name: &'static str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };

    let raw_user = field("user").ok_or(SessionError::MissingField("user"))?;
    let user = decode_user(&raw_user)?;
    let auth_date = field("auth_date").ok_or(SessionError::MissingField("auth_date"))?;
    let hash = field("hash").ok_or(SessionError::MissingField("hash"))?;
    let query_id = field("query_id");

    let mut encoded =
        Url::parse(QUERY_CODEC_BASE).map_err(|e| SessionError::InvalidUser(e.to_string()))?;
    encoded.query_pairs_mut().extend_pairs(pairs.iter());
    let init_data = encoded.query().unwrap_or_default().to_string();

    Ok(SessionDescriptor {
        init_data,
        query_id,
        user,
        auth_date,
        hash,
    })
}

/// Decodes the `user` value, which launchers sometimes encode twice.
fn decode_user(raw: &str) -> Result<SessionUser, SessionError> {
    match serde_json::from_str::<SessionUser>(raw) {
        Ok(user) => Ok(user),
        Err(first_err) if raw.contains('%') => {
            let decoded = percent_decode(raw)
                .ok_or_else(|| SessionError::InvalidUser("bad percent-encoding".to_string()))?;
            serde_json::from_str(&decoded)
                .map_err(|_| SessionError::InvalidUser(first_err.to_string()))
        }
        Err(e) => Err(SessionError::InvalidUser(e.to_string())),
    }
}

/// Strict percent-decoding (`+` is left alone). `None` on malformed escapes
/// or invalid UTF-8.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Line-oriented session file.
#[derive(Debug, Clone)]
pub struct SessionSource {
    path: PathBuf,
}

impl SessionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content
            .split('\n')
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect())
    }

    /// Returns the session on raw line `index`, or `None` when the index is
    /// out of range, the line is blank, or it does not parse.
    pub fn session_at(&self, index: usize) -> Option<SessionDescriptor> {
        let lines = match self.read_lines() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };

        let line = lines.get(index)?;
        match parse_session_line(line) {
            Ok(session) => {
                debug!(line = index + 1, user_id = session.user.id, "Session parsed");
                Some(session)
            }
            Err(SessionError::Empty) => None,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping unparsable session line");
                None
            }
        }
    }

    /// Raw line indices of every non-blank line, in file order.
    pub fn session_indices(&self) -> io::Result<Vec<usize>> {
        Ok(self
            .read_lines()?
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, _)| i)
            .collect())
    }

    /// Every non-blank line with its parse result.
    pub fn entries(&self) -> io::Result<Vec<(usize, Result<SessionDescriptor, SessionError>)>> {
        Ok(self
            .read_lines()?
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| (i, parse_session_line(line)))
            .collect())
    }
}
