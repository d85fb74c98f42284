// tsmctl - multi-server command runner for IBM Spectrum Protect
// Copyright (C) 2025 tsmctl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Envelope validation and per-server response parsing.
//!
//! One command against one server yields one envelope: a one-element outer
//! array wrapping an array of objects. The first inner object either carries
//! `hdr` + `items` (real rows) or a single `msg` (an informational, warning
//! or error notice). Some commands put a second `msg` object after the rows.

use crate::normalize::{normalize, scalar_text};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Synthetic column identifying the originating server in every row.
pub const SERVER_COLUMN: &str = "TSM SERVER";

/// Server message code meaning "no rows matched the query".
pub const NO_MATCH_CODE: &str = "2034";

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("Unsupported data structure: not able to validate structure")]
    Invalid,
    #[error("column ids `{first}` and `{second}` both map to display name `{name}`")]
    ColumnCollision {
        first: String,
        second: String,
        name: String,
    },
}

/// A notice emitted by the remote server, distinct from transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub code: String,
    pub text: String,
    pub server: String,
    pub command: String,
}

/// Normalized output of one envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerResult {
    /// Column names, `TSM SERVER` first. Only set when the envelope carried rows.
    pub header: Option<Vec<String>>,
    pub rows: Vec<Map<String, Value>>,
    pub messages: Vec<ServerMessage>,
}

/// Checks the top-level shape of one envelope before any field is read.
///
/// `[[]]` is accepted and rewritten in place to a one-object array carrying a
/// code-2034 message; servers before SP 8.1.9 omit the "no match found"
/// notice entirely.
pub fn validate(envelope: &mut Value) -> Result<(), StructureError> {
    let outer = envelope.as_array_mut().ok_or(StructureError::Invalid)?;
    if outer.len() != 1 {
        return Err(StructureError::Invalid);
    }
    let inner = outer[0].as_array_mut().ok_or(StructureError::Invalid)?;

    if inner.is_empty() {
        inner.push(json!({"msg": {"n": NO_MATCH_CODE}}));
        return Ok(());
    }

    let first = inner[0].as_object().ok_or(StructureError::Invalid)?;
    let shape_ok = (first.len() == 1 && first.contains_key("msg"))
        || (first.len() >= 2 && first.contains_key("hdr") && first.contains_key("items"));
    if shape_ok {
        Ok(())
    } else {
        Err(StructureError::Invalid)
    }
}

/// Parses one validated envelope into a per-server result.
pub fn parse(
    envelope: &Value,
    server: &str,
    command: &str,
) -> Result<ServerResult, StructureError> {
    let inner = envelope
        .get(0)
        .and_then(Value::as_array)
        .ok_or(StructureError::Invalid)?;
    let first = inner
        .first()
        .and_then(Value::as_object)
        .ok_or(StructureError::Invalid)?;

    let mut result = ServerResult::default();

    if let (Some(hdr), Some(items)) = (first.get("hdr"), first.get("items")) {
        let hdr = hdr.as_array().ok_or(StructureError::Invalid)?;
        let items = items.as_array().ok_or(StructureError::Invalid)?;
        let columns = column_plan(hdr)?;

        for item in items {
            let source = item.as_object().ok_or(StructureError::Invalid)?;
            let mut row = Map::new();
            row.insert(
                SERVER_COLUMN.to_string(),
                Value::String(server.to_string()),
            );
            for column in &columns {
                let cell = source
                    .get(&column.wire_key)
                    .map(normalize)
                    .unwrap_or(Value::Null);
                row.insert(column.display.clone(), cell);
            }
            result.rows.push(row);
        }

        let mut header = vec![SERVER_COLUMN.to_string()];
        header.extend(columns.into_iter().map(|c| c.display));
        result.header = Some(header);
    }

    // A message can sit in the first object (msg-only envelope) and some
    // commands emit a second one after the rows.
    for entry in inner.iter().take(2) {
        if let Some(msg) = entry.get("msg").and_then(Value::as_object) {
            result.messages.push(ServerMessage {
                code: msg.get("n").map(scalar_text).unwrap_or_default(),
                text: msg.get("def").map(scalar_text).unwrap_or_default(),
                server: server.to_string(),
                command: command.to_string(),
            });
        }
    }

    Ok(result)
}

struct ColumnPlan {
    wire_key: String,
    display: String,
}

/// Resolves the header into (wire key, display name) pairs.
///
/// A flat header uses the same string for both. An `{id, def}` header maps
/// wire ids to display names; two ids mapping to the same display name would
/// silently overwrite each other, so that envelope is rejected instead.
fn column_plan(hdr: &[Value]) -> Result<Vec<ColumnPlan>, StructureError> {
    let paired = hdr.first().map(Value::is_object).unwrap_or(false);
    let mut columns = Vec::with_capacity(hdr.len());

    for entry in hdr {
        let column = if paired {
            let pair = entry.as_object().ok_or(StructureError::Invalid)?;
            let id = pair
                .get("id")
                .and_then(Value::as_str)
                .ok_or(StructureError::Invalid)?;
            let def = pair
                .get("def")
                .and_then(Value::as_str)
                .ok_or(StructureError::Invalid)?;
            ColumnPlan {
                wire_key: id.to_string(),
                display: def.to_string(),
            }
        } else {
            let name = entry.as_str().ok_or(StructureError::Invalid)?;
            ColumnPlan {
                wire_key: name.to_string(),
                display: name.to_string(),
            }
        };

        if let Some(existing) = columns
            .iter()
            .find(|c: &&ColumnPlan| c.display == column.display)
        {
            return Err(StructureError::ColumnCollision {
                first: existing.wire_key.clone(),
                second: column.wire_key.clone(),
                name: column.display.clone(),
            });
        }
        columns.push(column);
    }

    Ok(columns)
}
