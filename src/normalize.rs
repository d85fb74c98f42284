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

//! Cell value normalization.
//!
//! The Operations Center API has no fixed schema for cell values: the same
//! logical value can arrive as a bare scalar, a single-element wrapper, a
//! value/unit pair, or a nested definition object. This module collapses all
//! of those into one flat scalar per cell.

use chrono::{Local, TimeZone};
use serde_json::Value;

/// Sentinel stored in a cell whose wire shape is not one of the known ones.
pub const UNEXPECTED_DATA: &str = "UNEXPECTED DATA - CONTACT DEVELOPER";

/// The closed set of value shapes the gateway is known to emit.
enum WireShape<'a> {
    /// Bare scalar (string, number, boolean, null).
    Scalar(&'a Value),
    /// `{"def": x, ...}` — a definition wrapper around an id/code.
    Definition(&'a Value),
    /// `{"secs": n, ...}` — a Unix timestamp in seconds.
    Timestamp(i64),
    /// `[]` — no value.
    EmptyList,
    /// `[x]`, `[{"val": x}]` or `[{"val": {"def": x}}]` — a wrapped scalar.
    Single(&'a Value),
    /// `[{"val": n}, {"val": {"def": unit}}]` — a quantity plus its unit.
    Quantity(&'a Value, &'a Value),
    Unrecognized,
}

fn classify(raw: &Value) -> WireShape<'_> {
    match raw {
        Value::Object(map) => {
            if let Some(def) = map.get("def") {
                WireShape::Definition(def)
            } else if let Some(secs) = map.get("secs").and_then(Value::as_i64) {
                WireShape::Timestamp(secs)
            } else {
                WireShape::Unrecognized
            }
        }
        Value::Array(entries) => match entries.as_slice() {
            [] => WireShape::EmptyList,
            [only] => classify_single(only),
            [first, second] => classify_pair(first, second),
            _ => WireShape::Unrecognized,
        },
        scalar => WireShape::Scalar(scalar),
    }
}

fn classify_single(entry: &Value) -> WireShape<'_> {
    match entry {
        Value::Object(map) => match map.get("val") {
            Some(Value::Object(inner)) => match inner.get("def") {
                Some(def) => WireShape::Single(def),
                None => WireShape::Unrecognized,
            },
            Some(Value::Array(_)) | None => WireShape::Unrecognized,
            Some(scalar) => WireShape::Single(scalar),
        },
        Value::Array(_) => WireShape::Unrecognized,
        scalar => WireShape::Single(scalar),
    }
}

fn classify_pair<'a>(first: &'a Value, second: &'a Value) -> WireShape<'a> {
    let amount = first.as_object().and_then(|m| m.get("val"));
    let unit = second
        .as_object()
        .and_then(|m| m.get("val"))
        .and_then(Value::as_object)
        .and_then(|m| m.get("def"));
    match (amount, unit) {
        (Some(amount), Some(unit)) if !amount.is_object() && !amount.is_array() => {
            WireShape::Quantity(amount, unit)
        }
        _ => WireShape::Unrecognized,
    }
}

/// Collapses one raw cell value into a flat scalar.
///
/// Never fails: shapes outside the known set normalize to the
/// [`UNEXPECTED_DATA`] sentinel so one odd cell cannot abort a run.
pub fn normalize(raw: &Value) -> Value {
    match classify(raw) {
        WireShape::Scalar(v) | WireShape::Definition(v) | WireShape::Single(v) => v.clone(),
        WireShape::Timestamp(secs) => match Local.timestamp_opt(secs, 0).single() {
            Some(ts) => Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::String(UNEXPECTED_DATA.to_string()),
        },
        WireShape::EmptyList => Value::String("-".to_string()),
        WireShape::Quantity(amount, unit) => {
            Value::String(format!("{} {}", scalar_text(amount), scalar_text(unit)))
        }
        WireShape::Unrecognized => Value::String(UNEXPECTED_DATA.to_string()),
    }
}

/// Renders a flat scalar without JSON quoting.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "-".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
