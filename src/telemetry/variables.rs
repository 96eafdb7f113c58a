//! Telemetry variables exchanged inside UDP response frames.
//!
//! # Wire Format
//!
//! ```text
//! Full snapshot:  [0xFF][YAML mapping as ASCII text]
//! Delta frame:    [index:u8][value] [index:u8][value] ...
//! ```
//!
//! A snapshot fixes the variable list for the session: order gives the wire
//! index, a `?` key prefix marks the variable editable, and the value's type
//! fixes its wire encoding:
//!
//! | Type   | Encoding |
//! |--------|----------|
//! | BOOL   | 1 byte, 0 or 1 |
//! | INT    | 2 bytes, signed little-endian |
//! | FLOAT  | 4 bytes, IEEE-754 little-endian |
//! | STRING | 1 length byte + N ASCII bytes |
//!
//! Delta decoding stops at the end of the buffer or at an index byte of 255.

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Leading byte of a full snapshot payload.
pub const SNAPSHOT_MARKER: u8 = 0xFF;

const EDITABLE_PREFIX: char = '?';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    Bool,
    Int,
    Float,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Int(i16),
    Float(f32),
    String(String),
}

impl TelemetryValue {
    pub fn var_type(&self) -> VarType {
        match self {
            TelemetryValue::Bool(_) => VarType::Bool,
            TelemetryValue::Int(_) => VarType::Int,
            TelemetryValue::Float(_) => VarType::Float,
            TelemetryValue::String(_) => VarType::String,
        }
    }

    /// Append the wire encoding of this value.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            TelemetryValue::Bool(b) => out.push(u8::from(*b)),
            TelemetryValue::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
            TelemetryValue::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
            TelemetryValue::String(s) => {
                let bytes: Vec<u8> = s
                    .chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                    .take(u8::MAX as usize)
                    .collect();
                out.push(bytes.len() as u8);
                out.extend_from_slice(&bytes);
            }
        }
    }

    /// Decode a value of type `ty` at the start of `bytes`, returning it and its length.
    fn decode(ty: VarType, bytes: &[u8]) -> Option<(TelemetryValue, usize)> {
        match ty {
            VarType::Bool => bytes.first().map(|&b| (TelemetryValue::Bool(b != 0), 1)),
            VarType::Int => {
                let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
                Some((TelemetryValue::Int(i16::from_le_bytes(raw)), 2))
            }
            VarType::Float => {
                let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
                Some((TelemetryValue::Float(f32::from_le_bytes(raw)), 4))
            }
            VarType::String => {
                let len = *bytes.first()? as usize;
                let raw = bytes.get(1..1 + len)?;
                let text = raw.iter().map(|&b| b as char).collect();
                Some((TelemetryValue::String(text), 1 + len))
            }
        }
    }

    fn from_yaml(value: &serde_yaml::Value) -> TelemetryValue {
        use serde_yaml::Value;
        match value {
            Value::Bool(b) => TelemetryValue::Bool(*b),
            Value::Number(n) => match n.as_i64().and_then(|i| i16::try_from(i).ok()) {
                Some(i) => TelemetryValue::Int(i),
                None => TelemetryValue::Float(n.as_f64().unwrap_or(0.0) as f32),
            },
            Value::String(s) => TelemetryValue::String(s.clone()),
            Value::Null => TelemetryValue::String(String::new()),
            other => TelemetryValue::String(
                serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryVariable {
    pub name: String,
    pub editable: bool,
    pub value: TelemetryValue,
    #[serde(skip)]
    pub dirty: bool,
}

impl TelemetryVariable {
    pub fn var_type(&self) -> VarType {
        self.value.var_type()
    }
}

/// Session-scoped variable list, indexed by wire position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    vars: Vec<TelemetryVariable>,
}

impl VariableTable {
    /// Parse the text of a full snapshot (marker byte already stripped).
    pub fn from_snapshot(text: &str) -> Result<Self, TelemetryError> {
        if text.trim().is_empty() {
            return Ok(VariableTable::default());
        }
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| TelemetryError::InvalidSnapshot(e.to_string()))?;
        let mapping = match doc {
            serde_yaml::Value::Mapping(m) => m,
            serde_yaml::Value::Null => return Ok(VariableTable::default()),
            _ => return Err(TelemetryError::InvalidSnapshot("not a mapping".to_string())),
        };

        let mut vars = Vec::with_capacity(mapping.len());
        for (key, value) in mapping.iter() {
            let key = match key {
                serde_yaml::Value::String(s) => s.clone(),
                other => serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            };
            let (name, editable) = match key.strip_prefix(EDITABLE_PREFIX) {
                Some(stripped) => (stripped.to_string(), true),
                None => (key, false),
            };
            vars.push(TelemetryVariable {
                name,
                editable,
                value: TelemetryValue::from_yaml(value),
                dirty: false,
            });
        }
        Ok(VariableTable { vars })
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TelemetryVariable> {
        self.vars.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryVariable> {
        self.vars.iter()
    }

    /// Apply a delta frame. Returns the indices whose value changed.
    ///
    /// Values decoded before a failure stay applied. A variable with a
    /// pending operator edit keeps the edit.
    pub fn apply_delta(&mut self, bytes: &[u8]) -> Result<Vec<usize>, TelemetryError> {
        let mut changed = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let index = bytes[pos] as usize;
            if index >= SNAPSHOT_MARKER as usize {
                break;
            }
            pos += 1;
            let len = self.vars.len();
            let var = self
                .vars
                .get_mut(index)
                .ok_or(TelemetryError::IndexOutOfRange { index, len })?;
            let (value, used) =
                TelemetryValue::decode(var.var_type(), &bytes[pos..]).ok_or(TelemetryError::Truncated { index })?;
            pos += used;
            if !var.dirty && var.value != value {
                var.value = value;
                changed.push(index);
            }
        }
        Ok(changed)
    }

    /// Operator edit of an editable variable. The wire type cannot change.
    pub fn set_value(&mut self, index: usize, value: TelemetryValue) -> Result<(), TelemetryError> {
        let len = self.vars.len();
        let var = self
            .vars
            .get_mut(index)
            .ok_or(TelemetryError::IndexOutOfRange { index, len })?;
        if !var.editable {
            return Err(TelemetryError::NotEditable(index));
        }
        let value = coerce(var.var_type(), value).ok_or(TelemetryError::TypeMismatch(index))?;
        if var.value != value {
            var.value = value;
            var.dirty = true;
        }
        Ok(())
    }

    pub fn has_pending_edits(&self) -> bool {
        self.vars.iter().any(|v| v.editable && v.dirty)
    }

    /// Encode every edited variable as `[index][value]` and clear the edits.
    pub fn generate_update(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        for (index, var) in self.vars.iter_mut().enumerate() {
            if !(var.editable && var.dirty) {
                continue;
            }
            var.dirty = false;
            if index >= SNAPSHOT_MARKER as usize {
                log::warn!("Variable {} beyond the addressable range, edit dropped", var.name);
                continue;
            }
            out.push(index as u8);
            var.value.encode(&mut out);
        }
        out
    }
}

/// Convert an operator-supplied value to the variable's fixed type.
fn coerce(ty: VarType, value: TelemetryValue) -> Option<TelemetryValue> {
    match (ty, value) {
        (VarType::Bool, v @ TelemetryValue::Bool(_)) => Some(v),
        (VarType::Int, v @ TelemetryValue::Int(_)) => Some(v),
        (VarType::Int, TelemetryValue::Float(f)) if f.fract() == 0.0 => {
            let f = f as i32;
            i16::try_from(f).ok().map(TelemetryValue::Int)
        }
        (VarType::Float, v @ TelemetryValue::Float(_)) => Some(v),
        (VarType::Float, TelemetryValue::Int(i)) => Some(TelemetryValue::Float(i as f32)),
        (VarType::String, v @ TelemetryValue::String(_)) => Some(v),
        _ => None,
    }
}
