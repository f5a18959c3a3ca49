use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::CoreError;

/// Coordinate of one cell in the synced sheet: zero-based (row, column).
///
/// The derived ordering (row, then column) is the canonical cell order used
/// when projecting the store into a document. Serializes as the stable
/// string key `"{row}_{col}"`, the form deltas and presence carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Stable string key, `"{row}_{col}"`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.row, self.col)
    }

    /// Parse a `"{row}_{col}"` key back into a coordinate.
    pub fn parse_key(key: &str) -> Result<Self, CoreError> {
        let (row, col) = key
            .split_once('_')
            .ok_or_else(|| CoreError::InvalidCellKey(key.to_string()))?;
        let row = row
            .parse()
            .map_err(|_| CoreError::InvalidCellKey(key.to_string()))?;
        let col = col
            .parse()
            .map_err(|_| CoreError::InvalidCellKey(key.to_string()))?;
        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.row, self.col)
    }
}

impl Serialize for CellRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for CellRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Self::parse_key(&key).map_err(D::Error::custom)
    }
}

/// Opaque cell payload: the value itself plus whatever display or format
/// metadata the client attaches (e.g. `{"v":"hello","bl":1}`). The store
/// never looks inside; it is replaced as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellValue(serde_json::Value);

impl CellValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Plain text cell, `{"v": text}`.
    pub fn text(text: &str) -> Self {
        Self(serde_json::json!({ "v": text }))
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrip() {
        let cell = CellRef::new(12, 7);
        assert_eq!(cell.key(), "12_7");
        assert_eq!(CellRef::parse_key("12_7").unwrap(), cell);
        assert_eq!(CellRef::parse_key("0_0").unwrap(), CellRef::new(0, 0));
    }

    #[test]
    fn serializes_as_the_string_key() {
        let cell = CellRef::new(3, 4);
        let json = serde_json::to_string(&cell).unwrap();
        assert_eq!(json, "\"3_4\"");
        let back: CellRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cell);
        assert!(serde_json::from_str::<CellRef>("\"3-4\"").is_err());
    }

    #[test]
    fn bad_keys_rejected() {
        assert!(CellRef::parse_key("12").is_err());
        assert!(CellRef::parse_key("a_b").is_err());
        assert!(CellRef::parse_key("-1_2").is_err());
        assert!(CellRef::parse_key("").is_err());
    }

    #[test]
    fn canonical_order_is_row_major() {
        let mut cells = vec![
            CellRef::new(1, 0),
            CellRef::new(0, 2),
            CellRef::new(0, 0),
            CellRef::new(1, 1),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![
                CellRef::new(0, 0),
                CellRef::new(0, 2),
                CellRef::new(1, 0),
                CellRef::new(1, 1),
            ]
        );
    }
}
