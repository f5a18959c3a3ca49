use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::cell::CellValue;

/// One persisted cell: sparse (row, col, value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
}

/// Canonical representation of one sheet tab: display name plus a sparse
/// cell list in canonical (row, column) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetDoc {
    pub name: String,
    pub cells: Vec<CellRecord>,
}

impl SheetDoc {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: Vec::new(),
        }
    }
}

/// Canonical document as persisted: an ordered list of sheet tabs. Only the
/// first tab participates in live sync; trailing tabs are carried through a
/// load → edit → persist cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<SheetDoc>,
}

impl Workbook {
    pub fn single(sheet: SheetDoc) -> Self {
        Self {
            sheets: vec![sheet],
        }
    }

    /// The synced tab.
    pub fn primary(&self) -> Option<&SheetDoc> {
        self.sheets.first()
    }

    /// Tabs beyond the synced one.
    pub fn rest(&self) -> &[SheetDoc] {
        self.sheets.get(1..).unwrap_or_default()
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
