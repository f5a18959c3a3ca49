pub mod access;
pub mod cell;
pub mod clock;
pub mod document;
pub mod error;
pub mod frontier;
pub mod ids;
pub mod store;

pub use access::Permission;
pub use cell::{CellRef, CellValue};
pub use clock::{Hlc, HlcClock, Stamp};
pub use document::{CellRecord, SheetDoc, Workbook};
pub use error::CoreError;
pub use frontier::Frontier;
pub use ids::*;
pub use store::{CellDelta, CellSlot, CellStore, DeltaEntry};
