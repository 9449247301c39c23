//! Invocation harness: owns the flat string arrays and calls the entry point.
//!
//! Arrays follow the 1-indexed convention: slot 0 is reserved and holds a
//! null pointer, slots `1..len` hold the joined strings.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use log::debug;

use crate::backend::{state_error, BackendState, JoinEntry};
use crate::error::{JitError, TableError};
use crate::table::Table;

/// A 1-indexed array of C string pointers plus the strings it points to.
#[derive(Debug)]
pub struct StringColumn {
    owned: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl StringColumn {
    /// Column `column` of `table`. Row `i` lands in slot `i`, so row 0
    /// (the header, by convention) occupies the reserved slot and is not
    /// part of the join.
    pub fn from_table(table: &Table, column: usize) -> Result<Self, TableError> {
        if table.is_empty() {
            return Ok(Self {
                owned: Vec::new(),
                ptrs: Vec::new(),
            });
        }
        let values = (1..table.len())
            .map(|row| {
                table
                    .field(row, column)
                    .ok_or(TableError::MissingField { row, column })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_values(values)
    }

    /// `values[k]` lands in slot `k + 1`. Values are taken as raw bytes.
    pub fn from_values<I, S>(values: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let owned = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                CString::new(v.as_ref()).map_err(|_| TableError::InteriorNul { row: i + 1 })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut ptrs = Vec::with_capacity(owned.len() + 1);
        ptrs.push(ptr::null());
        ptrs.extend(owned.iter().map(|s| s.as_ptr()));
        Ok(Self { owned, ptrs })
    }

    /// Number of slots, including the reserved slot 0.
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    /// Bytes at `slot`; `None` for slot 0 and out-of-range slots.
    pub fn get_bytes(&self, slot: usize) -> Option<&[u8]> {
        let index = slot.checked_sub(1)?;
        self.owned.get(index).map(|s| s.as_bytes())
    }

    /// Like [`get_bytes`](Self::get_bytes), but only for UTF-8 content.
    pub fn get(&self, slot: usize) -> Option<&str> {
        std::str::from_utf8(self.get_bytes(slot)?).ok()
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }
}

/// Result of one join invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutput {
    /// Count returned by the generated function.
    pub matches: i32,
    /// Byte copy of the output array; slot 0 and unwritten slots are `None`.
    pub slots: Vec<Option<Vec<u8>>>,
}

impl JoinOutput {
    pub fn slot_bytes(&self, slot: usize) -> Option<&[u8]> {
        self.slots.get(slot)?.as_deref()
    }

    /// The slot as text; `None` also when its bytes are not UTF-8.
    pub fn slot(&self, slot: usize) -> Option<&str> {
        std::str::from_utf8(self.slot_bytes(slot)?).ok()
    }

    /// Slots `1..len`, in order.
    pub fn results(&self) -> impl Iterator<Item = Option<&[u8]>> + '_ {
        self.slots.iter().skip(1).map(Option::as_deref)
    }
}

/// Invoke `entry` on two equally sized columns.
pub fn run_join<E: JoinEntry>(
    entry: &E,
    left: &StringColumn,
    right: &StringColumn,
) -> Result<JoinOutput, JitError> {
    if !entry.is_live() {
        return Err(state_error("invokable", BackendState::Shutdown));
    }
    if left.len() != right.len() {
        return Err(JitError::ShapeMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    let size = i32::try_from(left.len())
        .map_err(|_| JitError::InvalidParams(format!("{} slots exceed i32", left.len())))?;

    let mut out: Vec<*const c_char> = vec![ptr::null(); left.len()];
    // Safety: both inputs hold `size` pointers whose slots 1.. are valid C
    // strings owned by the columns, `out` holds `size` writable slots, and
    // the entry is live.
    let matches = unsafe {
        entry.call(
            left.as_ptr(),
            right.as_ptr(),
            out.as_mut_ptr(),
            size,
            0,
        )
    };
    debug!("join over {size} slots returned {matches}");

    // Output pointers refer to input strings or to constants owned by the
    // backend; copy them out while both are alive.
    let slots = out
        .iter()
        .map(|&p| {
            (!p.is_null()).then(|| unsafe { CStr::from_ptr(p) }.to_bytes().to_vec())
        })
        .collect();
    Ok(JoinOutput { matches, slots })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_round_trip() {
        let table = Table::parse("id,key\n1,alpha\n2,beta\n3,gamma");
        let col = StringColumn::from_table(&table, 1).unwrap();
        assert_eq!(col.len(), 4);
        assert_eq!(col.get(0), None);
        assert_eq!(col.get(1), Some("alpha"));
        assert_eq!(col.get(2), Some("beta"));
        assert_eq!(col.get(3), Some("gamma"));
        assert_eq!(col.get(4), None);
    }

    #[test]
    fn test_missing_column() {
        let table = Table::parse("a,b\n1,2\n3");
        let err = StringColumn::from_table(&table, 1).unwrap_err();
        assert!(matches!(err, TableError::MissingField { row: 2, column: 1 }));
    }

    #[test]
    fn test_header_only_table_has_one_slot() {
        let col = StringColumn::from_table(&Table::parse("only,header"), 0).unwrap();
        assert_eq!(col.len(), 1);
        assert!(StringColumn::from_table(&Table::default(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_non_utf8_column_round_trip() {
        let table = Table::parse(b"id,key\n1,caf\xe9\n2,cafe\n");
        let col = StringColumn::from_table(&table, 1).unwrap();
        assert_eq!(col.get_bytes(1), Some(b"caf\xe9".as_slice()));
        assert_eq!(col.get(1), None);
        assert_eq!(col.get(2), Some("cafe"));
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let err = StringColumn::from_values(["ok", "bad\0"]).unwrap_err();
        assert!(matches!(err, TableError::InteriorNul { row: 2 }));
    }
}
