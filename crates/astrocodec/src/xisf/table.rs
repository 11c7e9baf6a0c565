//! Standalone and per-image `<Table>` elements: a generic row/column data
//! block addressed like any other DataBlock (§3 "XISF Unit").

use std::string::String;
use std::vec::Vec;

use crate::error::{XisfError as Error, XisfResult as Result};
use crate::xisf::datablock::DataBlock;
use crate::xisf::property::PropertyType;

/// One column of a [`Table`]: its id, element type, and optional display format.
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    pub id: String,
    pub ty: PropertyType,
    pub format: Option<String>,
}

/// A decoded `<Table>` element: fixed row count, typed columns, and the
/// data block holding the row-major payload (each row is the column
/// values concatenated in declaration order).
#[derive(Debug, Clone)]
pub struct Table {
    pub id: Option<String>,
    pub rows: usize,
    pub columns: Vec<TableColumn>,
    pub data_block: DataBlock,
}

impl Table {
    /// Byte width of one column's element.
    fn column_width(ty: PropertyType) -> Result<usize> {
        Ok(match ty {
            PropertyType::Int8 | PropertyType::UInt8 | PropertyType::Boolean => 1,
            PropertyType::Int16 | PropertyType::UInt16 => 2,
            PropertyType::Int32 | PropertyType::UInt32 | PropertyType::Float32 => 4,
            PropertyType::Int64 | PropertyType::UInt64 | PropertyType::Float64 | PropertyType::Complex32 => 8,
            PropertyType::Complex64 => 16,
            _ => return Err(Error::Validation("table column type is not a fixed-width scalar")),
        })
    }

    /// Byte width of one row (sum of column widths).
    pub fn row_width(&self) -> Result<usize> {
        self.columns.iter().map(|c| Self::column_width(c.ty)).sum()
    }

    /// Slice the resolved block into `rows` row buffers, each `row_width()` bytes.
    pub fn split_rows<'a>(&self, resolved: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        let width = self.row_width()?;
        let expected = width * self.rows;
        if resolved.len() != expected {
            return Err(Error::Validation("table block length does not match rows * row width"));
        }
        Ok(resolved.chunks_exact(width).collect())
    }
}
