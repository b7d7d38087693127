//! FILENAME: core/engine/src/table.rs
//! PURPOSE: The in-memory table that the cubing engine reads and produces.
//! CONTEXT: Row-major storage of `CellValue`s with typed column metadata and an
//! optional row index. A table is treated as an immutable snapshot: every
//! reshaping operation (`set_index`, `reset_index`) returns a new table.

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::column::{Column, ColumnType};
use crate::error::TableError;

/// Columns promoted to the row index, with one key per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIndex {
    /// Index column metadata, in index level order.
    pub columns: Vec<Column>,

    /// Index keys, one `Vec` per row (same length as `columns`).
    pub keys: Vec<Vec<CellValue>>,
}

impl RowIndex {
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// One key per row, each as wide as the index columns.
    fn check_shape(&self, row_count: usize) -> Result<(), TableError> {
        if self.keys.len() != row_count {
            return Err(TableError::IndexLength {
                expected: row_count,
                found: self.keys.len(),
            });
        }
        match self.keys.iter().find(|k| k.len() != self.columns.len()) {
            Some(key) => Err(TableError::RowWidth {
                expected: self.columns.len(),
                found: key.len(),
            }),
            None => Ok(()),
        }
    }
}

/// A row-major table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<CellValue>>,
    #[serde(default)]
    index: Option<RowIndex>,
}

/// Serialized form of `Table`, checked before it becomes one.
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<Column>,
    rows: Vec<Vec<CellValue>>,
    #[serde(default)]
    index: Option<RowIndex>,
}

impl TryFrom<RawTable> for Table {
    type Error = TableError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let mut table = Table::from_parts(raw.columns, raw.rows)?;
        if let Some(index) = raw.index {
            index.check_shape(table.row_count())?;
            table.index = Some(index);
        }
        Ok(table)
    }
}

impl Table {
    /// Creates an empty table with the given columns.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Table {
            columns,
            rows: Vec::new(),
            index: None,
        })
    }

    /// Builds a table from column names and rows, inferring each column's type
    /// from its values.
    pub fn from_rows<S: AsRef<str>>(
        names: &[S],
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Self, TableError> {
        let columns = names
            .iter()
            .map(|n| Column::new(n.as_ref(), ColumnType::Null))
            .collect();
        let mut table = Table::new(columns)?;
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Builds a table whose column types are already known. Values are not
    /// checked against the declared types.
    pub fn from_parts(columns: Vec<Column>, rows: Vec<Vec<CellValue>>) -> Result<Self, TableError> {
        let mut table = Table::new(columns)?;
        for row in &rows {
            table.check_width(row.len())?;
        }
        table.rows = rows;
        Ok(table)
    }

    /// Appends a row, widening column types as needed.
    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<(), TableError> {
        self.check_width(row.len())?;
        for (column, value) in self.columns.iter_mut().zip(row.iter()) {
            column.dtype = column.dtype.widen(value.column_type());
        }
        self.rows.push(row);
        Ok(())
    }

    fn check_width(&self, found: usize) -> Result<(), TableError> {
        if found != self.column_count() {
            return Err(TableError::RowWidth {
                expected: self.column_count(),
                found,
            });
        }
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a data column (index columns are not included).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Like `column_index` but fails with `UnknownColumn`.
    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> Option<&[CellValue]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> Option<&RowIndex> {
        self.index.as_ref()
    }

    /// Looks up a value by row and column name, searching the row index too.
    pub fn get(&self, row: usize, name: &str) -> Option<&CellValue> {
        if let Some(col) = self.column_index(name) {
            return self.rows.get(row).and_then(|r| r.get(col));
        }
        let index = self.index.as_ref()?;
        let level = index.columns.iter().position(|c| c.name == name)?;
        index.keys.get(row).and_then(|k| k.get(level))
    }

    /// Iterates over the values of one data column.
    pub fn column_values<'a>(
        &'a self,
        name: &str,
    ) -> Result<impl Iterator<Item = &'a CellValue> + 'a, TableError> {
        let col = self.require_column(name)?;
        Ok(self.rows.iter().map(move |r| &r[col]))
    }

    /// Moves the named columns into the row index (appending to an existing
    /// index). Remaining columns keep their relative order.
    pub fn set_index<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TableError> {
        let positions = names
            .iter()
            .map(|n| self.require_column(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = self.index.clone().unwrap_or(RowIndex {
            columns: Vec::new(),
            keys: vec![Vec::new(); self.rows.len()],
        });
        index
            .columns
            .extend(positions.iter().map(|&p| self.columns[p].clone()));

        let kept: Vec<usize> = (0..self.columns.len())
            .filter(|p| !positions.contains(p))
            .collect();

        let mut rows = Vec::with_capacity(self.rows.len());
        for (row, key) in self.rows.iter().zip(index.keys.iter_mut()) {
            key.extend(positions.iter().map(|&p| row[p].clone()));
            rows.push(kept.iter().map(|&p| row[p].clone()).collect());
        }

        Ok(Table {
            columns: kept.iter().map(|&p| self.columns[p].clone()).collect(),
            rows,
            index: Some(index),
        })
    }

    /// Moves the row index back into the data columns, in front of them.
    pub fn reset_index(&self) -> Table {
        let Some(index) = &self.index else {
            return self.clone();
        };

        let mut columns = index.columns.clone();
        columns.extend(self.columns.iter().cloned());

        let rows = self
            .rows
            .iter()
            .zip(index.keys.iter())
            .map(|(row, key)| key.iter().chain(row.iter()).cloned().collect())
            .collect();

        Table {
            columns,
            rows,
            index: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> Table {
        Table::from_rows(
            &["product", "price"],
            vec![
                vec![CellValue::from("A"), CellValue::from(1)],
                vec![CellValue::from("B"), CellValue::from(2.5)],
                vec![CellValue::Null, CellValue::from(3)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_infers_types() {
        let table = create_test_table();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("product").unwrap().dtype, ColumnType::Text);
        assert_eq!(table.column("price").unwrap().dtype, ColumnType::Float);
    }

    #[test]
    fn test_row_width_is_checked() {
        let result = Table::from_rows(&["a", "b"], vec![vec![CellValue::from(1)]]);
        assert!(matches!(
            result,
            Err(TableError::RowWidth { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Table::from_rows(&["a", "a"], Vec::new());
        assert!(matches!(result, Err(TableError::DuplicateColumn(name)) if name == "a"));
    }

    #[test]
    fn test_deserialize_rejects_ragged_rows() {
        let result = serde_json::from_str::<Table>(
            r#"{
                "columns": [{"name": "product", "dtype": "Text"}, {"name": "price", "dtype": "Integer"}],
                "rows": [["A", 1], ["B"]]
            }"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Row has 1 values, table has 2 columns"), "{}", err);

        let raw = RawTable {
            columns: vec![Column::new("a", ColumnType::Integer), Column::new("a", ColumnType::Integer)],
            rows: Vec::new(),
            index: None,
        };
        assert!(matches!(Table::try_from(raw), Err(TableError::DuplicateColumn(_))));
    }

    #[test]
    fn test_deserialize_checks_index_shape() {
        let indexed = create_test_table().set_index(&["product"]).unwrap();
        let json = serde_json::to_string(&indexed).unwrap();
        assert_eq!(serde_json::from_str::<Table>(&json).unwrap(), indexed);

        let raw = RawTable {
            columns: vec![Column::new("price", ColumnType::Integer)],
            rows: vec![vec![CellValue::from(1)], vec![CellValue::from(2)]],
            index: Some(RowIndex {
                columns: vec![Column::new("product", ColumnType::Text)],
                keys: vec![vec![CellValue::from("A")]],
            }),
        };
        assert!(matches!(
            Table::try_from(raw),
            Err(TableError::IndexLength { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_set_and_reset_index() {
        let table = create_test_table();
        let indexed = table.set_index(&["product"]).unwrap();

        assert_eq!(indexed.column_names(), vec!["price"]);
        assert_eq!(indexed.index().unwrap().names(), vec!["product"]);
        assert_eq!(indexed.get(1, "product"), Some(&CellValue::from("B")));
        assert_eq!(indexed.get(1, "price"), Some(&CellValue::from(2.5)));

        let flat = indexed.reset_index();
        assert_eq!(flat, table);
    }

    #[test]
    fn test_unknown_column() {
        let table = create_test_table();
        assert!(matches!(
            table.set_index(&["region"]),
            Err(TableError::UnknownColumn(name)) if name == "region"
        ));
        assert!(table.column_values("region").is_err());
        assert_eq!(table.column_values("price").unwrap().count(), 3);
    }
}
