//! Column-named numeric table with explicit missing cells

use crate::types::{YieldError, YieldResult};
use ndarray::Array2;

/// Rows of optional values under named columns. `None` is a missing cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> YieldResult<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Build from key/value records. Columns appear in first-seen order; a key
    /// absent from a record, a `null` or a non-numeric value is a missing cell.
    pub fn from_records(records: &[serde_json::Map<String, serde_json::Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).and_then(|v| v.as_f64()))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Option<f64>>) -> YieldResult<()> {
        if row.len() != self.columns.len() {
            return Err(YieldError::InvalidFormat(format!(
                "Row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r[idx])
    }

    /// Reorder to exactly `columns`, creating an all-missing column for any
    /// name the table lacks and dropping the rest
    pub fn reindex<S: AsRef<str>>(&self, columns: &[S]) -> FeatureTable {
        let sources: Vec<Option<usize>> = columns
            .iter()
            .map(|c| self.column_index(c.as_ref()))
            .collect();
        for (name, source) in columns.iter().zip(&sources) {
            if source.is_none() {
                log::warn!("Column '{}' missing from feature table, filling as missing", name.as_ref());
            }
        }
        FeatureTable {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| sources.iter().map(|s| s.and_then(|i| row[i])).collect())
                .collect(),
        }
    }

    /// Mean of the present values of each column, `None` if a column has none
    pub fn column_means(&self) -> Vec<Option<f64>> {
        (0..self.columns.len())
            .map(|idx| {
                let (sum, count) = self
                    .rows
                    .iter()
                    .filter_map(|r| r[idx])
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                (count > 0).then(|| sum / count as f64)
            })
            .collect()
    }

    /// Replace missing cells with the per-column fill value, where one exists.
    /// Returns the number of cells filled.
    pub fn fill_missing(&mut self, fill: &[Option<f64>]) -> usize {
        let mut filled = 0;
        for row in self.rows.iter_mut() {
            for (cell, value) in row.iter_mut().zip(fill) {
                if cell.is_none() {
                    if let Some(v) = value {
                        *cell = Some(*v);
                        filled += 1;
                    }
                }
            }
        }
        filled
    }

    pub fn count_missing(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|c| c.is_none()).count())
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count_missing() == 0
    }

    /// Keep only rows without missing cells. Returns the kept table and the
    /// original indices of the kept rows.
    pub fn drop_incomplete(&self) -> (FeatureTable, Vec<usize>) {
        let kept: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.iter().all(|c| c.is_some()))
            .map(|(i, _)| i)
            .collect();
        let table = FeatureTable {
            columns: self.columns.clone(),
            rows: kept.iter().map(|&i| self.rows[i].clone()).collect(),
        };
        (table, kept)
    }

    /// Keep the given rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Place `other`'s columns to the right, aligning rows by position
    pub fn hconcat(&self, other: &FeatureTable) -> YieldResult<FeatureTable> {
        if self.n_rows() != other.n_rows() {
            return Err(YieldError::InvalidFormat(format!(
                "Cannot concatenate tables with {} and {} rows",
                self.n_rows(),
                other.n_rows()
            )));
        }
        if let Some(dup) = other.columns.iter().find(|c| self.columns.contains(c)) {
            return Err(YieldError::InvalidFormat(format!(
                "Column '{}' present in both tables",
                dup
            )));
        }
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| a.iter().chain(b.iter()).copied().collect())
            .collect();
        Ok(FeatureTable { columns, rows })
    }

    /// Dense matrix with `NaN` for missing cells
    pub fn to_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::<f64>::from_elem((self.n_rows(), self.n_cols()), f64::NAN);
        for (i, row) in self.rows.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                if let Some(v) = cell {
                    matrix[[i, j]] = *v;
                }
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_from_records_preserves_row_order() {
        let records = vec![
            record(json!({"NDVI": 0.5, "Soil_OC": 1.0})),
            record(json!({"NDVI": null, "Soil_OC": 2.0})),
            record(json!({"Soil_OC": 3.0, "extra": "text"})),
        ];
        let table = FeatureTable::from_records(&records);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.get(0, "NDVI"), Some(0.5));
        assert_eq!(table.get(1, "NDVI"), None);
        assert_eq!(table.get(2, "NDVI"), None);
        assert_eq!(table.get(2, "Soil_OC"), Some(3.0));
        assert_eq!(table.get(2, "extra"), None);
    }

    #[test]
    fn test_reindex_inserts_missing_columns() {
        let table = FeatureTable::from_rows(
            vec!["b".into(), "a".into()],
            vec![vec![Some(2.0), Some(1.0)]],
        )
        .unwrap();
        let out = table.reindex(&["a", "c", "b"]);
        assert_eq!(out.columns(), &["a", "c", "b"]);
        assert_eq!(out.rows()[0], vec![Some(1.0), None, Some(2.0)]);
    }

    #[test]
    fn test_column_means_and_fill() {
        let mut table = FeatureTable::from_rows(
            vec!["x".into(), "y".into()],
            vec![
                vec![Some(1.0), None],
                vec![Some(3.0), None],
                vec![None, None],
            ],
        )
        .unwrap();
        let means = table.column_means();
        assert_eq!(means, vec![Some(2.0), None]);

        let filled = table.fill_missing(&means);
        assert_eq!(filled, 1);
        assert_eq!(table.get(2, "x"), Some(2.0));
        assert_eq!(table.count_missing(), 3);
    }

    #[test]
    fn test_drop_incomplete_and_hconcat() {
        let left = FeatureTable::from_rows(
            vec!["lat".into()],
            vec![vec![Some(20.0)], vec![Some(21.0)]],
        )
        .unwrap();
        let right = FeatureTable::from_rows(
            vec!["NDVI".into()],
            vec![vec![None], vec![Some(0.4)]],
        )
        .unwrap();
        let joined = left.hconcat(&right).unwrap();
        let (complete, kept) = joined.drop_incomplete();
        assert_eq!(kept, vec![1]);
        assert_eq!(complete.rows()[0], vec![Some(21.0), Some(0.4)]);

        let mismatched = FeatureTable::from_rows(vec!["z".into()], vec![vec![None]]).unwrap();
        assert!(left.hconcat(&mismatched).is_err());
        assert!(left.hconcat(&left).is_err());
    }

    #[test]
    fn test_to_matrix() {
        let table = FeatureTable::from_rows(
            vec!["x".into(), "y".into()],
            vec![vec![Some(1.0), None]],
        )
        .unwrap();
        let m = table.to_matrix();
        assert_eq!(m[[0, 0]], 1.0);
        assert!(m[[0, 1]].is_nan());
    }
}
