use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::schema::Schema;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// Ordered, typed result of executing a data source.
///
/// Every row has exactly one value per schema column, and each value is null
/// or of the column's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    schema: Arc<Schema>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut dataset = Self::new(schema);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.schema.len() {
            return Err(ModelError::RowLength {
                expected: self.schema.len(),
                actual: values.len(),
            });
        }
        for (column, value) in self.schema.columns().iter().zip(&values) {
            if !column.data_type.accepts(value.value_type()) {
                return Err(ModelError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.data_type,
                    actual: value.value_type(),
                });
            }
        }
        self.rows.push(Row { values });
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` for the named column, using the schema's lookup rules.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.schema.index_of(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Keeps the rows for which `keep` returns true, preserving order.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Schema, &Row) -> bool,
    {
        let schema = Arc::clone(&self.schema);
        self.rows.retain(|row| keep(&schema, row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    fn items_schema() -> Schema {
        Schema::new(vec![
            Column::new("Product", ColumnType::Text),
            Column::new("Qty", ColumnType::Number),
        ])
        .unwrap()
    }

    #[test]
    fn push_row_checks_length_and_types() {
        let mut dataset = Dataset::new(items_schema());
        dataset
            .push_row(vec![Value::text("A"), Value::Number(2.0)])
            .unwrap();
        dataset.push_row(vec![Value::text("B"), Value::Null]).unwrap();

        let short = dataset.push_row(vec![Value::text("C")]).unwrap_err();
        assert!(matches!(short, ModelError::RowLength { expected: 2, actual: 1 }));

        let mistyped = dataset
            .push_row(vec![Value::text("D"), Value::text("two")])
            .unwrap_err();
        assert!(matches!(mistyped, ModelError::TypeMismatch { .. }));
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn value_lookup_ignores_case() {
        let dataset = Dataset::from_rows(
            items_schema(),
            vec![vec![Value::text("A"), Value::Number(2.0)]],
        )
        .unwrap();
        assert_eq!(dataset.value(0, "qty"), Some(&Value::Number(2.0)));
        assert_eq!(dataset.value(1, "Qty"), None);
        assert_eq!(dataset.value(0, "Price"), None);
    }
}
