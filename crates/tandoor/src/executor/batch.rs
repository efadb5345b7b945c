use std::collections::BTreeMap;
use crate::input::{InputField, InputValue, Inputs};

/// A column-wise view of a drained batch.
///
/// Each declared field maps to one value per task, in the order the tasks were
/// drained (oldest first). Every column has the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    fields: Vec<InputField>,
    columns: BTreeMap<InputField, Vec<InputValue>>,
    len: usize,
}

impl Batch {
    /// Builds the columns for `fields` from row-wise task inputs.
    ///
    /// Admission guarantees every row carries every declared field; a row that
    /// does not is reported back as its index.
    pub(crate) fn assemble(fields: &[InputField], rows: Vec<Inputs>) -> Result<Self, usize> {
        let len = rows.len();
        let mut columns: BTreeMap<InputField, Vec<InputValue>> = fields
            .iter()
            .map(|field| (*field, Vec::with_capacity(len)))
            .collect();

        for (idx, mut row) in rows.into_iter().enumerate() {
            for field in fields {
                let value = row.take(*field).ok_or(idx)?;
                columns
                    .get_mut(field)
                    .ok_or(idx)?
                    .push(value);
            }
        }

        Ok(Self {
            fields: fields.to_vec(),
            columns,
            len,
        })
    }

    /// Number of tasks in the batch.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fields present, in the task's declaration order.
    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    pub fn column(&self, field: InputField) -> Option<&[InputValue]> {
        self.columns.get(&field).map(Vec::as_slice)
    }

    /// Convenience accessor for text columns such as the prompt.
    pub fn texts(&self, field: InputField) -> Option<Vec<&str>> {
        self.column(field)?
            .iter()
            .map(|value| match value {
                InputValue::Text(text) => Some(text.as_str()),
                InputValue::Image(_) => None,
            })
            .collect()
    }

    /// Row `idx` rebuilt from the columns.
    pub fn row(&self, idx: usize) -> Option<Vec<(InputField, &InputValue)>> {
        if idx >= self.len {
            return None;
        }
        self.fields
            .iter()
            .map(|field| self.columns.get(field).and_then(|col| col.get(idx)).map(|v| (*field, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_groups_by_field_in_order() {
        let rows = vec![
            Inputs::new().with_prompt("first").with_image(vec![1]),
            Inputs::new().with_prompt("second").with_image(vec![2]),
        ];
        let batch = Batch::assemble(&[InputField::Image, InputField::Prompt], rows).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.fields(), &[InputField::Image, InputField::Prompt]);
        assert_eq!(batch.texts(InputField::Prompt), Some(vec!["first", "second"]));
        assert_eq!(
            batch.column(InputField::Image),
            Some(&[InputValue::Image(vec![1]), InputValue::Image(vec![2])][..])
        );
    }

    #[test]
    fn test_assemble_reports_incomplete_row() {
        let rows = vec![
            Inputs::new().with_prompt("ok"),
            Inputs::new(),
        ];
        assert_eq!(Batch::assemble(&[InputField::Prompt], rows), Err(1));
    }

    #[test]
    fn test_row_rebuilds_task_inputs() {
        let rows = vec![
            Inputs::new().with_prompt("a"),
            Inputs::new().with_prompt("b"),
        ];
        let batch = Batch::assemble(&[InputField::Prompt], rows).unwrap();
        let row = batch.row(1).unwrap();
        assert_eq!(row, vec![(InputField::Prompt, &InputValue::Text("b".into()))]);
        assert!(batch.row(2).is_none());
    }

    #[test]
    fn test_texts_rejects_image_column() {
        let rows = vec![Inputs::new().with_image(vec![9])];
        let batch = Batch::assemble(&[InputField::Image], rows).unwrap();
        assert_eq!(batch.texts(InputField::Image), None);
    }
}
