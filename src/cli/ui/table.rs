use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style as TableStyle};

use super::painter::Painter;

/// Rounded terminal table rendered through `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    right_aligned: Vec<usize>,
    placeholder: Option<String>,
}

impl Table {
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
            right_aligned: Vec::new(),
            placeholder: None,
        }
    }

    /// Two-column field/value table with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["field", "value"], records)
    }

    /// Right-aligns a column of measurements.
    pub(crate) fn align_right(mut self, column: usize) -> Self {
        self.right_aligned.push(column);
        self
    }

    /// Text repeated across one row when the table has no data.
    pub(crate) fn or_placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = Some(text.into());
        self
    }

    fn placeholder_row(&self) -> Option<Vec<String>> {
        let text = self.placeholder.as_ref()?;
        self.rows
            .is_empty()
            .then(|| vec![text.clone(); self.headers.len()])
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        if let Some(row) = self.placeholder_row() {
            builder.push_record(row);
        }

        let mut table = builder.build();
        table.with(TableStyle::rounded());
        for &column in &self.right_aligned {
            table.modify(Columns::one(column), Alignment::right());
        }
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn grid_table_renders_headers_before_rows() {
        let table = Table::grid(
            ["channel", "amps"],
            vec![
                vec!["A".into(), "0.45".into()],
                vec!["B".into(), "1.20".into()],
            ],
        )
        .to_string();

        let header = table.find("channel").expect("header should render");
        let first = table.find("0.45").expect("first row should render");
        let second = table.find("1.20").expect("second row should render");
        assert!(header < first && first < second);
        assert!(table.starts_with('╭'));
    }

    #[test]
    fn key_value_table_uses_field_value_headers() {
        let painter = Painter::new(false);
        let table = Table::key_value(
            &painter,
            vec![("battery", "13.00 V".into()), ("mode", "application".into())],
        )
        .to_string();

        assert_eq!(Some(0), table.lines().position(|line| line.contains('╭')));
        assert!(table.contains("field"));
        assert!(table.contains("13.00 V"));
    }

    #[test]
    fn empty_table_renders_placeholder_in_every_column() {
        let table = Table::grid(["service_uuid", "primary"], Vec::new())
            .or_placeholder("<none>")
            .to_string();

        assert_eq!(2, table.matches("<none>").count());
    }

    #[test]
    fn placeholder_is_skipped_when_rows_exist() {
        let table = Table::grid(["channel"], vec![vec!["A".into()]])
            .or_placeholder("<none>")
            .to_string();

        assert!(!table.contains("<none>"));
    }

    #[test]
    fn right_aligned_column_pads_on_the_left() {
        let table = Table::grid(
            ["amps"],
            vec![vec!["0.5".into()], vec!["12.25".into()]],
        )
        .align_right(0)
        .to_string();

        assert!(table.lines().any(|line| line.contains("   0.5 │")));
    }
}
