use crate::indicators::IndicatorRow;

/// Renders one row as a bordered fixed-width table: border, header, border,
/// values, border. Each column is as wide as its longer cell plus two, with
/// cells centred.
#[must_use]
pub fn render(columns: &[(&str, String)]) -> Vec<String> {
    let widths: Vec<usize> = columns
        .iter()
        .map(|(name, value)| name.chars().count().max(value.chars().count()) + 2)
        .collect();

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("+")
    );
    let header = format!(
        "|{}|",
        columns
            .iter()
            .zip(&widths)
            .map(|((name, _), w)| format!("{name:^w$}", w = *w))
            .collect::<Vec<_>>()
            .join("|")
    );
    let values = format!(
        "|{}|",
        columns
            .iter()
            .zip(&widths)
            .map(|((_, value), w)| format!("{value:^w$}", w = *w))
            .collect::<Vec<_>>()
            .join("|")
    );

    vec![border.clone(), header, border.clone(), values, border]
}

/// Table for the latest indicator row of a cycle.
#[must_use]
pub fn render_row(row: &IndicatorRow) -> Vec<String> {
    render(&row.columns())
}
