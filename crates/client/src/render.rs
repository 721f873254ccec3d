//! Terminal output built from [`Fields`].

use colored::{ColoredString, Colorize};
use rangeforge_core::display::Fields;

/// Color a status label by what it means for the user.
pub fn status(label: &str) -> ColoredString {
    match label {
        "complete" | "ready" | "running" => label.green(),
        "failed" | "error" => label.red().bold(),
        "in_progress" | "building" | "destroying" => label.yellow(),
        "queued" => label.blue(),
        _ => label.dimmed(),
    }
}

/// Render `items` as an aligned table with one header row.
pub fn table<T: Fields>(items: &[T]) -> String {
    let Some(first) = items.first() else {
        return "(none)\n".to_string();
    };

    let headers: Vec<&str> = first.fields().into_iter().map(|(label, _)| label).collect();
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| item.fields().into_iter().map(|(_, value)| value).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:<width$}").bold().to_string())
        .collect();
    out.push_str(header_line.join("  ").trim_end());
    out.push('\n');

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .zip(&headers)
            .map(|((value, width), header)| cell(header, value, *width))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Render one item as `Label: value` lines.
pub fn detail<T: Fields>(item: &T) -> String {
    let fields = item.fields();
    let width = fields.iter().map(|(label, _)| label.len()).max().unwrap_or(0) + 1;

    let mut out = String::new();
    for (label, value) in &fields {
        let value = if *label == "Status" {
            status(value).to_string()
        } else {
            value.clone()
        };
        let label = format!("{:<width$}", format!("{label}:"));
        out.push_str(&format!("{} {value}\n", label.bold()));
    }
    out
}

/// Padding is measured on the plain text so escape codes do not skew
/// alignment.
fn cell(header: &str, value: &str, width: usize) -> String {
    if header == "Status" {
        let pad = width.saturating_sub(value.chars().count());
        format!("{}{}", status(value), " ".repeat(pad))
    } else {
        format!("{value:<width$}")
    }
}
