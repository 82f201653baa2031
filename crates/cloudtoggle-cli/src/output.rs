use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", render_table(headers, &rows));
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Trailing padding is trimmed from every line.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = render_line(headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&render_line(rule.iter().map(String::as_str), &widths));
    for row in rows {
        out.push_str(&render_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn render_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:w$}"))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}
