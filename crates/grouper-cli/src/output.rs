use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Plain-text table. Columns whose cells are all numbers are right-aligned.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    let mut numeric = vec![!rows.is_empty(); columns];
    for row in &rows {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(cell.len());
            numeric[i] &= cell.parse::<u64>().is_ok();
        }
    }

    let render = |cells: &mut dyn Iterator<Item = &str>| -> String {
        let line: Vec<String> = cells
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                if numeric.get(i).copied().unwrap_or(false) {
                    format!("{cell:>w$}")
                } else {
                    format!("{cell:<w$}")
                }
            })
            .collect();
        line.join("  ").trim_end().to_string()
    };

    println!("{}", render(&mut headers.iter().copied()));
    println!(
        "{}",
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in &rows {
        println!("{}", render(&mut row.iter().map(String::as_str)));
    }
}
