use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table as TextTable};
use tabflow_core::Result;
use tabflow_parser::{Table, Value};

/// Renders up to `limit` rows under a `name (type)` header.
pub fn render_preview(table: &Table, limit: usize) -> Result<String> {
    if table.width() == 0 {
        return Ok("(no columns)\n".to_string());
    }

    let header: Vec<String> = table
        .columns()
        .iter()
        .map(|spec| format!("{} ({})", spec.name, spec.kind))
        .collect();

    let mut text = TextTable::new();
    text.load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);

    for row in table.rows()?.into_iter().take(limit) {
        let cells: Vec<String> = row.iter().map(render_cell).collect();
        text.add_row(cells);
    }

    let mut out = format!("{text}\n");
    if table.height() > limit {
        out.push_str(&format!("... showing {limit} of {} rows\n", table.height()));
    } else {
        out.push_str(&format!("{} rows\n", table.height()));
    }
    Ok(out)
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
