//! Output formatting utilities for the CLI.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Borderless table with upper-cased headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Two-column key/value table for a single object.
pub fn detail_table(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(format!("{key}:")), Cell::new(value)]);
    }
    table
}

/// `yes`/`no` for presence flags.
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        name: String,
    }

    impl CommandOutput for Sample {
        fn to_human(&self) -> String {
            format!("sample {}", self.name)
        }
    }

    #[test]
    fn test_default_json_is_serialized_form() {
        let sample = Sample {
            name: "acme".to_string(),
        };
        assert_eq!(sample.to_json(), serde_json::json!({ "name": "acme" }));
        assert_eq!(sample.to_human(), "sample acme");
    }

    #[test]
    fn test_detail_table_renders_rows() {
        let rendered = detail_table(&[("Name", "acme".to_string()), ("Phase", "Ready".to_string())]).to_string();
        assert!(rendered.contains("Name:"));
        assert!(rendered.contains("Ready"));
    }

    #[test]
    fn test_list_table_headers() {
        let mut table = list_table(&["name", "phase"]);
        table.add_row(vec!["acme", "Ready"]);
        let rendered = table.to_string();
        assert!(rendered.contains("NAME"));
        assert!(rendered.contains("acme"));
    }
}
