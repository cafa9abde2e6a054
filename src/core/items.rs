//! Item-line extractor: explodes the per-claim `item` JSON array into one row
//! per drug line.

use crate::domain::model::{cell_text, ColumnTable};
use crate::utils::error::Result;
use serde_json::Value;

/// Adjudication category code fragment -> output column, in match priority order.
pub const ADJUDICATION_CATEGORIES: [(&str, &str); 9] = [
    ("cvrd_d_plan_pd_amt", "benefit_amount"),
    ("gdc_blw_oopt_amt", "coinsurance_below_threshold"),
    ("gdc_abv_oopt_amt", "coinsurance_above_threshold"),
    ("ptnt_pay_amt", "patient_paid"),
    ("othr_troop_amt", "other_troop"),
    ("lics_amt", "low_income_subsidy"),
    ("plro_amt", "prior_payer_paid"),
    ("tot_rx_cst_amt", "total_drug_cost"),
    ("rptd_gap_dscnt_num", "gap_discount"),
];

/// Output column order after any carried columns.
pub const ITEM_COLUMNS: [&str; 14] = [
    "sequence",
    "service_date",
    "ndc_code",
    "product_display",
    "quantity",
    "total_drug_cost",
    "benefit_amount",
    "patient_paid",
    "prior_payer_paid",
    "low_income_subsidy",
    "coinsurance_below_threshold",
    "coinsurance_above_threshold",
    "other_troop",
    "gap_discount",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemReport {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub lines_emitted: usize,
}

fn text_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn cell_at(value: &Value, path: &[&str]) -> String {
    text_at(value, path).map(cell_text).unwrap_or_default()
}

/// Adjudication category field selected by a coding `code`, if any.
pub fn category_field(code: &str) -> Option<&'static str> {
    ADJUDICATION_CATEGORIES
        .iter()
        .find(|(fragment, _)| code.contains(fragment))
        .map(|(_, field)| *field)
}

/// Cells of one item line, in [`ITEM_COLUMNS`] order.
pub fn extract_item_line(item: &Value) -> Vec<String> {
    let mut cells: Vec<String> = vec![String::new(); ITEM_COLUMNS.len()];
    let mut set = |column: &str, value: String| {
        if let Some(idx) = ITEM_COLUMNS.iter().position(|c| *c == column) {
            cells[idx] = value;
        }
    };

    set("sequence", cell_at(item, &["sequence"]));
    set("service_date", cell_at(item, &["servicedDate"]));
    set("quantity", cell_at(item, &["quantity", "value"]));

    if let Some(coding) = text_at(item, &["productOrService", "coding"])
        .and_then(Value::as_array)
        .and_then(|codings| codings.first())
    {
        set("ndc_code", cell_at(coding, &["code"]));
        set("product_display", cell_at(coding, &["display"]));
    }

    // Every matching coding overwrites: the last match in array order wins.
    let adjudications = item.get("adjudication").and_then(Value::as_array);
    for adjudication in adjudications.into_iter().flatten() {
        let amount = cell_at(adjudication, &["amount", "value"]);
        let codings = text_at(adjudication, &["category", "coding"]).and_then(Value::as_array);
        for coding in codings.into_iter().flatten() {
            let code = coding.get("code").and_then(Value::as_str).unwrap_or("");
            if let Some(field) = category_field(code) {
                set(field, amount.clone());
            }
        }
    }

    cells
}

/// Explodes `source_column` of every row into item lines.
///
/// Rows whose cell is empty, not JSON, or not a JSON array are skipped and
/// counted. `carry_columns` present in `table` are copied in front of the
/// item columns so downstream stages can check row correspondence.
pub fn extract_item_lines(
    table: &ColumnTable,
    source_column: &str,
    carry_columns: &[String],
) -> Result<(ColumnTable, ItemReport)> {
    let source_idx = table.require_column(source_column)?;
    let carried: Vec<(usize, String)> = carry_columns
        .iter()
        .filter_map(|c| table.column_index(c).map(|idx| (idx, c.clone())))
        .collect();

    let mut columns: Vec<String> = carried.iter().map(|(_, name)| name.clone()).collect();
    columns.extend(ITEM_COLUMNS.iter().map(|c| c.to_string()));
    let mut output = ColumnTable::new(columns);
    let mut report = ItemReport::default();

    for (row_idx, row) in table.rows().iter().enumerate() {
        report.rows_read += 1;

        let items = match serde_json::from_str::<Value>(&row[source_idx]) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                tracing::warn!("⚠️ Row {}: '{}' is not a JSON array, skipped", row_idx, source_column);
                report.rows_skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!("⚠️ Error parsing row {}: {}", row_idx, e);
                report.rows_skipped += 1;
                continue;
            }
        };

        for item in &items {
            let mut cells: Vec<String> = carried.iter().map(|(idx, _)| row[*idx].clone()).collect();
            cells.extend(extract_item_line(item));
            output.push_row(cells)?;
            report.lines_emitted += 1;
        }
    }

    Ok((output, report))
}

/// Raw copy of the item column: the verbatim cells as a one-column table, and
/// each cell parsed to JSON (`null` when empty, the original text when it
/// does not parse).
pub fn export_item_column(table: &ColumnTable, source_column: &str) -> Result<(ColumnTable, Vec<Value>)> {
    let idx = table.require_column(source_column)?;
    let mut raw = ColumnTable::new(vec![source_column.to_string()]);
    let mut parsed = Vec::with_capacity(table.len());

    for cell in table.column_values(idx) {
        raw.push_row(vec![cell.to_string()])?;
        let trimmed = cell.trim();
        parsed.push(if trimmed.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(cell.to_string()))
        });
    }

    Ok((raw, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EtlError;
    use serde_json::json;

    fn adjudication(code: &str, amount: f64) -> Value {
        json!({
            "category": {"coding": [{"system": "https://bluebutton.cms.gov/resources/codesystem/adjudication", "code": format!("https://bluebutton.cms.gov/resources/variables/{}", code)}]},
            "amount": {"value": amount, "currency": "USD"}
        })
    }

    fn column(table: &ColumnTable, row: usize, name: &str) -> String {
        table.get(row, name).unwrap().to_string()
    }

    #[test]
    fn test_item_line_fields() {
        let item = json!({
            "sequence": 1,
            "servicedDate": "2020-02-01",
            "quantity": {"value": 30},
            "productOrService": {"coding": [{"code": "00093-0058", "display": "Amoxicillin"}, {"code": "other"}]},
            "adjudication": [
                adjudication("ptnt_pay_amt", 5.0),
                adjudication("tot_rx_cst_amt", 42.17),
                adjudication("unknown_amt", 1.0)
            ]
        });

        let cells = extract_item_line(&item);
        let get = |name: &str| cells[ITEM_COLUMNS.iter().position(|c| *c == name).unwrap()].clone();
        assert_eq!(get("sequence"), "1");
        assert_eq!(get("service_date"), "2020-02-01");
        assert_eq!(get("quantity"), "30");
        assert_eq!(get("ndc_code"), "00093-0058");
        assert_eq!(get("product_display"), "Amoxicillin");
        assert_eq!(get("patient_paid"), "5.0");
        assert_eq!(get("total_drug_cost"), "42.17");
        assert_eq!(get("benefit_amount"), "");
    }

    #[test]
    fn test_last_matching_adjudication_wins() {
        let item = json!({
            "adjudication": [
                {"category": {"coding": [{"code": "cvrd_d_plan_pd_amt"}]}, "amount": {"value": 10}},
                {"category": {"coding": [{"code": "cvrd_d_plan_pd_amt"}]}, "amount": {"value": 20}}
            ]
        });
        let cells = extract_item_line(&item);
        let idx = ITEM_COLUMNS.iter().position(|c| *c == "benefit_amount").unwrap();
        assert_eq!(cells[idx], "20");
    }

    #[test]
    fn test_missing_substructures_are_empty() {
        let cells = extract_item_line(&json!({"sequence": 2, "productOrService": {"coding": []}}));
        assert_eq!(cells[0], "2");
        assert!(cells[1..].iter().all(|c| c.is_empty()));

        let cells = extract_item_line(&json!("not an object"));
        assert!(cells.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_extract_item_lines_skips_bad_rows_and_keeps_order() {
        let table = ColumnTable::with_rows(
            vec!["claim_id".to_string(), "item".to_string()],
            vec![
                vec!["pde-1".to_string(), r#"[{"sequence": 1}, {"sequence": 2}]"#.to_string()],
                vec!["pde-2".to_string(), "{broken".to_string()],
                vec!["pde-3".to_string(), String::new()],
                vec!["pde-4".to_string(), r#"{"sequence": 9}"#.to_string()],
                vec!["pde-5".to_string(), r#"[{"sequence": 1}]"#.to_string()],
            ],
        )
        .unwrap();

        let (lines, report) =
            extract_item_lines(&table, "item", &["claim_id".to_string(), "absent".to_string()]).unwrap();

        assert_eq!(
            report,
            ItemReport {
                rows_read: 5,
                rows_skipped: 3,
                lines_emitted: 3
            }
        );
        assert_eq!(lines.columns()[0], "claim_id");
        assert_eq!(lines.columns().len(), ITEM_COLUMNS.len() + 1);
        assert_eq!(column(&lines, 0, "claim_id"), "pde-1");
        assert_eq!(column(&lines, 1, "sequence"), "2");
        assert_eq!(column(&lines, 2, "claim_id"), "pde-5");
    }

    #[test]
    fn test_missing_source_column_is_fatal() {
        let table = ColumnTable::new(vec!["claim_id".to_string()]);
        assert!(matches!(
            extract_item_lines(&table, "item", &[]),
            Err(EtlError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_export_item_column() {
        let table = ColumnTable::with_rows(
            vec!["item".to_string()],
            vec![
                vec![r#"[{"sequence":1}]"#.to_string()],
                vec![String::new()],
                vec!["[{'python': 'repr'}]".to_string()],
            ],
        )
        .unwrap();

        let (raw, parsed) = export_item_column(&table, "item").unwrap();
        assert_eq!(raw, table);
        assert_eq!(parsed[0], json!([{"sequence": 1}]));
        assert_eq!(parsed[1], Value::Null);
        assert_eq!(parsed[2], json!("[{'python': 'repr'}]"));
    }
}
