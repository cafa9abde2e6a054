//! Resource flattener: nested FHIR resources -> one wide [`ColumnTable`].

use crate::core::fhir;
use crate::core::normalize::{lookup_path, normalize_all};
use crate::domain::model::{cell_text, ColumnTable};
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How a derived column is computed from the original resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionRule {
    IdentifierSystem { contains: String },
    IdentifierTypeCode { code: String },
    ExtensionValue { url_contains: String },
    RaceText,
    NameUse,
    FamilyName,
    GivenNames,
    AddressState,
    PostalCode,
    City,
    AddressLine,
    Path { path: String },
}

impl ExtractionRule {
    pub fn extract(&self, resource: &Value) -> Option<Value> {
        let identifiers = resource.get("identifier");
        let extensions = resource.get("extension");
        let name = || fhir::first_name_block(resource.get("name"));
        let address = || fhir::first_address_block(resource.get("address"));

        match self {
            ExtractionRule::IdentifierSystem { contains } => {
                fhir::find_identifier_value(identifiers, contains)
            }
            ExtractionRule::IdentifierTypeCode { code } => {
                fhir::find_identifier_by_code(identifiers, code)
            }
            ExtractionRule::ExtensionValue { url_contains } => {
                fhir::extension_value_by_url(extensions, url_contains)
            }
            ExtractionRule::RaceText => fhir::us_core_race_text(extensions).map(Value::String),
            ExtractionRule::NameUse => name()?.name_use.map(Value::String),
            ExtractionRule::FamilyName => name()?.family.map(Value::String),
            ExtractionRule::GivenNames => name()?.given.map(Value::String),
            ExtractionRule::AddressState => address()?.state.map(Value::String),
            ExtractionRule::PostalCode => address()?.postal_code.map(Value::String),
            ExtractionRule::City => address()?.city.map(Value::String),
            ExtractionRule::AddressLine => address()?.line.map(Value::String),
            ExtractionRule::Path { path } => lookup_path(resource, path).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    #[serde(flatten)]
    pub rule: ExtractionRule,
}

impl DerivedColumn {
    pub fn new(name: &str, rule: ExtractionRule) -> Self {
        Self {
            name: name.to_string(),
            rule,
        }
    }
}

/// Keep only rows whose `column` text starts with `prefix` (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtypeFilter {
    pub column: String,
    pub prefix: String,
}

/// Rule set of one flattening stage. An empty `keep_columns` keeps every column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenRules {
    pub rename: HashMap<String, String>,
    pub derived: Vec<DerivedColumn>,
    pub subtype: Option<SubtypeFilter>,
    pub keep_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub datetime_columns: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn renames(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

impl FlattenRules {
    /// Part D (PDE) ExplanationOfBenefit claims.
    pub fn claims() -> Self {
        Self {
            rename: renames(&[
                ("id", "claim_id"),
                ("patient.reference", "patient_ref"),
                ("billablePeriod.start", "period_start"),
                ("billablePeriod.end", "period_end"),
                ("type.text", "claim_type"),
                ("payment.amount.value", "payment_amount"),
            ]),
            // total is an array, so it never shows up as a dotted column
            derived: vec![DerivedColumn::new(
                "total_amount",
                ExtractionRule::Path {
                    path: "total[0].amount.value".to_string(),
                },
            )],
            subtype: Some(SubtypeFilter {
                column: "claim_id".to_string(),
                prefix: "pde".to_string(),
            }),
            keep_columns: strings(&[
                "claim_id",
                "patient_ref",
                "status",
                "created",
                "period_start",
                "period_end",
                "claim_type",
                "total_amount",
                "payment_amount",
                "provider.reference",
                "facility.identifier.value",
                "subType.text",
                "type.coding",
                "item",
                "insurance",
                "benefitBalance",
            ]),
            numeric_columns: strings(&["payment_amount", "total_amount"]),
            datetime_columns: strings(&["period_start", "period_end", "created"]),
        }
    }

    pub fn patients() -> Self {
        let ext = |name: &str, url: &str| {
            DerivedColumn::new(
                name,
                ExtractionRule::ExtensionValue {
                    url_contains: url.to_string(),
                },
            )
        };

        Self {
            rename: renames(&[
                ("id", "patient_id"),
                ("meta.lastUpdated", "meta_lastUpdated"),
                ("birthDate", "birth_date"),
                ("deceasedBoolean", "deceased_boolean"),
            ]),
            derived: vec![
                DerivedColumn::new("name_use", ExtractionRule::NameUse),
                DerivedColumn::new("family_name", ExtractionRule::FamilyName),
                DerivedColumn::new("given_names", ExtractionRule::GivenNames),
                DerivedColumn::new("address_state", ExtractionRule::AddressState),
                DerivedColumn::new("postal_code", ExtractionRule::PostalCode),
                DerivedColumn::new("city", ExtractionRule::City),
                DerivedColumn::new("address_line", ExtractionRule::AddressLine),
                DerivedColumn::new(
                    "bene_id",
                    ExtractionRule::IdentifierSystem {
                        contains: "bene_id".to_string(),
                    },
                ),
                DerivedColumn::new(
                    "mbi",
                    ExtractionRule::IdentifierSystem {
                        contains: "us-mbi".to_string(),
                    },
                ),
                DerivedColumn::new(
                    "identifier_MB",
                    ExtractionRule::IdentifierTypeCode {
                        code: "MB".to_string(),
                    },
                ),
                DerivedColumn::new(
                    "identifier_MC",
                    ExtractionRule::IdentifierTypeCode {
                        code: "MC".to_string(),
                    },
                ),
                ext("us_core_sex_code", "us-core-sex"),
                ext("race_coding", "variables/race"),
                DerivedColumn::new("us_core_race_text", ExtractionRule::RaceText),
                ext("reference_year", "rfrnc_yr"),
                ext("dual_01", "dual_01"),
                ext("dual_02", "dual_02"),
                ext("dual_03", "dual_03"),
            ],
            subtype: None,
            keep_columns: strings(&[
                "patient_id",
                "meta_lastUpdated",
                "bene_id",
                "mbi",
                "identifier_MB",
                "identifier_MC",
                "name_use",
                "family_name",
                "given_names",
                "gender",
                "birth_date",
                "deceased_boolean",
                "address_state",
                "city",
                "postal_code",
                "address_line",
                "us_core_sex_code",
                "race_coding",
                "us_core_race_text",
                "reference_year",
                "dual_01",
                "dual_02",
                "dual_03",
                "identifier",
                "extension",
                "meta",
            ]),
            numeric_columns: Vec::new(),
            datetime_columns: strings(&["birth_date", "meta_lastUpdated"]),
        }
    }
}

/// Which allow-listed columns the data actually produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnReconciliation {
    pub requested: Vec<String>,
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

impl ColumnReconciliation {
    pub fn reconcile(requested: &[String], available: &[String]) -> Self {
        if requested.is_empty() {
            return Self {
                requested: Vec::new(),
                present: available.to_vec(),
                missing: Vec::new(),
            };
        }

        let (present, missing): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|c| available.contains(c));

        Self {
            requested: requested.to_vec(),
            present,
            missing,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlattenReport {
    pub input_resources: usize,
    pub normalized_columns: usize,
    pub rows: usize,
    pub reconciliation: ColumnReconciliation,
}

#[derive(Debug, Clone)]
pub struct FlattenOutput {
    pub table: ColumnTable,
    /// Numeric columns that made it into `table`.
    pub numeric_columns: Vec<String>,
    pub report: FlattenReport,
}

/// Number or null. Integral text stays integral.
pub fn coerce_numeric(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.as_f64().is_some_and(f64::is_finite) => value.clone(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else {
                s.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        _ => Value::Null,
    }
}

/// Canonical date / date-time text, or `None` when unparseable.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
    }

    // FHIR allows partial dates: YYYY and YYYY-MM
    let full = match s.len() {
        4 if s.bytes().all(|b| b.is_ascii_digit()) => format!("{}-01-01", s),
        7 => format!("{}-01", s),
        _ => s.to_string(),
    };
    NaiveDate::parse_from_str(&full, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn coerce_datetime(value: &Value) -> Value {
    value
        .as_str()
        .and_then(normalize_datetime)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Flattens `resources` according to `rules`.
///
/// Steps: normalize, rename, derive, subtype filter, reconcile the
/// allow-list, coerce, stringify.
pub fn flatten_resources(resources: &[Value], rules: &FlattenRules) -> Result<FlattenOutput> {
    let (rows, schema) = normalize_all(resources);
    let normalized_columns = schema.len();

    let rename = |column: &String| rules.rename.get(column).unwrap_or(column).clone();

    let mut columns: Vec<String> = Vec::new();
    for column in schema.iter().map(rename) {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    if !resources.is_empty() {
        for derived in &rules.derived {
            if !columns.contains(&derived.name) {
                columns.push(derived.name.clone());
            }
        }
    }

    let mut rows: Vec<_> = rows
        .into_iter()
        .zip(resources)
        .map(|(row, resource)| {
            let mut renamed: serde_json::Map<String, Value> =
                row.into_iter().map(|(k, v)| (rename(&k), v)).collect();
            for derived in &rules.derived {
                let value = derived.rule.extract(resource).unwrap_or(Value::Null);
                renamed.insert(derived.name.clone(), value);
            }
            renamed
        })
        .collect();

    if let Some(subtype) = &rules.subtype {
        if !rows.is_empty() && !columns.contains(&subtype.column) {
            return Err(EtlError::MissingColumn {
                column: subtype.column.clone(),
                available: columns,
            });
        }
        let before = rows.len();
        rows.retain(|row| {
            row.get(&subtype.column)
                .map(|v| !v.is_null() && cell_text(v).starts_with(&subtype.prefix))
                .unwrap_or(false)
        });
        tracing::info!(
            "🔎 Subtype filter '{}' starts with '{}': {} -> {} rows",
            subtype.column,
            subtype.prefix,
            before,
            rows.len()
        );
    }

    let reconciliation = ColumnReconciliation::reconcile(&rules.keep_columns, &columns);
    if !reconciliation.missing.is_empty() {
        tracing::warn!(
            "⚠️ Requested columns absent from the data: {:?}",
            reconciliation.missing
        );
    }

    let selected = &reconciliation.present;
    let mut table = ColumnTable::new(selected.clone());
    for row in &rows {
        let cells = selected
            .iter()
            .map(|column| {
                let value = row.get(column).unwrap_or(&Value::Null);
                let coerced = if rules.numeric_columns.contains(column) {
                    coerce_numeric(value)
                } else if rules.datetime_columns.contains(column) {
                    coerce_datetime(value)
                } else {
                    value.clone()
                };
                cell_text(&coerced)
            })
            .collect();
        table.push_row(cells)?;
    }

    let numeric_columns = rules
        .numeric_columns
        .iter()
        .filter(|c| selected.contains(c))
        .cloned()
        .collect();

    Ok(FlattenOutput {
        report: FlattenReport {
            input_resources: resources.len(),
            normalized_columns,
            rows: table.len(),
            reconciliation,
        },
        table,
        numeric_columns,
    })
}
