//! Lookups over repeated / optional FHIR substructures.
//!
//! All functions take the parent array as `Option<&Value>` (the resource may
//! not have it) and answer `None` when the target cannot be found. None of
//! them fail.

use serde_json::Value;

pub const US_CORE_RACE_URL: &str = "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race";

fn entries(array: Option<&Value>) -> &[Value] {
    array
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// `value` of the first identifier whose `system` contains `system_substr`.
pub fn find_identifier_value(identifiers: Option<&Value>, system_substr: &str) -> Option<Value> {
    entries(identifiers)
        .iter()
        .find(|ident| str_field(ident, "system").unwrap_or("").contains(system_substr))
        .and_then(|ident| ident.get("value").cloned())
}

/// `value` of the first identifier carrying a `type.coding` entry with `code`.
pub fn find_identifier_by_code(identifiers: Option<&Value>, code: &str) -> Option<Value> {
    entries(identifiers)
        .iter()
        .find(|ident| {
            entries(ident.get("type").and_then(|t| t.get("coding")))
                .iter()
                .any(|coding| str_field(coding, "code") == Some(code))
        })
        .and_then(|ident| ident.get("value").cloned())
}

/// Value of the first extension whose `url` contains `url_substr`.
///
/// FHIR stores the payload under a `value[x]` key (`valueCoding`,
/// `valueDate`, ...); when there is none but the extension nests its own
/// `extension` array (us-core-race style), that array is returned instead.
pub fn extension_value_by_url(extensions: Option<&Value>, url_substr: &str) -> Option<Value> {
    let ext = entries(extensions)
        .iter()
        .find(|e| str_field(e, "url").unwrap_or("").contains(url_substr))?;
    let obj = ext.as_object()?;

    obj.iter()
        .find(|(key, _)| key.starts_with("value"))
        .map(|(_, v)| v.clone())
        .or_else(|| obj.get("extension").filter(|v| v.is_array()).cloned())
}

/// Human readable race from the `text` sub-extension of us-core-race.
pub fn us_core_race_text(extensions: Option<&Value>) -> Option<String> {
    entries(extensions)
        .iter()
        .filter(|e| str_field(e, "url") == Some(US_CORE_RACE_URL))
        .flat_map(|e| entries(e.get("extension")))
        .find(|nested| str_field(nested, "url") == Some("text"))
        .and_then(|nested| str_field(nested, "valueString"))
        .map(str::to_string)
}

/// Joins a list of strings with a space; a bare string is passed through.
fn joined(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameBlock {
    pub name_use: Option<String>,
    pub family: Option<String>,
    pub given: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBlock {
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub line: Option<String>,
}

/// Projection of the first `name` entry; further names are ignored.
pub fn first_name_block(names: Option<&Value>) -> Option<NameBlock> {
    let name = entries(names).first()?;
    Some(NameBlock {
        name_use: str_field(name, "use").map(str::to_string),
        family: str_field(name, "family").map(str::to_string),
        given: joined(name.get("given")),
    })
}

/// Projection of the first `address` entry; further addresses are ignored.
pub fn first_address_block(addresses: Option<&Value>) -> Option<AddressBlock> {
    let address = entries(addresses).first()?;
    Some(AddressBlock {
        state: str_field(address, "state").map(str::to_string),
        postal_code: str_field(address, "postalCode").map(str::to_string),
        city: str_field(address, "city").map(str::to_string),
        line: joined(address.get("line")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "-20140000008325",
            "identifier": [
                {
                    "system": "https://bluebutton.cms.gov/resources/variables/bene_id",
                    "value": "-20140000008325"
                },
                {
                    "type": {"coding": [{"system": "http://terminology.hl7.org/CodeSystem/v2-0203", "code": "MC"}]},
                    "system": "http://hl7.org/fhir/sid/us-mbi",
                    "value": "1S00E00AA00"
                }
            ],
            "extension": [
                {
                    "url": "https://bluebutton.cms.gov/resources/variables/race",
                    "valueCoding": {"code": "1", "display": "White"}
                },
                {
                    "url": US_CORE_RACE_URL,
                    "extension": [
                        {"url": "ombCategory", "valueCoding": {"code": "2106-3"}},
                        {"url": "text", "valueString": "White"}
                    ]
                },
                {
                    "url": "https://bluebutton.cms.gov/resources/variables/rfrnc_yr",
                    "valueDate": "2014"
                }
            ],
            "name": [
                {"use": "usual", "family": "Doe", "given": ["Jane", "X"]},
                {"use": "old", "family": "Smith"}
            ],
            "address": [{"state": "MA", "postalCode": "02110", "city": "Boston", "line": ["1 Main St", "Apt 2"]}]
        })
    }

    #[test]
    fn test_identifier_by_system_substring() {
        let ids = json!([{"system": "https://x/bene_id/y", "value": "X"}]);
        assert_eq!(find_identifier_value(Some(&ids), "bene_id"), Some(json!("X")));
        assert_eq!(find_identifier_value(Some(&ids), "nope"), None);
    }

    #[test]
    fn test_identifier_by_type_code() {
        let p = patient();
        assert_eq!(
            find_identifier_by_code(p.get("identifier"), "MC"),
            Some(json!("1S00E00AA00"))
        );
        assert_eq!(find_identifier_by_code(p.get("identifier"), "MB"), None);

        let odd = json!([{"type": {"coding": {"code": "MC"}}, "value": "v"}]);
        assert_eq!(find_identifier_by_code(Some(&odd), "MC"), None);
    }

    #[test]
    fn test_extension_value_choice_and_nested() {
        let p = patient();
        let exts = p.get("extension");
        assert_eq!(
            extension_value_by_url(exts, "variables/race"),
            Some(json!({"code": "1", "display": "White"}))
        );
        assert_eq!(extension_value_by_url(exts, "rfrnc_yr"), Some(json!("2014")));

        let nested = extension_value_by_url(exts, "us-core-race").unwrap();
        assert!(nested.is_array());
        assert_eq!(nested.as_array().unwrap().len(), 2);

        assert_eq!(extension_value_by_url(exts, "dual_01"), None);
    }

    #[test]
    fn test_race_text() {
        let p = patient();
        assert_eq!(us_core_race_text(p.get("extension")), Some("White".to_string()));
        assert_eq!(us_core_race_text(Some(&json!([]))), None);
    }

    #[test]
    fn test_first_blocks() {
        let p = patient();
        assert_eq!(
            first_name_block(p.get("name")),
            Some(NameBlock {
                name_use: Some("usual".to_string()),
                family: Some("Doe".to_string()),
                given: Some("Jane X".to_string()),
            })
        );
        let address = first_address_block(p.get("address")).unwrap();
        assert_eq!(address.line.as_deref(), Some("1 Main St Apt 2"));
        assert_eq!(address.postal_code.as_deref(), Some("02110"));
    }

    #[test]
    fn test_absent_or_empty_arrays_are_missing() {
        let bare = json!({"resourceType": "Patient", "id": "1"});
        assert_eq!(find_identifier_value(bare.get("identifier"), "bene_id"), None);
        assert_eq!(find_identifier_by_code(bare.get("identifier"), "MB"), None);
        assert_eq!(extension_value_by_url(bare.get("extension"), "race"), None);
        assert_eq!(us_core_race_text(bare.get("extension")), None);
        assert_eq!(first_name_block(bare.get("name")), None);
        assert_eq!(first_address_block(Some(&json!([]))), None);
        assert_eq!(first_address_block(Some(&json!("not-a-list"))), None);
    }
}
