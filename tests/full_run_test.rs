use anyhow::Result;
use bluebutton_etl::{EtlConfig, EtlError, EtlSequence, LocalStorage};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn part_d_claim(id: &str, patient: &str, ndc: &str, cost: f64) -> Value {
    json!({
        "resourceType": "ExplanationOfBenefit",
        "id": id,
        "status": "active",
        "created": "2021-06-01T00:00:00-04:00",
        "patient": {"reference": patient},
        "billablePeriod": {"start": "2021-05-01", "end": "2021-05-01"},
        "type": {"coding": [{"code": "PDE"}], "text": "Part D"},
        "total": [{"amount": {"value": cost}}],
        "item": [{
            "sequence": 1,
            "servicedDate": "2021-05-01",
            "quantity": {"value": 30},
            "productOrService": {"coding": [{"system": "http://hl7.org/fhir/sid/ndc", "code": ndc, "display": "Drug"}]},
            "adjudication": [
                {"category": {"coding": [{"code": "https://bluebutton.cms.gov/resources/variables/tot_rx_cst_amt"}]}, "amount": {"value": cost}},
                {"category": {"coding": [{"code": "https://bluebutton.cms.gov/resources/variables/cvrd_d_plan_pd_amt"}]}, "amount": {"value": cost - 2.0}}
            ]
        }]
    })
}

/// 模擬 Blue Button sandbox：EOB 兩頁、Patient 一頁
fn mock_blue_button(server: &MockServer) -> (httpmock::Mock<'_>, httpmock::Mock<'_>, httpmock::Mock<'_>) {
    let eob_page_2 = server.url("/v2/fhir/ExplanationOfBenefit/?startIndex=2&cursor=abc");

    let eob_first = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/fhir/ExplanationOfBenefit/")
            .query_param("_count", "2")
            .header("authorization", "Bearer sandbox-token");
        then.status(200).json_body(json!({
            "resourceType": "Bundle",
            "total": 3,
            "link": [{"relation": "next", "url": eob_page_2}],
            "entry": [
                {"resource": part_d_claim("pde--1001", "Patient/-10000000000001", "00093-0058", 12.5)},
                {"resource": {"resourceType": "ExplanationOfBenefit", "id": "carrier--5", "status": "active"}}
            ]
        }));
    });
    let eob_second = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/fhir/ExplanationOfBenefit/")
            .query_param("cursor", "abc")
            .header("authorization", "Bearer sandbox-token");
        then.status(200).json_body(json!({
            "resourceType": "Bundle",
            "entry": [{"resource": part_d_claim("pde--1002", "Patient/-10000000000002", "00781-1506", 40.0)}]
        }));
    });
    let patients = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/fhir/Patient/")
            .header("authorization", "Bearer sandbox-token");
        then.status(200).json_body(json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {
                    "resourceType": "Patient",
                    "id": "-10000000000001",
                    "identifier": [{"system": "https://bluebutton.cms.gov/resources/variables/bene_id", "value": "-10000000000001"}],
                    "name": [{"use": "usual", "family": "Doe", "given": ["Jane", "Q"]}],
                    "gender": "female",
                    "birthDate": "1948-02-29"
                }}
            ]
        }));
    });

    (eob_first, eob_second, patients)
}

#[tokio::test]
async fn test_full_run_from_toml_config() -> Result<()> {
    let server = MockServer::start();
    let (eob_first, eob_second, patients) = mock_blue_button(&server);

    let temp_dir = TempDir::new()?;
    let output_dir = temp_dir.path().to_string_lossy().replace('\\', "/");
    std::env::set_var("BBETL_IT_TOKEN", "sandbox-token");

    let mut config_file = NamedTempFile::new()?;
    write!(
        config_file,
        r#"
[pipeline]
name = "integration"

[source]
base_url = "{}"
token = "${{BBETL_IT_TOKEN}}"
page_size = 2
request_delay_ms = 0

[files]
output_dir = "{}"

[load]
archive = true
"#,
        server.url("/v2/fhir"),
        output_dir
    )?;

    let config = EtlConfig::from_file(config_file.path())?;
    let storage = LocalStorage::new(config.files.output_dir.clone());
    let results = EtlSequence::new(storage, config).execute_all(false).await?;

    eob_first.assert();
    eob_second.assert();
    patients.assert();

    assert_eq!(results.len(), 7);
    assert_eq!(results[0].records, 3);

    let raw: Value = serde_json::from_slice(&std::fs::read(temp_dir.path().join("eob_raw_resources.json"))?)?;
    assert_eq!(raw.as_array().map(|a| a.len()), Some(3));

    let mut reader = csv::Reader::from_path(temp_dir.path().join("eob_part_d_final.csv"))?;
    let headers = reader.headers()?.clone();
    let rows: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
    assert_eq!(rows.len(), 2);

    let column = |name: &str| headers.iter().position(|h| h == name);
    assert!(column("item").is_none());
    assert!(column("sequence").is_none());
    let claim_id = column("claim_id").expect("claim_id column");
    let ndc = column("ndc_code").expect("ndc_code column");
    let benefit = column("benefit_amount").expect("benefit_amount column");
    assert_eq!(&rows[0][claim_id], "pde--1001");
    assert_eq!(&rows[1][ndc], "00781-1506");
    assert_eq!(&rows[1][benefit], "38.0");

    assert!(temp_dir.path().join("patient_clean.csv").exists());
    assert!(temp_dir.path().join("item_raw_resources.json").exists());
    assert!(temp_dir.path().join("bluebutton_output.zip").exists());

    std::env::remove_var("BBETL_IT_TOKEN");
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_fetch_aborts_run() -> Result<()> {
    let server = MockServer::start();
    let denied = server.mock(|when, then| {
        when.method(GET).path("/v2/fhir/ExplanationOfBenefit/");
        then.status(401).json_body(json!({"detail": "Authentication credentials were not provided."}));
    });

    let temp_dir = TempDir::new()?;
    let mut config = EtlConfig::default();
    config.source.base_url = server.url("/v2/fhir");
    config.source.token = Some("expired".to_string().into());
    config.source.request_delay_ms = 0;

    let storage = LocalStorage::new(temp_dir.path());
    let result = EtlSequence::new(storage, config).execute_all(false).await;

    denied.assert_hits(1);
    match result {
        Err(EtlError::TransformationError { stage, details }) => {
            assert_eq!(stage, "fetch_eob");
            assert!(details.contains("No bundle could be fetched"));
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
    }
    assert!(!temp_dir.path().join("eob_raw_resources.json").exists());
    Ok(())
}
