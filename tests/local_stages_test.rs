use anyhow::Result;
use bluebutton_etl::app::pipelines::{FlattenPipeline, MergePipeline, PathExtractPipeline};
use bluebutton_etl::core::table_io::read_csv;
use bluebutton_etl::{EtlConfig, EtlEngine, EtlError, LocalStorage};
use serde_json::json;
use tempfile::TempDir;

fn write_json(dir: &TempDir, name: &str, value: &serde_json::Value) -> Result<()> {
    std::fs::write(dir.path().join(name), serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

#[tokio::test]
async fn test_patient_table_from_local_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_json(
        &temp_dir,
        "patient_raw_resources.json",
        &json!([{
            "resourceType": "Patient",
            "id": "-20140000008325",
            "meta": {"lastUpdated": "2023-04-12T14:02:11.123-04:00"},
            "identifier": [
                {"system": "https://bluebutton.cms.gov/resources/variables/bene_id", "value": "-20140000008325"},
                {
                    "type": {"coding": [{"code": "MC"}]},
                    "system": "http://hl7.org/fhir/sid/us-mbi",
                    "value": "1S00E00AA00"
                }
            ],
            "extension": [{
                "url": "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race",
                "extension": [
                    {"url": "ombCategory", "valueCoding": {"code": "2106-3"}},
                    {"url": "text", "valueString": "White"}
                ]
            }],
            "name": [{"use": "usual", "family": "Doe", "given": ["Jane", "X"]}],
            "gender": "female",
            "birthDate": "1999-06",
            "address": [{"state": "PA", "postalCode": "12345", "city": "Pittsburgh", "line": ["1 Main St", "Apt 2"]}]
        }]),
    )?;

    let config = EtlConfig::default();
    let storage = LocalStorage::new(temp_dir.path());
    let result = EtlEngine::new(FlattenPipeline::patients(storage, &config)).run().await?;

    assert_eq!(result.stage_name, "flatten_patients");
    assert_eq!(result.records, 1);

    let table = read_csv(&std::fs::read(temp_dir.path().join("patient_clean.csv"))?)?;
    assert_eq!(table.columns()[0], "patient_id");
    assert_eq!(table.get(0, "bene_id"), Some("-20140000008325"));
    assert_eq!(table.get(0, "mbi"), Some("1S00E00AA00"));
    assert_eq!(table.get(0, "identifier_MC"), Some("1S00E00AA00"));
    assert_eq!(table.get(0, "us_core_race_text"), Some("White"));
    assert_eq!(table.get(0, "given_names"), Some("Jane X"));
    assert_eq!(table.get(0, "address_line"), Some("1 Main St Apt 2"));
    assert_eq!(table.get(0, "birth_date"), Some("1999-06-01"));
    Ok(())
}

#[tokio::test]
async fn test_extract_path_writes_next_to_input() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_json(
        &temp_dir,
        "eob.json",
        &json!([
            {"id": "pde--1", "supportingInfo": [{"sequence": 1, "code": {"text": "refill"}}]},
            {"id": "pde--2", "contained": [{"supportingInfo": "inline"}]}
        ]),
    )?;

    let storage = LocalStorage::new(temp_dir.path());
    let pipeline = PathExtractPipeline::new(storage, "eob.json".to_string(), "supportingInfo".to_string(), None);
    let result = EtlEngine::new(pipeline).run().await?;

    assert_eq!(result.output_path, "eob_supportingInfo.csv");
    assert_eq!(result.records, 2);

    let table = read_csv(&std::fs::read(temp_dir.path().join("eob_supportingInfo.csv"))?)?;
    assert_eq!(table.columns(), &["path".to_string(), "value".to_string()]);
    assert_eq!(table.get(0, "path"), Some("[0].supportingInfo"));
    assert_eq!(table.get(1, "path"), Some("[1].contained[0].supportingInfo"));
    assert_eq!(table.get(1, "value"), Some("inline"));
    Ok(())
}

#[tokio::test]
async fn test_merge_rejects_misaligned_tables() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(
        temp_dir.path().join("eob_part_d_clean_v2.csv"),
        "claim_id,item,status\npde--1,[],active\npde--2,[],active\n",
    )?;
    std::fs::write(
        temp_dir.path().join("item_extracted.csv"),
        "claim_id,ndc_code\npde--1,00093-0058\n",
    )?;

    let config = EtlConfig::default();
    let storage = LocalStorage::new(temp_dir.path());
    let result = EtlEngine::new(MergePipeline::from_config(storage.clone(), &config)).run().await;

    assert!(matches!(result, Err(EtlError::RowCountMismatch { left: 2, right: 1 })));
    assert!(!temp_dir.path().join("eob_part_d_final.csv").exists());

    // same row count, different claim order
    std::fs::write(
        temp_dir.path().join("item_extracted.csv"),
        "claim_id,ndc_code\npde--2,00781-1506\npde--1,00093-0058\n",
    )?;
    let result = EtlEngine::new(MergePipeline::from_config(storage, &config)).run().await;
    match result {
        Err(EtlError::RowKeyMismatch { row, column, .. }) => {
            assert_eq!(row, 0);
            assert_eq!(column, "claim_id");
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.records)),
    }
    Ok(())
}
