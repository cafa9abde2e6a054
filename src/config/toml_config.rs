use crate::core::flatten::FlattenRules;
use crate::core::merge::MergeOptions;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_positive_number,
    validate_required_field, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://sandbox.bluebutton.cms.gov/v2/fhir";

/// Bearer credential. Never shows up in `Debug` output or serialized config.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Empty, or still an unsubstituted `${VAR}` placeholder.
    pub fn is_unset(&self) -> bool {
        let value = self.0.trim();
        value.is_empty() || (value.starts_with("${") && value.ends_with('}'))
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub files: FilesConfig,
    #[serde(default = "FlattenRules::claims")]
    pub claims: FlattenRules,
    #[serde(default = "FlattenRules::patients")]
    pub patients: FlattenRules,
    pub items: ItemsConfig,
    pub filter: FilterConfig,
    pub merge: MergeOptions,
    pub load: LoadConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            source: SourceConfig::default(),
            files: FilesConfig::default(),
            claims: FlattenRules::claims(),
            patients: FlattenRules::patients(),
            items: ItemsConfig::default(),
            filter: FilterConfig::default(),
            merge: MergeOptions::default(),
            load: LoadConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "bluebutton-part-d".to_string(),
            description: "Blue Button Part D claims and patients to flat tables".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: Option<Secret>,
    pub page_size: usize,
    pub max_pages: usize,
    pub request_delay_ms: u64,
    pub timeout_seconds: u64,
    pub headers: HashMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            page_size: 50,
            max_pages: 1000,
            request_delay_ms: 50,
            timeout_seconds: 30,
            headers: HashMap::new(),
        }
    }
}

/// 各階段的檔名，相對於 `output_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub output_dir: String,
    pub eob_raw_json: String,
    pub patient_raw_json: String,
    pub claims_csv: String,
    pub claims_parquet: String,
    pub claims_filtered_csv: String,
    pub item_raw_csv: String,
    pub item_raw_json: String,
    pub items_csv: String,
    pub final_csv: String,
    pub patients_csv: String,
    pub patients_parquet: String,
    pub archive: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            output_dir: "data".to_string(),
            eob_raw_json: "eob_raw_resources.json".to_string(),
            patient_raw_json: "patient_raw_resources.json".to_string(),
            claims_csv: "eob_part_d_clean.csv".to_string(),
            claims_parquet: "eob_part_d_clean.parquet".to_string(),
            claims_filtered_csv: "eob_part_d_clean_v2.csv".to_string(),
            item_raw_csv: "item_raw.csv".to_string(),
            item_raw_json: "item_raw_resources.json".to_string(),
            items_csv: "item_extracted.csv".to_string(),
            final_csv: "eob_part_d_final.csv".to_string(),
            patients_csv: "patient_clean.csv".to_string(),
            patients_parquet: "patient_clean.parquet".to_string(),
            archive: "bluebutton_output.zip".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    pub source_column: String,
    pub carry_columns: Vec<String>,
    pub export_raw: bool,
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            source_column: "item".to_string(),
            carry_columns: vec!["claim_id".to_string()],
            export_raw: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub exempt_column: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exempt_column: "patient_ref".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub write_parquet: bool,
    /// Zip the final tables plus a metadata.json after `run`.
    pub archive: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            write_parquet: true,
            archive: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl EtlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EtlError::MissingInputFile {
                path: path.display().to_string(),
            },
            _ => EtlError::IoError(e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${BLUE_BUTTON_TOKEN})；未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid placeholder pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Token for the fetch stage. Required only there.
    pub fn token(&self) -> Result<&Secret> {
        let token = self.source.token.as_ref().filter(|t| !t.is_unset());
        validate_required_field("source.token (or --token / BLUE_BUTTON_TOKEN)", &token)
            .copied()
    }

    /// Everything the fetch stage needs on top of [`Validate::validate`].
    pub fn validate_for_fetch(&self) -> Result<()> {
        self.validate()?;
        self.token()?;
        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl Validate for EtlConfig {
    fn validate(&self) -> Result<()> {
        validate_url("source.base_url", &self.source.base_url)?;
        validate_positive_number("source.page_size", self.source.page_size, 1)?;
        validate_positive_number("source.max_pages", self.source.max_pages, 1)?;
        validate_positive_number("source.timeout_seconds", self.source.timeout_seconds as usize, 1)?;

        let files = &self.files;
        validate_path("files.output_dir", &files.output_dir)?;
        for (field, file, extension) in [
            ("files.eob_raw_json", &files.eob_raw_json, "json"),
            ("files.patient_raw_json", &files.patient_raw_json, "json"),
            ("files.claims_csv", &files.claims_csv, "csv"),
            ("files.claims_parquet", &files.claims_parquet, "parquet"),
            ("files.claims_filtered_csv", &files.claims_filtered_csv, "csv"),
            ("files.item_raw_csv", &files.item_raw_csv, "csv"),
            ("files.item_raw_json", &files.item_raw_json, "json"),
            ("files.items_csv", &files.items_csv, "csv"),
            ("files.final_csv", &files.final_csv, "csv"),
            ("files.patients_csv", &files.patients_csv, "csv"),
            ("files.patients_parquet", &files.patients_parquet, "parquet"),
            ("files.archive", &files.archive, "zip"),
        ] {
            validate_file_extension(field, file, extension)?;
        }

        validate_non_empty_string("items.source_column", &self.items.source_column)?;
        validate_non_empty_string("merge.replace_column", &self.merge.replace_column)?;
        if let Some(key) = &self.merge.key_column {
            validate_non_empty_string("merge.key_column", key)?;
        }

        for (field, rules) in [("claims", &self.claims), ("patients", &self.patients)] {
            if let Some(subtype) = &rules.subtype {
                validate_non_empty_string(&format!("{}.subtype.column", field), &subtype.column)?;
            }
            for derived in &rules.derived {
                validate_non_empty_string(&format!("{}.derived.name", field), &derived.name)?;
            }
        }

        Ok(())
    }
}
