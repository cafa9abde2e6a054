use crate::utils::error::{EtlError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(EtlError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// 檢查輸出檔名的副檔名是否符合該階段的格式
pub fn validate_file_extension(field_name: &str, file: &str, expected: &str) -> Result<()> {
    validate_path(field_name, file)?;

    match std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(extension) if extension.eq_ignore_ascii_case(expected) => Ok(()),
        Some(extension) => Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: format!(
                "Unsupported file extension: {}. Expected: {}",
                extension, expected
            ),
        }),
        None => Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: "File has no extension or invalid filename".to_string(),
        }),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| EtlError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("source.base_url", "https://example.com").is_ok());
        assert!(validate_url("source.base_url", "http://example.com").is_ok());
        assert!(validate_url("source.base_url", "").is_err());
        assert!(validate_url("source.base_url", "invalid-url").is_err());
        assert!(validate_url("source.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("source.page_size", 5, 1).is_ok());
        assert!(validate_positive_number("source.page_size", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("files.claims_csv", "eob.csv", "csv").is_ok());
        assert!(validate_file_extension("files.claims_csv", "eob.CSV", "csv").is_ok());
        assert!(validate_file_extension("files.claims_csv", "eob.json", "csv").is_err());
        assert!(validate_file_extension("files.claims_csv", "eob", "csv").is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let missing: Option<String> = None;
        assert!(matches!(
            validate_required_field("source.token", &missing),
            Err(EtlError::MissingConfigError { .. })
        ));
        let present = Some("abc".to_string());
        assert_eq!(validate_required_field("source.token", &present).unwrap(), "abc");
    }
}
