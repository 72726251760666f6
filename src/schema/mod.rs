/// JSON Schema 2020-12定義モジュール。
///
/// LLMプロバイダーとの契約をJSON Schemaで定義し、実行時に検証を行います。
pub(crate) mod summary;

use jsonschema::Draft;
use serde_json::Value;

/// スキーマ検証結果。
#[derive(Debug)]
pub(crate) struct ValidationResult {
    pub(crate) valid: bool,
    pub(crate) errors: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// JSON Schemaでデータを検証する。
///
/// # Arguments
/// * `schema_json` - JSON Schema定義（JSON形式）
/// * `instance` - 検証対象のデータ（JSON形式）
///
/// # Returns
/// 検証結果
pub(crate) fn validate_json(schema_json: &Value, instance: &Value) -> ValidationResult {
    match jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema_json)
    {
        Ok(validator) => {
            let errors: Vec<String> = validator
                .iter_errors(instance)
                .map(|e| format!("{e} at {}", e.instance_path))
                .collect();
            if errors.is_empty() {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid(errors)
            }
        }
        Err(e) => ValidationResult::invalid(vec![format!("schema compilation error: {e}")]),
    }
}
