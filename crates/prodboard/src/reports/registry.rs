//! Registry of report types: criteria schema plus named computation per type.

use std::collections::HashMap;

use serde_json::Value;

use crate::db::Procedure;
use crate::error::ConfigError;

use super::criteria::{CriteriaError, ReportCriteria};
use super::procedures::procedure_for;
use super::ReportType;

const HAULING_MODEL_SCHEMA: &str = include_str!("../../../../schema/criteria/hauling-model.json");
const MATERIAL_REHANDLING_SCHEMA: &str =
    include_str!("../../../../schema/criteria/material-rehandling.json");
const OPERATOR_PERFORMANCE_SCHEMA: &str =
    include_str!("../../../../schema/criteria/operator-performance.json");

fn schema_source(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::HaulingModel => HAULING_MODEL_SCHEMA,
        ReportType::MaterialRehandling => MATERIAL_REHANDLING_SCHEMA,
        ReportType::OperatorPerformance => OPERATOR_PERFORMANCE_SCHEMA,
    }
}

/// Everything needed to accept and run one report type.
pub struct ReportDefinition {
    pub report_type: ReportType,
    pub procedure: &'static Procedure,
    validator: jsonschema::Validator,
}

impl ReportDefinition {
    fn compile(report_type: ReportType) -> Result<Self, ConfigError> {
        let schema: Value =
            serde_json::from_str(schema_source(report_type)).map_err(|e| ConfigError::Validation {
                message: format!("Invalid embedded schema for '{}': {}", report_type, e),
            })?;
        let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
            message: format!("Failed to compile schema for '{}': {}", report_type, e),
        })?;

        Ok(Self {
            report_type,
            procedure: procedure_for(report_type),
            validator,
        })
    }

    /// Schema check, then typed deserialization, then semantic checks.
    pub fn validate(&self, criteria: &Value) -> Result<ReportCriteria, CriteriaError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(criteria)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(CriteriaError::Schema {
                report_type: self.report_type,
                errors: errors.join("; "),
            });
        }

        ReportCriteria::from_json(self.report_type, criteria.clone())
    }
}

/// Report definitions keyed by report type.
pub struct ReportRegistry {
    definitions: HashMap<ReportType, ReportDefinition>,
}

impl ReportRegistry {
    /// Compiles the embedded criteria schema of every report type.
    pub fn new() -> Result<Self, ConfigError> {
        let mut definitions = HashMap::new();
        for report_type in ReportType::ALL {
            definitions.insert(report_type, ReportDefinition::compile(report_type)?);
        }
        Ok(Self { definitions })
    }

    pub fn definition(&self, report_type: ReportType) -> Option<&ReportDefinition> {
        self.definitions.get(&report_type)
    }

    /// Resolves `report_type` and validates `criteria` against its schema.
    pub fn validate(&self, report_type: &str, criteria: &Value) -> Result<ReportCriteria, CriteriaError> {
        let report_type: ReportType = report_type.parse()?;
        self.validate_typed(report_type, criteria)
    }

    pub fn validate_typed(
        &self,
        report_type: ReportType,
        criteria: &Value,
    ) -> Result<ReportCriteria, CriteriaError> {
        let definition = self
            .definition(report_type)
            .ok_or_else(|| CriteriaError::UnknownReportType(report_type.to_string()))?;
        definition.validate(criteria)
    }

    pub fn report_types(&self) -> Vec<ReportType> {
        let mut types: Vec<_> = self.definitions.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ReportRegistry {
        ReportRegistry::new().expect("embedded schemas compile")
    }

    #[test]
    fn test_every_type_registered() {
        assert_eq!(registry().report_types().len(), ReportType::ALL.len());
    }

    #[test]
    fn test_valid_criteria() {
        let criteria = registry()
            .validate(
                "material-rehandling",
                &json!({"fromDate": "2024-01-01", "toDate": "2024-01-31"}),
            )
            .unwrap();
        assert_eq!(criteria.report_type(), ReportType::MaterialRehandling);
    }

    #[test]
    fn test_missing_required_field() {
        let err = registry()
            .validate("hauling-model", &json!({"fromDate": "2024-01-01"}))
            .unwrap_err();
        match err {
            CriteriaError::Schema { errors, .. } => assert!(errors.contains("toDate")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_types_and_unknown_fields() {
        let reg = registry();
        let wrong_type = reg.validate(
            "operator-performance",
            &json!({"fromDate": "2024-01-01", "toDate": "2024-01-31", "operatorId": "seven"}),
        );
        assert!(matches!(wrong_type, Err(CriteriaError::Schema { .. })));

        let unknown = reg.validate(
            "material-rehandling",
            &json!({"fromDate": "2024-01-01", "toDate": "2024-01-31", "crew": "B"}),
        );
        assert!(matches!(unknown, Err(CriteriaError::Schema { .. })));

        let bad_shift = reg.validate(
            "hauling-model",
            &json!({"fromDate": "2024-01-01", "toDate": "2024-01-31", "shift": "swing"}),
        );
        assert!(matches!(bad_shift, Err(CriteriaError::Schema { .. })));

        let not_object = reg.validate("hauling-model", &json!(["2024-01-01"]));
        assert!(matches!(not_object, Err(CriteriaError::Schema { .. })));
    }

    #[test]
    fn test_date_pattern_enforced() {
        let err = registry()
            .validate(
                "hauling-model",
                &json!({"fromDate": "01/01/2024", "toDate": "2024-01-31"}),
            )
            .unwrap_err();
        assert!(matches!(err, CriteriaError::Schema { .. }));
    }

    #[test]
    fn test_unknown_report_type() {
        let err = registry()
            .validate("fuel-burn", &json!({"fromDate": "2024-01-01", "toDate": "2024-01-31"}))
            .unwrap_err();
        assert_eq!(err, CriteriaError::UnknownReportType("fuel-burn".to_string()));
    }

    #[test]
    fn test_definition_links_procedure() {
        let reg = registry();
        let def = reg.definition(ReportType::OperatorPerformance).unwrap();
        assert_eq!(def.procedure.name, "operator_performance");
        assert_eq!(def.procedure.results.len(), 2);
    }
}
