//! Typed filter criteria, one variant per report type.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Params;

use super::ReportType;

/// Longest date range a single report may cover, inclusive.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Why a set of criteria was rejected. No job is created for rejected criteria.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CriteriaError {
    #[error("Unknown report type '{0}'")]
    UnknownReportType(String),

    #[error("Criteria for '{report_type}' failed schema validation: {errors}")]
    Schema {
        report_type: ReportType,
        errors: String,
    },

    #[error("Criteria for '{report_type}' are malformed: {reason}")]
    Malformed {
        report_type: ReportType,
        reason: String,
    },

    #[error("fromDate {from} is after toDate {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("Date range {from}..{to} spans {days} days, more than the {max} allowed")]
    RangeTooLong {
        from: NaiveDate,
        to: NaiveDate,
        days: i64,
        max: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Day,
    Night,
}

impl Shift {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Day => "day",
            Shift::Night => "night",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HaulingModelCriteria {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<Shift>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MaterialRehandlingCriteria {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperatorPerformanceCriteria {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<Shift>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<i64>,
}

/// Validated criteria for one report job.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportCriteria {
    HaulingModel(HaulingModelCriteria),
    MaterialRehandling(MaterialRehandlingCriteria),
    OperatorPerformance(OperatorPerformanceCriteria),
}

impl ReportCriteria {
    /// Deserializes schema-checked JSON into the variant for `report_type`.
    pub(crate) fn from_json(
        report_type: ReportType,
        value: serde_json::Value,
    ) -> Result<Self, CriteriaError> {
        let malformed = |e: serde_json::Error| CriteriaError::Malformed {
            report_type,
            reason: e.to_string(),
        };
        let criteria = match report_type {
            ReportType::HaulingModel => {
                ReportCriteria::HaulingModel(serde_json::from_value(value).map_err(malformed)?)
            }
            ReportType::MaterialRehandling => {
                ReportCriteria::MaterialRehandling(serde_json::from_value(value).map_err(malformed)?)
            }
            ReportType::OperatorPerformance => ReportCriteria::OperatorPerformance(
                serde_json::from_value(value).map_err(malformed)?,
            ),
        };
        criteria.check_range()?;
        Ok(criteria)
    }

    pub fn report_type(&self) -> ReportType {
        match self {
            ReportCriteria::HaulingModel(_) => ReportType::HaulingModel,
            ReportCriteria::MaterialRehandling(_) => ReportType::MaterialRehandling,
            ReportCriteria::OperatorPerformance(_) => ReportType::OperatorPerformance,
        }
    }

    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        match self {
            ReportCriteria::HaulingModel(c) => (c.from_date, c.to_date),
            ReportCriteria::MaterialRehandling(c) => (c.from_date, c.to_date),
            ReportCriteria::OperatorPerformance(c) => (c.from_date, c.to_date),
        }
    }

    /// Parameters for the report's named computation.
    pub fn to_params(&self) -> Params {
        let (from, to) = self.date_range();
        let params = Params::new().with("from_date", from).with("to_date", to);
        match self {
            ReportCriteria::HaulingModel(c) => params
                .with("shift", c.shift.map(|s| s.as_str()))
                .with("material", c.material.clone()),
            ReportCriteria::MaterialRehandling(c) => params.with("material", c.material.clone()),
            ReportCriteria::OperatorPerformance(c) => params
                .with("shift", c.shift.map(|s| s.as_str()))
                .with("operator_id", c.operator_id),
        }
    }

    /// Canonical JSON form stored on the job.
    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            ReportCriteria::HaulingModel(c) => serde_json::to_value(c),
            ReportCriteria::MaterialRehandling(c) => serde_json::to_value(c),
            ReportCriteria::OperatorPerformance(c) => serde_json::to_value(c),
        };
        // Plain structs of dates, strings and integers always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    fn check_range(&self) -> Result<(), CriteriaError> {
        let (from, to) = self.date_range();
        if from > to {
            return Err(CriteriaError::InvertedRange { from, to });
        }
        let days = (to - from).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(CriteriaError::RangeTooLong {
                from,
                to,
                days,
                max: MAX_RANGE_DAYS,
            });
        }
        Ok(())
    }
}
