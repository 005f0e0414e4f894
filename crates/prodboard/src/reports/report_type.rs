use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::criteria::CriteriaError;

/// Which named computation a report job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportType {
    HaulingModel,
    MaterialRehandling,
    OperatorPerformance,
}

impl ReportType {
    pub const ALL: [ReportType; 3] = [
        ReportType::HaulingModel,
        ReportType::MaterialRehandling,
        ReportType::OperatorPerformance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::HaulingModel => "hauling-model",
            ReportType::MaterialRehandling => "material-rehandling",
            ReportType::OperatorPerformance => "operator-performance",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportType::HaulingModel => "Hauling model",
            ReportType::MaterialRehandling => "Material rehandling",
            ReportType::OperatorPerformance => "Operator performance",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CriteriaError::UnknownReportType(s.to_string()))
    }
}
