//! Report catalog: types, their criteria and the computations behind them.

pub mod criteria;
pub mod procedures;
pub mod registry;
pub mod report_type;

pub use criteria::{
    CriteriaError, HaulingModelCriteria, MaterialRehandlingCriteria, OperatorPerformanceCriteria,
    ReportCriteria, Shift,
};
pub use registry::{ReportDefinition, ReportRegistry};
pub use report_type::ReportType;
