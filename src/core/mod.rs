mod dataset;
mod error;
mod issue;
mod parse;
mod report;
mod vehicle;

pub use dataset::{Dataset, Location, Statistics, TypeStatistics, VehicleSlot, utilization};
pub use error::PipelineError;
pub use issue::{Fix, Issue, Recommendation, Severity};
pub use parse::{ParsedInt, coerce_int, safe_parse_int};
pub use report::{Environment, LocationRank, Report, ReportSummary, SeverityCounts};
pub use vehicle::VehicleType;
