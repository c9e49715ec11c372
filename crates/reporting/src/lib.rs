//! Reporting over read-model rows: revenue attribution and consumption
//! forecasting. Everything here is pure computation over plain data; the
//! infra crate supplies the rows from its projections.

pub mod forecast;
pub mod revenue;

pub use forecast::{
    average_daily_use, classify, stockout_projection, ConsumptionFact, ProjectionPoint,
    StockHealth, StockoutProjection,
};
pub use revenue::{
    recognized_revenue, service_distribution, Bucket, Granularity, ReportPeriod, RevenuePoint,
    ServiceShare, DAY_BUCKET_MAX_DAYS,
};
