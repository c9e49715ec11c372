//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections here are rebuildable from the event stream and
//! idempotent, so at-least-once delivery is safe.

pub mod consumption_log;
pub mod cursor;
pub mod directory;
pub mod stock_levels;

pub use consumption_log::{ConsumptionLog, ConsumptionLogError};
pub use cursor::{CursorDecision, CursorError, StreamCursors};
pub use directory::{AppointmentDirectory, DirectoryProjectionError};
pub use stock_levels::{StockLevel, StockLevels, StockProjectionError};
