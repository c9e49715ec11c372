//! Inventory domain module (event-sourced).
//!
//! This crate contains business rules for the clinic's inventory catalog and
//! staff-managed stock record, implemented purely as deterministic domain
//! logic (no IO, no storage). Clinical stock deductions are derived from
//! confirmed consumption events elsewhere.

pub mod item;

pub use item::{
    ForecastParams, ForecastParamsSet, InventoryCommand, InventoryEvent, InventoryItem,
    InventoryItemId, ItemRegistered, ItemRestocked, RegisterItem, RestockItem, SetForecastParams,
    SetStockLevel, StockLevelSet,
};
