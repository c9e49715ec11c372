use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vetledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use vetledger_events::Event;

/// Inventory item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Optional stock-depletion forecasting parameters for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastParams {
    /// Stock threshold below which restocking is due (ROP).
    pub reorder_point: i64,
    pub target_level: i64,
    pub lead_time_days: u32,
    pub safety_stock: i64,
}

impl ForecastParams {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.reorder_point < 0 || self.target_level < 0 || self.safety_stock < 0 {
            return Err(DomainError::validation(
                "forecast parameters cannot be negative",
            ));
        }
        Ok(())
    }
}

/// Aggregate root: InventoryItem.
///
/// Holds catalog data and the staff-managed stock record. Administrative
/// operations only ever increase stock or set it outright (a physical count
/// override); clinical deductions are applied downstream from confirmed
/// consumption events, never through this aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    name: String,
    category: String,
    /// Unit price in minor currency units.
    price: i64,
    expiry: Option<NaiveDate>,
    stock: i64,
    forecast: Option<ForecastParams>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            name: String::new(),
            category: String::new(),
            price: 0,
            expiry: None,
            stock: 0,
            forecast: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        self.expiry
    }

    /// Staff-recorded stock level (before clinical consumption is applied).
    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn forecast(&self) -> Option<ForecastParams> {
        self.forecast
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: String,
    pub price: i64,
    pub expiry: Option<NaiveDate>,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestockItem (administrative increase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockItem {
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStockLevel (physical count override).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockLevel {
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetForecastParams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetForecastParams {
    pub item_id: InventoryItemId,
    pub params: ForecastParams,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterItem(RegisterItem),
    RestockItem(RestockItem),
    SetStockLevel(SetStockLevel),
    SetForecastParams(SetForecastParams),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: String,
    pub price: i64,
    pub expiry: Option<NaiveDate>,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRestocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRestocked {
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockLevelSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelSet {
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ForecastParamsSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastParamsSet {
    pub item_id: InventoryItemId,
    pub params: ForecastParams,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemRegistered(ItemRegistered),
    ItemRestocked(ItemRestocked),
    StockLevelSet(StockLevelSet),
    ForecastParamsSet(ForecastParamsSet),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemRegistered(_) => "inventory.item.registered",
            InventoryEvent::ItemRestocked(_) => "inventory.item.restocked",
            InventoryEvent::StockLevelSet(_) => "inventory.item.stock_level_set",
            InventoryEvent::ForecastParamsSet(_) => "inventory.item.forecast_params_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemRegistered(e) => e.occurred_at,
            InventoryEvent::ItemRestocked(e) => e.occurred_at,
            InventoryEvent::StockLevelSet(e) => e.occurred_at,
            InventoryEvent::ForecastParamsSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.price = e.price;
                self.expiry = e.expiry;
                self.stock = e.initial_stock;
                self.created = true;
            }
            InventoryEvent::ItemRestocked(e) => {
                self.stock += e.quantity;
            }
            InventoryEvent::StockLevelSet(e) => {
                self.stock = e.quantity;
            }
            InventoryEvent::ForecastParamsSet(e) => {
                self.forecast = Some(e.params);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterItem(cmd) => self.handle_register(cmd),
            InventoryCommand::RestockItem(cmd) => self.handle_restock(cmd),
            InventoryCommand::SetStockLevel(cmd) => self.handle_set_level(cmd),
            InventoryCommand::SetForecastParams(cmd) => self.handle_set_params(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_item_id(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::validation("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.price < 0 {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }

        Ok(vec![InventoryEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            name: cmd.name.clone(),
            category: cmd.category.clone(),
            price: cmd.price,
            expiry: cmd.expiry,
            initial_stock: cmd.initial_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restock(&self, cmd: &RestockItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("restock quantity must be positive"));
        }

        Ok(vec![InventoryEvent::ItemRestocked(ItemRestocked {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_level(&self, cmd: &SetStockLevel) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity < 0 {
            return Err(DomainError::validation("stock level cannot be negative"));
        }

        Ok(vec![InventoryEvent::StockLevelSet(StockLevelSet {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_params(
        &self,
        cmd: &SetForecastParams,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;
        cmd.params.validate()?;

        Ok(vec![InventoryEvent::ForecastParamsSet(ForecastParamsSet {
            item_id: cmd.item_id,
            params: cmd.params,
            occurred_at: cmd.occurred_at,
        })])
    }
}
