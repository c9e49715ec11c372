//! Consumption forecasting from confirmed usage facts.
//!
//! Average daily use (ADU) divides total confirmed quantity by the number of
//! distinct days on which confirmations happened, so a quiet week does not
//! dilute the burn rate of a busy clinic day.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use vetledger_core::{DomainError, DomainResult};
use vetledger_inventory::{ForecastParams, InventoryItemId};

/// One confirmed consumption, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionFact {
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub quantity: i64,
    /// Date the deduction was confirmed, not the appointment date.
    pub confirmed_on: NaiveDate,
}

/// Average daily use of one item: total confirmed quantity divided by the
/// count of distinct confirmation dates. Zero when the item has no history.
pub fn average_daily_use(facts: &[ConsumptionFact], item_id: InventoryItemId) -> f64 {
    let mut total: i64 = 0;
    let mut active_days: BTreeSet<NaiveDate> = BTreeSet::new();

    for fact in facts.iter().filter(|f| f.item_id == item_id) {
        total += fact.quantity;
        active_days.insert(fact.confirmed_on);
    }

    if active_days.is_empty() {
        0.0
    } else {
        total as f64 / active_days.len() as f64
    }
}

/// Stock health classification relative to the reorder point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockHealth {
    /// At or below the reorder point.
    ReorderNow,
    /// Within 20% above the reorder point.
    Monitor,
    Safe,
}

/// Classify current stock against the reorder point.
pub fn classify(stock: i64, reorder_point: i64) -> StockHealth {
    if stock <= reorder_point {
        StockHealth::ReorderNow
    } else if 5 * stock <= 6 * reorder_point {
        StockHealth::Monitor
    } else {
        StockHealth::Safe
    }
}

/// Projected depletion curve of one item at its current burn rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockoutProjection {
    pub current_stock: i64,
    pub daily_use: f64,
    /// Whole days until the projection first reaches zero.
    pub days_until_stockout: i64,
    /// Projected remaining stock for day offsets 0..=days_until_stockout.
    pub curve: Vec<ProjectionPoint>,
    /// Reference line from the item's forecast params, when set.
    pub reorder_point: Option<i64>,
    /// Reference line from the item's forecast params, when set.
    pub safety_stock: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub day_offset: i64,
    pub remaining: f64,
}

/// Project when stock runs out at a constant daily burn rate.
///
/// Fails with `InsufficientData` when the burn rate is zero or negative;
/// no stockout date exists for an item that is never consumed.
pub fn stockout_projection(
    stock: i64,
    daily_use: f64,
    params: Option<ForecastParams>,
) -> DomainResult<StockoutProjection> {
    if daily_use <= 0.0 {
        return Err(DomainError::insufficient_data(
            "no consumption history to project from",
        ));
    }
    let stock = stock.max(0);

    let days_until_stockout = (stock as f64 / daily_use).ceil() as i64;
    let curve = (0..=days_until_stockout)
        .map(|day_offset| ProjectionPoint {
            day_offset,
            remaining: (stock as f64 - daily_use * day_offset as f64).max(0.0),
        })
        .collect();

    Ok(StockoutProjection {
        current_stock: stock,
        daily_use,
        days_until_stockout,
        curve,
        reorder_point: params.map(|p| p.reorder_point),
        safety_stock: params.map(|p| p.safety_stock),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vetledger_core::AggregateId;

    fn item() -> InventoryItemId {
        InventoryItemId::new(AggregateId::new())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn fact(item_id: InventoryItemId, quantity: i64, d: u32) -> ConsumptionFact {
        ConsumptionFact {
            item_id,
            item_name: "Rabies vaccine".to_string(),
            quantity,
            confirmed_on: day(d),
        }
    }

    #[test]
    fn adu_divides_by_distinct_active_days() {
        let id = item();
        // 5 + 3 on the 4th, 4 on the 7th: 12 units over 2 active days.
        let facts = vec![fact(id, 5, 4), fact(id, 3, 4), fact(id, 4, 7)];
        assert!((average_daily_use(&facts, id) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn adu_ignores_other_items_and_defaults_to_zero() {
        let id = item();
        let other = item();
        let facts = vec![fact(other, 50, 4)];
        assert_eq!(average_daily_use(&facts, id), 0.0);
    }

    #[test]
    fn classification_boundaries_around_the_reorder_point() {
        assert_eq!(classify(8, 10), StockHealth::ReorderNow);
        assert_eq!(classify(10, 10), StockHealth::ReorderNow);
        assert_eq!(classify(11, 10), StockHealth::Monitor);
        assert_eq!(classify(12, 10), StockHealth::Monitor);
        assert_eq!(classify(13, 10), StockHealth::Safe);
        assert_eq!(classify(20, 10), StockHealth::Safe);
    }

    #[test]
    fn projection_reaches_zero_and_never_goes_negative() {
        let p = stockout_projection(10, 4.0, None).unwrap();
        assert_eq!(p.days_until_stockout, 3);
        assert_eq!(p.curve.len(), 4);
        assert_eq!(p.curve[0].remaining, 10.0);
        assert_eq!(p.curve[2].remaining, 2.0);
        assert_eq!(p.curve[3].remaining, 0.0);
        assert_eq!(p.reorder_point, None);
        assert_eq!(p.safety_stock, None);
    }

    #[test]
    fn projection_carries_reference_lines_from_forecast_params() {
        let params = ForecastParams {
            reorder_point: 10,
            target_level: 50,
            lead_time_days: 7,
            safety_stock: 5,
        };
        let p = stockout_projection(40, 2.0, Some(params)).unwrap();
        assert_eq!(p.reorder_point, Some(10));
        assert_eq!(p.safety_stock, Some(5));
    }

    #[test]
    fn projection_without_history_is_insufficient_data() {
        let err = stockout_projection(10, 0.0, None).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientData(_)));
    }

    proptest! {
        #[test]
        fn projection_curve_is_monotonically_non_increasing(
            stock in 0i64..10_000,
            daily_use in 0.01f64..500.0,
        ) {
            let p = stockout_projection(stock, daily_use, None).unwrap();
            prop_assert!(p.curve.windows(2).all(|w| w[1].remaining <= w[0].remaining));
            // Less than one day's use remains at the projected stockout day.
            let last = p.curve.last().map(|pt| pt.remaining).unwrap_or(f64::MAX);
            prop_assert!(last < daily_use);
        }

        #[test]
        fn classification_is_total_and_ordered(stock in 0i64..1000, rop in 0i64..1000) {
            let health = classify(stock, rop);
            if stock <= rop {
                prop_assert_eq!(health, StockHealth::ReorderNow);
            } else if 5 * stock <= 6 * rop {
                prop_assert_eq!(health, StockHealth::Monitor);
            } else {
                prop_assert_eq!(health, StockHealth::Safe);
            }
        }
    }
}
