use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::VehicleType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub locations: Vec<Location>,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub bus: VehicleSlot,
    #[serde(default)]
    pub mobil: VehicleSlot,
    #[serde(default)]
    pub motor: VehicleSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<String>,
    #[serde(default)]
    pub validation_issues: u64,
}

impl Location {
    pub fn slot(&self, vehicle_type: VehicleType) -> &VehicleSlot {
        match vehicle_type {
            VehicleType::Bus => &self.bus,
            VehicleType::Mobil => &self.mobil,
            VehicleType::Motor => &self.motor,
        }
    }

    pub fn slot_mut(&mut self, vehicle_type: VehicleType) -> &mut VehicleSlot {
        match vehicle_type {
            VehicleType::Bus => &mut self.bus,
            VehicleType::Mobil => &mut self.mobil,
            VehicleType::Motor => &mut self.motor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSlot {
    #[serde(default)]
    pub total: Value,
    #[serde(default)]
    pub available: Value,
}

impl VehicleSlot {
    pub fn counts(total: i64, available: i64) -> Self {
        Self {
            total: Value::from(total),
            available: Value::from(available),
        }
    }

    pub fn set_counts(&mut self, total: i64, available: i64) {
        self.total = Value::from(total);
        self.available = Value::from(available);
    }
}

impl Default for VehicleSlot {
    fn default() -> Self {
        Self::counts(0, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub total_capacity: i64,
    pub total_available: i64,
    pub overall_utilization: f64,
    pub by_type: BTreeMap<VehicleType, TypeStatistics>,
    pub location_count: usize,
    pub issue_count: u64,
    pub fix_count: u64,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    pub update_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeStatistics {
    pub capacity: i64,
    pub available: i64,
    pub utilization: f64,
}

pub fn utilization(total: i64, available: i64) -> f64 {
    if total > 0 {
        (total - available) as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
