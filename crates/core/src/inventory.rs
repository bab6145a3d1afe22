//! Blood unit inventory snapshot.
//!
//! Unit statuses are stored as free text. They are normalised once here, and a unit still
//! marked valid after its expiry time is reported as expired.

use crate::constants::NOT_AVAILABLE;
use crate::records::{BloodUnitRecord, DonorRecord};
use bloodbank_types::BloodType;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    Valid,
    HandedOver,
    Disposed,
    Used,
    Reserved,
    Quarantined,
    Expired,
    Buffer,
}

impl UnitStatus {
    /// Unrecognised or missing text is `Valid`.
    pub fn normalise(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default().trim().to_ascii_lowercase().as_str() {
            "handed_over" | "handed over" => UnitStatus::HandedOver,
            "disposed" => UnitStatus::Disposed,
            "used" => UnitStatus::Used,
            "reserved" => UnitStatus::Reserved,
            "quarantined" => UnitStatus::Quarantined,
            "expired" => UnitStatus::Expired,
            "buffer" => UnitStatus::Buffer,
            _ => UnitStatus::Valid,
        }
    }

    /// Normalised status at `now`.
    pub fn of(unit: &BloodUnitRecord, now: DateTime<Utc>) -> Self {
        match UnitStatus::normalise(unit.status.as_deref()) {
            UnitStatus::Valid if unit.expires_at.is_some_and(|exp| now > exp) => UnitStatus::Expired,
            status => status,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Valid => "Valid",
            UnitStatus::HandedOver => "Handed Over",
            UnitStatus::Disposed => "Disposed",
            UnitStatus::Used => "Used",
            UnitStatus::Reserved => "Reserved",
            UnitStatus::Quarantined => "Quarantined",
            UnitStatus::Expired => "Expired",
            UnitStatus::Buffer => "Buffer",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryUnit {
    pub unit: BloodUnitRecord,
    pub status: UnitStatus,
    pub blood_type: Option<BloodType>,
    /// "Surname, First Middle" of the donor, or "N/A".
    pub donor_name: String,
}

impl InventoryUnit {
    pub fn is_buffer(&self) -> bool {
        self.status == UnitStatus::Buffer
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventorySnapshot {
    /// Non-buffer units, in input order.
    pub active: Vec<InventoryUnit>,
    pub buffer: Vec<InventoryUnit>,
    /// Valid non-buffer units.
    pub in_stock: usize,
    /// Valid non-buffer units per blood type, in [`BloodType::ALL`] order.
    pub by_blood_type: Vec<(BloodType, usize)>,
    /// Distinct donors with at least one unit on record.
    pub donors_received: usize,
}

pub fn inventory_snapshot(
    units: Vec<BloodUnitRecord>,
    donors: &[DonorRecord],
    now: DateTime<Utc>,
) -> InventorySnapshot {
    let names: HashMap<&str, String> = donors
        .iter()
        .map(|d| (d.donor_id.as_str(), d.full_name()))
        .collect();

    let mut seen_donors: HashSet<String> = HashSet::new();
    let mut per_type: HashMap<BloodType, usize> = HashMap::new();
    let mut active = Vec::new();
    let mut buffer = Vec::new();
    let mut in_stock = 0;

    for unit in units {
        if let Some(donor_id) = unit.donor_id.as_deref() {
            seen_donors.insert(donor_id.to_string());
        }
        let blood_type = unit.blood_type.as_deref().and_then(|t| t.parse().ok());
        let donor_name = unit
            .donor_id
            .as_deref()
            .and_then(|id| names.get(id).cloned())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let item = InventoryUnit {
            status: UnitStatus::of(&unit, now),
            unit,
            blood_type,
            donor_name,
        };

        if item.is_buffer() {
            buffer.push(item);
            continue;
        }
        if item.status == UnitStatus::Valid {
            in_stock += 1;
            if let Some(t) = item.blood_type {
                *per_type.entry(t).or_default() += 1;
            }
        }
        active.push(item);
    }

    InventorySnapshot {
        active,
        buffer,
        in_stock,
        by_blood_type: BloodType::ALL
            .into_iter()
            .map(|t| (t, per_type.get(&t).copied().unwrap_or(0)))
            .collect(),
        donors_received: seen_donors.len(),
    }
}
