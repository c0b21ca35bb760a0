// Player module - seat state for one participant
//
// Money, owned plants, stored fuel and the city network. Fuel storage is
// bounded by plant capacity: each plant holds twice its burn cost, and
// hybrid capacity is shared between coal and oil.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::actions::PlayerId;
use crate::enums::{PlantKind, ResourceType, RESOURCE_TYPES};
use crate::errors::{EconomicError, GameError, PowerGridResult};
use crate::power_plant::PowerPlant;

pub const DEFAULT_MAX_PLANTS: usize = 3;

/// Income by number of cities powered (capped at 20)
pub const PAYOUTS: [u32; 21] = [
    10, 22, 33, 44, 54, 64, 73, 82, 90, 98, 105, 112, 118, 124, 129, 134, 138, 142, 145, 148, 150,
];

pub fn income_for(powered: u32) -> u32 {
    PAYOUTS[(powered as usize).min(PAYOUTS.len() - 1)]
}

/// Fuel burned and cities supplied by a set of plants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuelPlan {
    pub burn: HashMap<ResourceType, u32>,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub money: u32,
    /// Sorted by cost, cheapest first
    pub power_plants: Vec<PowerPlant>,
    pub resources: HashMap<ResourceType, u32>,
    pub cities: BTreeSet<String>,
    pub powered_cities: u32,
    pub current_bid: u32,
    pub has_passed: bool,
    pub has_bought_plant: bool,
    /// Declined to nominate a plant this round
    pub skipped_auction: bool,
    pub connected: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, color: String, money: u32) -> Self {
        Self {
            id,
            name,
            color,
            money,
            power_plants: Vec::new(),
            resources: RESOURCE_TYPES.iter().map(|&r| (r, 0)).collect(),
            cities: BTreeSet::new(),
            powered_cities: 0,
            current_bid: 0,
            has_passed: false,
            has_bought_plant: false,
            skipped_auction: false,
            connected: true,
        }
    }

    pub fn resource(&self, resource: ResourceType) -> u32 {
        self.resources.get(&resource).copied().unwrap_or(0)
    }

    pub fn can_afford(&self, amount: u32) -> bool {
        self.money >= amount
    }

    pub fn ensure_funds(&self, amount: u32) -> Result<(), EconomicError> {
        if !self.can_afford(amount) {
            return Err(EconomicError::InsufficientFunds {
                needed: amount,
                available: self.money,
            });
        }
        Ok(())
    }

    pub fn debit(&mut self, amount: u32) -> Result<(), EconomicError> {
        self.ensure_funds(amount)?;
        self.money -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: u32) {
        self.money += amount;
    }

    pub fn highest_plant_cost(&self) -> u32 {
        self.power_plants.iter().map(|p| p.cost).max().unwrap_or(0)
    }

    pub fn owns_plant(&self, plant_id: u32) -> bool {
        self.power_plants.iter().any(|p| p.id == plant_id)
    }

    /// Add a plant, discarding the cheapest one when over `max_plants`
    pub fn add_power_plant(&mut self, plant: PowerPlant, max_plants: usize) -> Option<PowerPlant> {
        self.power_plants.push(plant);
        self.power_plants.sort_by_key(|p| p.cost);
        if self.power_plants.len() > max_plants.max(1) {
            Some(self.power_plants.remove(0))
        } else {
            None
        }
    }

    pub fn add_city(&mut self, city_id: &str) -> bool {
        self.cities.insert(city_id.to_string())
    }

    pub fn reset_bid(&mut self) {
        self.current_bid = 0;
        self.has_passed = false;
    }

    pub fn reset_round(&mut self) {
        self.reset_bid();
        self.has_bought_plant = false;
        self.skipped_auction = false;
    }

    fn storage_of(&self, kind: PlantKind) -> u32 {
        self.power_plants
            .iter()
            .filter(|p| p.kind == kind)
            .map(PowerPlant::storage)
            .sum()
    }

    /// Units of `resource` that still fit given `holdings`
    fn free_with(&self, holdings: &HashMap<ResourceType, u32>, resource: ResourceType) -> u32 {
        let held = |r: ResourceType| holdings.get(&r).copied().unwrap_or(0);
        let hybrid = self.storage_of(PlantKind::Hybrid);
        match resource {
            ResourceType::Coal | ResourceType::Oil => {
                let (own_kind, other, other_kind) = if resource == ResourceType::Coal {
                    (PlantKind::Coal, ResourceType::Oil, PlantKind::Oil)
                } else {
                    (PlantKind::Oil, ResourceType::Coal, PlantKind::Coal)
                };
                let other_overflow = held(other).saturating_sub(self.storage_of(other_kind));
                (self.storage_of(own_kind) + hybrid)
                    .saturating_sub(other_overflow)
                    .saturating_sub(held(resource))
            }
            ResourceType::Garbage => self
                .storage_of(PlantKind::Garbage)
                .saturating_sub(held(resource)),
            ResourceType::Uranium => self
                .storage_of(PlantKind::Uranium)
                .saturating_sub(held(resource)),
        }
    }

    pub fn free_storage(&self, resource: ResourceType) -> u32 {
        self.free_with(&self.resources, resource)
    }

    /// Check that `additions` fit on top of current holdings
    pub fn check_storage(&self, additions: &HashMap<ResourceType, u32>) -> Result<(), EconomicError> {
        let mut holdings = self.resources.clone();
        for resource in RESOURCE_TYPES {
            let requested = additions.get(&resource).copied().unwrap_or(0);
            if requested == 0 {
                continue;
            }
            let free = self.free_with(&holdings, resource);
            if requested > free {
                return Err(EconomicError::StorageFull {
                    resource,
                    requested,
                    free,
                });
            }
            *holdings.entry(resource).or_insert(0) += requested;
        }
        Ok(())
    }

    pub fn add_resources(&mut self, resource: ResourceType, amount: u32) {
        *self.resources.entry(resource).or_insert(0) += amount;
    }

    pub fn remove_resources(&mut self, resource: ResourceType, amount: u32) -> Result<(), EconomicError> {
        let held = self.resource(resource);
        if held < amount {
            return Err(EconomicError::InsufficientResources {
                resource,
                requested: amount,
                available: held,
            });
        }
        self.resources.insert(resource, held - amount);
        Ok(())
    }

    /// Drop fuel that no longer fits after a plant was discarded. Returns
    /// the removed units.
    pub fn trim_to_storage(&mut self) -> HashMap<ResourceType, u32> {
        let mut overflow = HashMap::new();
        let hybrid = self.storage_of(PlantKind::Hybrid);

        let coal_cap = self.storage_of(PlantKind::Coal) + hybrid;
        let coal = self.resource(ResourceType::Coal).min(coal_cap);
        let coal_in_hybrid = coal.saturating_sub(self.storage_of(PlantKind::Coal));
        let oil_cap = self.storage_of(PlantKind::Oil) + hybrid.saturating_sub(coal_in_hybrid);

        let caps = [
            (ResourceType::Coal, coal_cap),
            (ResourceType::Oil, oil_cap),
            (ResourceType::Garbage, self.storage_of(PlantKind::Garbage)),
            (ResourceType::Uranium, self.storage_of(PlantKind::Uranium)),
        ];
        for (resource, cap) in caps {
            let held = self.resource(resource);
            if held > cap {
                overflow.insert(resource, held - cap);
                self.resources.insert(resource, cap);
            }
        }
        overflow
    }

    /// Work out the fuel needed to fire `plant_ids`. Hybrid plants burn
    /// coal before oil, after dedicated plants have taken their share.
    pub fn fuel_plan(&self, plant_ids: &[u32]) -> PowerGridResult<FuelPlan> {
        let mut seen = HashSet::new();
        let mut plan = FuelPlan::default();
        let mut hybrid_need = 0;

        for &plant_id in plant_ids {
            if !seen.insert(plant_id) {
                return Err(GameError::DuplicatePlant { plant_id }.into());
            }
            let plant = self
                .power_plants
                .iter()
                .find(|p| p.id == plant_id)
                .ok_or(GameError::PlantNotOwned { plant_id })?;

            plan.capacity += plant.capacity;
            match plant.kind {
                PlantKind::Ecological => {}
                PlantKind::Hybrid => hybrid_need += plant.resource_cost,
                kind => {
                    for &fuel in kind.fuels() {
                        *plan.burn.entry(fuel).or_insert(0) += plant.resource_cost;
                    }
                }
            }
        }

        for (&resource, &needed) in &plan.burn {
            let held = self.resource(resource);
            if needed > held {
                return Err(EconomicError::InsufficientResources {
                    resource,
                    requested: needed,
                    available: held,
                }
                .into());
            }
        }

        if hybrid_need > 0 {
            let coal_needed = plan.burn.get(&ResourceType::Coal).copied().unwrap_or(0);
            let oil_needed = plan.burn.get(&ResourceType::Oil).copied().unwrap_or(0);
            let coal_left = self.resource(ResourceType::Coal) - coal_needed;
            let oil_left = self.resource(ResourceType::Oil) - oil_needed;

            let coal_used = coal_left.min(hybrid_need);
            let oil_used = hybrid_need - coal_used;
            if oil_used > oil_left {
                return Err(EconomicError::InsufficientResources {
                    resource: ResourceType::Oil,
                    requested: oil_needed + oil_used,
                    available: self.resource(ResourceType::Oil),
                }
                .into());
            }
            if coal_used > 0 {
                *plan.burn.entry(ResourceType::Coal).or_insert(0) += coal_used;
            }
            if oil_used > 0 {
                *plan.burn.entry(ResourceType::Oil).or_insert(0) += oil_used;
            }
        }

        plan.burn.retain(|_, units| *units > 0);
        Ok(plan)
    }
}
