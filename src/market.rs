// Resource market - price ladders for coal, oil, garbage and uranium
//
// Each ladder is indexed by unit price and holds the number of units
// available at that price. Buyers drain the ladder from the most expensive
// occupied slot downward, refills land on the cheapest slots first.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::enums::{ResourceType, RESOURCE_TYPES};
use crate::errors::{EconomicError, GameError, PowerGridResult};

/// Tokens of each type in the whole game (market + supply + players)
pub fn total_tokens(resource: ResourceType) -> u32 {
    match resource {
        ResourceType::Coal | ResourceType::Oil | ResourceType::Garbage => 24,
        ResourceType::Uranium => 12,
    }
}

/// Units added back to the market at the end of each round, indexed by
/// [player count 2..=6][step 1..=3] as (coal, oil, garbage, uranium).
const REPLENISH_RATES: [[(u32, u32, u32, u32); 3]; 5] = [
    [(3, 2, 1, 1), (4, 2, 2, 1), (3, 4, 3, 1)],
    [(4, 2, 1, 1), (5, 3, 2, 1), (3, 4, 3, 1)],
    [(5, 3, 2, 1), (6, 4, 3, 2), (4, 5, 4, 2)],
    [(5, 4, 3, 2), (7, 5, 3, 3), (5, 6, 5, 2)],
    [(7, 5, 3, 2), (9, 6, 5, 3), (6, 7, 6, 3)],
];

pub fn replenish_rate(resource: ResourceType, step: u8, players: usize) -> u32 {
    let row = players.clamp(2, 6) - 2;
    let col = (step.clamp(1, 3) - 1) as usize;
    let (coal, oil, garbage, uranium) = REPLENISH_RATES[row][col];
    match resource {
        ResourceType::Coal => coal,
        ResourceType::Oil => oil,
        ResourceType::Garbage => garbage,
        ResourceType::Uranium => uranium,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLadder {
    /// Units available, indexed by unit price. Index 0 is never used.
    pub slots: Vec<u32>,
    /// Price points printed on the board, ascending
    pub prices: Vec<u32>,
    pub max_per_slot: u32,
}

impl PriceLadder {
    fn new(prices: Vec<u32>, max_per_slot: u32) -> Self {
        let top = prices.iter().copied().max().unwrap_or(0) as usize;
        Self {
            slots: vec![0; top + 1],
            prices,
            max_per_slot,
        }
    }

    fn seeded(prices: Vec<u32>, max_per_slot: u32, seed: &[(u32, u32)]) -> Self {
        let mut ladder = Self::new(prices, max_per_slot);
        for &(price, units) in seed {
            ladder.slots[price as usize] = units.min(max_per_slot);
        }
        ladder
    }

    pub fn available(&self) -> u32 {
        self.slots.iter().sum()
    }

    pub fn capacity(&self) -> u32 {
        self.prices.len() as u32 * self.max_per_slot
    }

    /// Price of taking `amount` units, most expensive first, without
    /// touching the ladder. None when the ladder runs dry.
    fn quote(&self, amount: u32) -> Option<u32> {
        let mut remaining = amount;
        let mut cost = 0;
        for &price in self.prices.iter().rev() {
            if remaining == 0 {
                break;
            }
            let take = self.slots[price as usize].min(remaining);
            cost += take * price;
            remaining -= take;
        }
        (remaining == 0).then_some(cost)
    }

    fn take(&mut self, amount: u32) -> u32 {
        let mut remaining = amount;
        let mut cost = 0;
        for &price in self.prices.iter().rev() {
            if remaining == 0 {
                break;
            }
            let slot = &mut self.slots[price as usize];
            let take = (*slot).min(remaining);
            *slot -= take;
            cost += take * price;
            remaining -= take;
        }
        cost
    }

    fn fill(&mut self, amount: u32) -> u32 {
        let mut remaining = amount;
        for &price in &self.prices {
            if remaining == 0 {
                break;
            }
            let slot = &mut self.slots[price as usize];
            let room = self.max_per_slot.saturating_sub(*slot);
            let add = room.min(remaining);
            *slot += add;
            remaining -= add;
        }
        amount - remaining
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMarket {
    pub coal: PriceLadder,
    pub oil: PriceLadder,
    pub garbage: PriceLadder,
    pub uranium: PriceLadder,
    /// Tokens off the board, available for replenishment
    pub supply: HashMap<ResourceType, u32>,
}

impl Default for ResourceMarket {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMarket {
    /// Standard opening market
    pub fn new() -> Self {
        let one_to_eight: Vec<u32> = (1..=8).collect();
        let mut uranium_prices = one_to_eight.clone();
        uranium_prices.extend([10, 12, 14, 16]);

        let mut market = Self {
            coal: PriceLadder::seeded(one_to_eight.clone(), 3, &seed_range(3..=8, 3)),
            oil: PriceLadder::seeded(one_to_eight.clone(), 3, &seed_range(3..=8, 3)),
            garbage: PriceLadder::seeded(one_to_eight, 3, &seed_range(4..=8, 3)),
            uranium: PriceLadder::seeded(
                uranium_prices,
                1,
                &[(10, 1), (12, 1), (14, 1), (16, 1)],
            ),
            supply: HashMap::new(),
        };
        for resource in RESOURCE_TYPES {
            let off_board = total_tokens(resource) - market.available(resource);
            market.supply.insert(resource, off_board);
        }
        market
    }

    pub fn ladder(&self, resource: ResourceType) -> &PriceLadder {
        match resource {
            ResourceType::Coal => &self.coal,
            ResourceType::Oil => &self.oil,
            ResourceType::Garbage => &self.garbage,
            ResourceType::Uranium => &self.uranium,
        }
    }

    fn ladder_mut(&mut self, resource: ResourceType) -> &mut PriceLadder {
        match resource {
            ResourceType::Coal => &mut self.coal,
            ResourceType::Oil => &mut self.oil,
            ResourceType::Garbage => &mut self.garbage,
            ResourceType::Uranium => &mut self.uranium,
        }
    }

    pub fn available(&self, resource: ResourceType) -> u32 {
        self.ladder(resource).available()
    }

    pub fn supply(&self, resource: ResourceType) -> u32 {
        self.supply.get(&resource).copied().unwrap_or(0)
    }

    /// Cost of buying `amount` units of `resource`, consumed from the
    /// highest occupied price downward.
    pub fn get_cost(&self, resource: ResourceType, amount: u32) -> PowerGridResult<u32> {
        if amount == 0 {
            return Err(GameError::InvalidAmount { amount }.into());
        }
        let ladder = self.ladder(resource);
        ladder.quote(amount).ok_or_else(|| {
            EconomicError::InsufficientResources {
                resource,
                requested: amount,
                available: ladder.available(),
            }
            .into()
        })
    }

    /// Remove `amount` units from the ladder and return what they cost
    pub fn buy(&mut self, resource: ResourceType, amount: u32) -> PowerGridResult<u32> {
        let cost = self.get_cost(resource, amount)?;
        let taken = self.ladder_mut(resource).take(amount);
        debug_assert_eq!(cost, taken);
        Ok(cost)
    }

    /// Move up to `amount` units from the supply onto the cheapest free
    /// slots. Returns the number of units actually placed.
    pub fn replenish(&mut self, resource: ResourceType, amount: u32) -> u32 {
        let budget = amount.min(self.supply(resource));
        let added = self.ladder_mut(resource).fill(budget);
        if let Some(supply) = self.supply.get_mut(&resource) {
            *supply -= added;
        }
        added
    }

    /// End-of-round refill for every resource type
    pub fn replenish_for(&mut self, step: u8, players: usize) -> HashMap<ResourceType, u32> {
        RESOURCE_TYPES
            .iter()
            .map(|&resource| {
                let rate = replenish_rate(resource, step, players);
                (resource, self.replenish(resource, rate))
            })
            .collect()
    }

    /// Burned or discarded tokens go back to the bank
    pub fn return_to_supply(&mut self, resource: ResourceType, amount: u32) {
        *self.supply.entry(resource).or_insert(0) += amount;
    }
}

fn seed_range(prices: std::ops::RangeInclusive<u32>, units: u32) -> Vec<(u32, u32)> {
    prices.map(|price| (price, units)).collect()
}
