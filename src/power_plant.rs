use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::enums::PlantKind;
use crate::errors::{GameError, PowerGridResult};

/// Plants visible in the current (purchasable) and future rows before Step 3
pub const MARKET_ROW_SIZE: usize = 4;
/// Purchasable plants once Step 3 merges the rows
pub const STEP_THREE_MARKET_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPlant {
    pub id: u32,
    /// Face value, also the minimum opening bid
    pub cost: u32,
    pub kind: PlantKind,
    /// Units burned per firing
    pub resource_cost: u32,
    /// Cities powered per firing
    pub capacity: u32,
    pub in_market: bool,
}

impl PowerPlant {
    pub fn new(cost: u32, kind: PlantKind, resource_cost: u32, capacity: u32) -> Self {
        Self {
            id: cost,
            cost,
            kind,
            resource_cost,
            capacity,
            in_market: false,
        }
    }

    /// Fuel units this plant can hold
    pub fn storage(&self) -> u32 {
        self.resource_cost * 2
    }
}

/// The base-game deck
pub fn standard_plants() -> Vec<PowerPlant> {
    use PlantKind::*;
    let table: [(u32, PlantKind, u32, u32); 42] = [
        (3, Oil, 2, 1),
        (4, Coal, 2, 1),
        (5, Hybrid, 2, 1),
        (6, Garbage, 1, 1),
        (7, Oil, 3, 2),
        (8, Coal, 3, 2),
        (9, Oil, 1, 1),
        (10, Coal, 2, 2),
        (11, Uranium, 1, 2),
        (12, Hybrid, 2, 2),
        (13, Ecological, 0, 1),
        (14, Garbage, 2, 2),
        (15, Coal, 2, 3),
        (16, Oil, 2, 3),
        (17, Uranium, 1, 2),
        (18, Ecological, 0, 2),
        (19, Garbage, 2, 3),
        (20, Coal, 3, 5),
        (21, Hybrid, 2, 4),
        (22, Ecological, 0, 2),
        (23, Uranium, 1, 3),
        (24, Garbage, 2, 4),
        (25, Coal, 2, 5),
        (26, Oil, 2, 5),
        (27, Ecological, 0, 3),
        (28, Uranium, 1, 4),
        (29, Hybrid, 1, 4),
        (30, Garbage, 3, 6),
        (31, Coal, 3, 6),
        (32, Oil, 3, 6),
        (33, Ecological, 0, 4),
        (34, Uranium, 1, 5),
        (35, Oil, 1, 5),
        (36, Coal, 3, 7),
        (37, Ecological, 0, 4),
        (38, Garbage, 3, 7),
        (39, Uranium, 1, 6),
        (40, Oil, 2, 6),
        (42, Coal, 2, 6),
        (44, Ecological, 0, 5),
        (46, Hybrid, 3, 7),
        (50, Ecological, 0, 6),
    ];
    table
        .iter()
        .map(|&(cost, kind, resource_cost, capacity)| {
            PowerPlant::new(cost, kind, resource_cost, capacity)
        })
        .collect()
}

/// Deck plus market window: a current (purchasable) row, a future row and
/// the face-down draw pile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPlantDeck {
    pub current: Vec<PowerPlant>,
    pub future: Vec<PowerPlant>,
    pub draw_pile: Vec<PowerPlant>,
    pub step_three: bool,
    /// Set when a refill found the draw pile empty
    step_three_due: bool,
}

impl PowerPlantDeck {
    /// Lay out the opening market (the eight cheapest plants) and shuffle the
    /// rest into the draw pile with plant 13 on top.
    pub fn new<R: Rng + ?Sized>(mut plants: Vec<PowerPlant>, rng: &mut R) -> Self {
        plants.sort_by_key(|p| p.cost);
        let window_size = (MARKET_ROW_SIZE * 2).min(plants.len());
        let mut rest = plants.split_off(window_size);
        rest.shuffle(rng);
        if let Some(pos) = rest.iter().position(|p| p.cost == 13) {
            let thirteen = rest.remove(pos);
            rest.push(thirteen);
        }

        let mut deck = Self {
            current: Vec::new(),
            future: Vec::new(),
            draw_pile: rest,
            step_three: false,
            step_three_due: false,
        };
        deck.arrange(plants);
        deck
    }

    fn window_size(&self) -> usize {
        if self.step_three {
            STEP_THREE_MARKET_SIZE
        } else {
            MARKET_ROW_SIZE * 2
        }
    }

    /// Split the window into current/future rows by ascending cost
    fn arrange(&mut self, mut window: Vec<PowerPlant>) {
        window.sort_by_key(|p| p.cost);
        for plant in window.iter_mut() {
            plant.in_market = true;
        }
        if self.step_three {
            self.current = window;
            self.future = Vec::new();
        } else {
            let split = MARKET_ROW_SIZE.min(window.len());
            self.future = window.split_off(split);
            self.current = window;
        }
    }

    fn window(&mut self) -> Vec<PowerPlant> {
        let mut window = std::mem::take(&mut self.current);
        window.append(&mut self.future);
        window
    }

    /// Draw from the pile until the window is full again
    fn refill(&mut self) {
        let mut window = self.window();
        while window.len() < self.window_size() {
            match self.draw_pile.pop() {
                Some(plant) => window.push(plant),
                None => {
                    self.step_three_due = true;
                    break;
                }
            }
        }
        self.arrange(window);
    }

    pub fn purchasable(&self) -> &[PowerPlant] {
        &self.current
    }

    pub fn find_purchasable(&self, plant_id: u32) -> Option<&PowerPlant> {
        self.purchasable().iter().find(|p| p.id == plant_id)
    }

    pub fn draw_pile_len(&self) -> usize {
        self.draw_pile.len()
    }

    /// Remove a purchased plant from the current row and refill the window
    pub fn take(&mut self, plant_id: u32) -> PowerGridResult<PowerPlant> {
        let pos = self
            .current
            .iter()
            .position(|p| p.id == plant_id)
            .ok_or(GameError::PlantNotInMarket { plant_id })?;
        let mut plant = self.current.remove(pos);
        plant.in_market = false;
        self.refill();
        Ok(plant)
    }

    /// Discard the cheapest plant in the market for good
    pub fn remove_lowest(&mut self) -> Option<PowerPlant> {
        if self.current.is_empty() {
            return None;
        }
        let mut plant = self.current.remove(0);
        plant.in_market = false;
        self.refill();
        Some(plant)
    }

    /// Discard current-row plants whose cost does not exceed `max_cities`
    pub fn discard_up_to(&mut self, max_cities: u32) -> Vec<u32> {
        let mut discarded = Vec::new();
        while let Some(lowest) = self.current.first() {
            if lowest.cost > max_cities {
                break;
            }
            match self.remove_lowest() {
                Some(plant) => discarded.push(plant.id),
                None => break,
            }
            if self.step_three_due {
                break;
            }
        }
        discarded
    }

    /// End-of-round rotation before Step 3: the most expensive future plant
    /// goes under the draw pile and a fresh one is drawn.
    pub fn cycle_highest(&mut self) -> Option<u32> {
        let mut plant = self.future.pop()?;
        plant.in_market = false;
        let id = plant.id;
        self.draw_pile.insert(0, plant);
        self.refill();
        Some(id)
    }

    pub fn step_three_due(&self) -> bool {
        self.step_three_due && !self.step_three
    }

    /// Merge the rows into a single six-plant market after dropping the
    /// cheapest plant
    pub fn enter_step_three(&mut self) {
        self.step_three = true;
        self.step_three_due = false;
        let mut window = self.window();
        if !window.is_empty() {
            window.remove(0);
        }
        window.truncate(STEP_THREE_MARKET_SIZE);
        self.arrange(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn deck() -> PowerPlantDeck {
        let mut rng = XorShiftRng::seed_from_u64(7);
        PowerPlantDeck::new(standard_plants(), &mut rng)
    }

    fn ids(plants: &[PowerPlant]) -> Vec<u32> {
        plants.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_opening_window_is_eight_cheapest() {
        let deck = deck();
        assert_eq!(ids(&deck.current), vec![3, 4, 5, 6]);
        assert_eq!(ids(&deck.future), vec![7, 8, 9, 10]);
        assert!(deck.current.iter().all(|p| p.in_market));
        assert_eq!(deck.draw_pile_len(), standard_plants().len() - 8);
        assert_eq!(deck.draw_pile.last().map(|p| p.id), Some(13));
    }

    #[test]
    fn test_take_replaces_from_deck() {
        let mut deck = deck();
        let plant = deck.take(3).unwrap();

        assert_eq!(plant.id, 3);
        assert!(!plant.in_market);
        // 13 was on top of the pile and lands in the future row
        assert_eq!(ids(&deck.current), vec![4, 5, 6, 7]);
        assert_eq!(ids(&deck.future), vec![8, 9, 10, 13]);
    }

    #[test]
    fn test_future_row_not_purchasable() {
        let mut deck = deck();
        assert!(deck.find_purchasable(8).is_none());
        let err = deck.take(8).unwrap_err();
        assert_eq!(err.code(), "PLANT_NOT_IN_MARKET");
    }

    #[test]
    fn test_cycle_highest_moves_plant_under_pile() {
        let mut deck = deck();
        let cycled = deck.cycle_highest().unwrap();
        assert_eq!(cycled, 10);
        assert_eq!(deck.draw_pile.first().map(|p| p.id), Some(10));
        assert_eq!(deck.current.len() + deck.future.len(), 8);
    }

    #[test]
    fn test_discard_up_to_city_count() {
        let mut deck = deck();
        let discarded = deck.discard_up_to(4);
        assert_eq!(discarded, vec![3, 4]);
        assert!(deck.current.iter().all(|p| p.cost > 4));
    }

    #[test]
    fn test_empty_pile_flags_step_three() {
        let mut deck = deck();
        deck.draw_pile.clear();
        deck.take(3).unwrap();
        assert!(deck.step_three_due());

        deck.enter_step_three();
        assert!(deck.step_three);
        assert!(deck.future.is_empty());
        assert_eq!(ids(&deck.current), vec![5, 6, 7, 8, 9, 10]);
        assert!(!deck.step_three_due());
    }
}
