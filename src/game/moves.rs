use log::info;
use std::collections::HashMap;

use super::Game;
use crate::actions::GameEvent;
use crate::enums::{GamePhase, ResourceType, RESOURCE_TYPES};
use crate::errors::{GameError, PowerGridResult};
use crate::player::income_for;

impl Game {
    /// Buy a basket of resources in one go. Nothing is bought unless the
    /// whole basket is available, affordable and fits in storage.
    pub fn buy_resources(
        &mut self,
        player_id: &str,
        resources: &HashMap<ResourceType, u32>,
    ) -> PowerGridResult<Vec<GameEvent>> {
        self.ensure_turn(player_id)?;
        if resources.is_empty() {
            return Err(GameError::InvalidAmount { amount: 0 }.into());
        }

        let mut total = 0;
        for resource in RESOURCE_TYPES {
            if let Some(&amount) = resources.get(&resource) {
                total += self.market.get_cost(resource, amount)?;
            }
        }
        let player = self.player(player_id)?;
        player.check_storage(resources)?;
        player.ensure_funds(total)?;

        for resource in RESOURCE_TYPES {
            if let Some(&amount) = resources.get(&resource) {
                self.market.buy(resource, amount)?;
            }
        }
        let player = self.player_mut(player_id)?;
        player.debit(total)?;
        for (&resource, &amount) in resources {
            player.add_resources(resource, amount);
        }
        info!("🛒 {} bought {:?} for {}", player_id, resources, total);

        Ok(vec![GameEvent::ResourcesBought {
            player_id: player_id.to_string(),
            resources: resources.clone(),
            cost: total,
        }])
    }

    pub fn build_city(&mut self, player_id: &str, city_id: &str) -> PowerGridResult<Vec<GameEvent>> {
        self.ensure_turn(player_id)?;
        self.map.city(city_id)?;
        let player = self.player(player_id)?;
        if player.cities.contains(city_id) {
            return Err(GameError::CityAlreadyOwned {
                player_id: player_id.to_string(),
                city_id: city_id.to_string(),
            }
            .into());
        }
        let cost = self.map.build_cost(&player.cities, city_id, self.step)?;
        player.ensure_funds(cost)?;

        self.map.occupy(city_id, player_id)?;
        let player = self.player_mut(player_id)?;
        player.debit(cost)?;
        player.add_city(city_id);
        info!("🏙️ {} built in {} for {}", player_id, city_id, cost);

        Ok(vec![GameEvent::CityBuilt {
            player_id: player_id.to_string(),
            city_id: city_id.to_string(),
            cost,
        }])
    }

    /// Fire the chosen plants, collect income and pass the turn
    pub fn power_cities(&mut self, player_id: &str, plant_ids: &[u32]) -> PowerGridResult<Vec<GameEvent>> {
        self.ensure_turn(player_id)?;
        let player = self.player(player_id)?;
        let plan = player.fuel_plan(plant_ids)?;
        let powered = plan.capacity.min(player.cities.len() as u32);

        let player = self.player_mut(player_id)?;
        for (&resource, &units) in &plan.burn {
            player.remove_resources(resource, units)?;
        }
        for (resource, units) in plan.burn {
            self.market.return_to_supply(resource, units);
        }
        Ok(self.collect_income(player_id, powered))
    }

    fn collect_income(&mut self, player_id: &str, powered: u32) -> Vec<GameEvent> {
        let income = income_for(powered);
        if let Some(player) = self.players.get_mut(player_id) {
            player.powered_cities = powered;
            player.credit(income);
        }
        info!("⚡ {} powered {} cities, earned {}", player_id, powered, income);

        let mut events = vec![GameEvent::CitiesPowered {
            player_id: player_id.to_string(),
            powered,
            income,
        }];
        events.extend(self.end_player_turn());
        events
    }

    /// END_TURN means something different in every phase
    pub(super) fn end_turn(&mut self, player_id: &str) -> PowerGridResult<Vec<GameEvent>> {
        match self.current_phase {
            GamePhase::PlayerOrder => {
                self.ensure_turn(player_id)?;
                Ok(self.advance_phase())
            }
            GamePhase::Auction => self.skip_auction(player_id),
            GamePhase::BuyResources | GamePhase::BuildCities => {
                self.ensure_turn(player_id)?;
                Ok(self.end_player_turn())
            }
            GamePhase::Bureaucracy => {
                self.ensure_turn(player_id)?;
                Ok(self.collect_income(player_id, 0))
            }
            GamePhase::GameEnd => Err(GameError::wrong_phase("END_TURN", self.current_phase).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{PlayerAction, PlayerId};
    use crate::config::GameRules;
    use crate::map::germany;
    use crate::power_plant::standard_plants;

    fn plant(id: u32) -> crate::power_plant::PowerPlant {
        standard_plants().into_iter().find(|p| p.id == id).unwrap()
    }

    /// Two-player game advanced to `phase` with nobody owning anything
    fn game_in(phase: GamePhase) -> (Game, Vec<PlayerId>) {
        let rules = GameRules {
            seed: Some(9),
            ..GameRules::default()
        };
        let mut game = Game::new("g1".into(), "Moves".into(), germany(), 6, rules).unwrap();
        game.add_player("a", "a", None).unwrap();
        game.add_player("b", "b", None).unwrap();
        game.start().unwrap();
        while game.current_phase != phase {
            let current = game.current_player_id().cloned().unwrap();
            game.process_action(&current, PlayerAction::EndTurn).unwrap();
        }
        let order = game.turn_order.clone();
        (game, order)
    }

    #[test]
    fn test_buy_resources_all_or_nothing() {
        let (mut game, order) = game_in(GamePhase::BuyResources);
        let buyer = order[1].clone();
        game.players.get_mut(&buyer).unwrap().add_power_plant(plant(4), 3);

        // uranium has nowhere to go, so the coal is not bought either
        let basket = HashMap::from([(ResourceType::Coal, 2), (ResourceType::Uranium, 1)]);
        let before = game.snapshot();
        let err = game.buy_resources(&buyer, &basket).unwrap_err();
        assert_eq!(err.code(), "STORAGE_FULL");
        assert_eq!(game.snapshot(), before);

        let basket = HashMap::from([(ResourceType::Coal, 2)]);
        game.buy_resources(&buyer, &basket).unwrap();
        let player = &game.players[&buyer];
        assert_eq!(player.resource(ResourceType::Coal), 2);
        assert_eq!(player.money, 50 - 16);
        assert_eq!(game.market.available(ResourceType::Coal), 16);
    }

    #[test]
    fn test_buy_rejects_zero() {
        let (mut game, order) = game_in(GamePhase::BuyResources);
        let err = game
            .buy_resources(&order[1], &HashMap::from([(ResourceType::Oil, 0)]))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
        let err = game.buy_resources(&order[1], &HashMap::new()).unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }

    #[test]
    fn test_reverse_order_turns() {
        let (mut game, order) = game_in(GamePhase::BuyResources);
        let err = game.process_action(&order[0], PlayerAction::EndTurn).unwrap_err();
        assert_eq!(err.code(), "NOT_YOUR_TURN");
        game.process_action(&order[1], PlayerAction::EndTurn).unwrap();
        game.process_action(&order[0], PlayerAction::EndTurn).unwrap();
        assert_eq!(game.current_phase, GamePhase::BuildCities);
    }

    #[test]
    fn test_build_first_city_then_connect() {
        let (mut game, order) = game_in(GamePhase::BuildCities);
        let builder = order[1].clone();

        game.build_city(&builder, "essen").unwrap();
        assert_eq!(game.players[&builder].money, 40);
        // essen -> duisburg is free to connect
        game.build_city(&builder, "duisburg").unwrap();
        assert_eq!(game.players[&builder].money, 30);

        let err = game.build_city(&builder, "essen").unwrap_err();
        assert_eq!(err.code(), "CITY_ALREADY_OWNED");
        assert_eq!(game.map.cities["essen"].slots, vec![builder.clone()]);
    }

    #[test]
    fn test_city_full_in_step_one() {
        let (mut game, order) = game_in(GamePhase::BuildCities);
        game.build_city(&order[1], "kiel").unwrap();
        game.process_action(&order[1], PlayerAction::EndTurn).unwrap();

        let err = game.build_city(&order[0], "kiel").unwrap_err();
        assert_eq!(err.code(), "CITY_FULL");
        let err = game.build_city(&order[0], "nowhere").unwrap_err();
        assert_eq!(err.code(), "CITY_NOT_FOUND");
    }

    #[test]
    fn test_power_cities_pays_and_burns() {
        let (mut game, order) = game_in(GamePhase::Bureaucracy);
        let first = order[0].clone();
        {
            let player = game.players.get_mut(&first).unwrap();
            player.add_power_plant(plant(4), 3);
            player.add_power_plant(plant(13), 3);
            player.add_resources(ResourceType::Coal, 3);
            player.add_city("essen");
            player.add_city("duisburg");
        }
        let supply_before = game.market.supply(ResourceType::Coal);

        let events = game
            .process_action(
                &first,
                PlayerAction::PowerCities {
                    power_plants: vec![4, 13],
                },
            )
            .unwrap();

        let player = &game.players[&first];
        // capacity 2 but only two cities
        assert_eq!(player.powered_cities, 2);
        assert_eq!(player.money, 50 + 33);
        assert_eq!(player.resource(ResourceType::Coal), 1);
        assert_eq!(game.market.supply(ResourceType::Coal), supply_before + 2);
        assert!(events.contains(&GameEvent::CitiesPowered {
            player_id: first.clone(),
            powered: 2,
            income: 33,
        }));
        assert_eq!(game.current_player_id(), Some(&order[1]));
    }

    #[test]
    fn test_power_cities_without_fuel_changes_nothing() {
        let (mut game, order) = game_in(GamePhase::Bureaucracy);
        game.players
            .get_mut(&order[0])
            .unwrap()
            .add_power_plant(plant(4), 3);
        let before = game.snapshot();

        let err = game
            .process_action(
                &order[0],
                PlayerAction::PowerCities {
                    power_plants: vec![4],
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_RESOURCES");
        assert_eq!(game.snapshot(), before);
    }

    #[test]
    fn test_wrong_phase_rejected() {
        let (mut game, order) = game_in(GamePhase::BuyResources);
        let err = game
            .process_action(
                &order[1],
                PlayerAction::BuildCity {
                    city_id: "essen".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "WRONG_PHASE");
    }
}
