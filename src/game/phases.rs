// Phase machine: turn bookkeeping, phase transitions, step changes and the
// end-of-round sequence.

use itertools::Itertools;
use log::info;
use std::cmp::Reverse;

use super::{AuctionState, Game};
use crate::actions::{GameEvent, PlayerId};
use crate::enums::{GamePhase, GameStatus};
use crate::errors::{GameError, PowerGridResult};

impl Game {
    /// Seat whose turn it is in the current phase. Buying and building run
    /// in reverse turn order.
    pub(super) fn seat_to_act(&self) -> Option<&PlayerId> {
        let len = self.turn_order.len();
        if len == 0 || self.current_turn >= len {
            return None;
        }
        let index = if self.current_phase.is_reverse_order() {
            len - 1 - self.current_turn
        } else {
            self.current_turn
        };
        self.turn_order.get(index)
    }

    /// Player expected to act next: the bidder on turn while an auction is
    /// running, the seat on turn otherwise.
    pub fn current_player_id(&self) -> Option<&PlayerId> {
        if self.status != GameStatus::Playing {
            return None;
        }
        match self.auction.as_ref().filter(|a| a.is_running()) {
            Some(auction) => auction.bidder_to_act(),
            None => self.seat_to_act(),
        }
    }

    pub(super) fn ensure_turn(&self, player_id: &str) -> PowerGridResult<()> {
        match self.seat_to_act() {
            Some(current) if current == player_id => Ok(()),
            Some(current) => Err(GameError::not_player_turn(current.as_str(), player_id).into()),
            None => Err(GameError::rule_violation("nobody is on turn").into()),
        }
    }

    pub(super) fn turn_changed(&self) -> Option<GameEvent> {
        self.current_player_id()
            .map(|current_player_id| GameEvent::TurnChanged {
                current_player_id: current_player_id.clone(),
                turn: self.current_turn,
            })
    }

    /// Pass the turn to the next seat; the last seat closes the phase
    pub fn end_player_turn(&mut self) -> Vec<GameEvent> {
        self.current_turn += 1;
        if self.current_turn >= self.turn_order.len() {
            self.current_turn = 0;
            return self.advance_phase();
        }
        self.turn_changed().into_iter().collect()
    }

    pub(super) fn enter_phase(&mut self, phase: GamePhase, events: &mut Vec<GameEvent>) {
        self.current_phase = phase;
        self.current_turn = 0;
        for player in self.players.values_mut() {
            player.reset_bid();
        }
        info!(
            "🔄 Game {} round {} enters {}",
            self.id, self.current_round, phase
        );
        events.push(GameEvent::PhaseChanged {
            phase,
            round: self.current_round,
        });
        events.extend(self.turn_changed());
    }

    pub fn advance_phase(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let phase = self.current_phase;
        match phase {
            GamePhase::PlayerOrder => self.auction = Some(AuctionState::default()),
            GamePhase::Auction => self.auction = None,
            GamePhase::BuyResources => {}
            GamePhase::BuildCities => {
                self.check_step_two(&mut events);
                self.discard_outbuilt_plants();
                self.check_step_three(&mut events);
            }
            GamePhase::Bureaucracy => self.finish_round(&mut events),
            GamePhase::GameEnd => {}
        }
        if let Some(next) = phase.next() {
            self.enter_phase(next, &mut events);
        }
        events
    }

    /// Refill the market, rotate the plant market, then either end the game
    /// or open the next round with a fresh turn order.
    fn finish_round(&mut self, events: &mut Vec<GameEvent>) {
        let added = self.market.replenish_for(self.step, self.turn_order.len());
        info!("📦 Game {} market replenished: {:?}", self.id, added);

        if self.power_plants.step_three {
            self.power_plants.remove_lowest();
        } else {
            self.power_plants.cycle_highest();
        }
        self.check_step_three(events);

        if self.check_game_end() {
            self.end_game(events);
            return;
        }

        self.current_round += 1;
        self.sort_turn_order();
        for player in self.players.values_mut() {
            player.reset_round();
            player.powered_cities = 0;
        }
        self.enter_phase(GamePhase::PlayerOrder, events);
    }

    /// Most cities first, ties broken by the most expensive plant
    pub fn sort_turn_order(&mut self) {
        let key = |id: &PlayerId| {
            self.players
                .get(id)
                .map(|p| (p.cities.len(), p.highest_plant_cost()))
                .unwrap_or((0, 0))
        };
        let order: Vec<PlayerId> = self
            .turn_order
            .iter()
            .cloned()
            .sorted_by_key(|id| Reverse(key(id)))
            .collect();
        self.turn_order = order;
    }

    pub fn check_game_end(&self) -> bool {
        let cities_reached = self
            .players
            .values()
            .any(|p| p.cities.len() >= self.rules.win_cities);
        cities_reached || self.current_round >= self.rules.max_rounds
    }

    /// Most cities powered in the last bureaucracy, then money, then cities
    pub fn determine_winner(&self) -> Option<PlayerId> {
        self.turn_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .max_by_key(|p| (p.powered_cities, p.money, p.cities.len()))
            .map(|p| p.id.clone())
    }

    fn end_game(&mut self, events: &mut Vec<GameEvent>) {
        self.winner = self.determine_winner();
        self.status = GameStatus::Finished;
        self.current_phase = GamePhase::GameEnd;
        self.current_turn = 0;
        self.auction = None;
        info!(
            "🏆 Game {} finished after {} rounds, winner: {:?}",
            self.id, self.current_round, self.winner
        );
        events.push(GameEvent::PhaseChanged {
            phase: GamePhase::GameEnd,
            round: self.current_round,
        });
        events.push(GameEvent::GameEnded {
            winner_id: self.winner.clone(),
        });
    }

    fn max_cities(&self) -> usize {
        self.players
            .values()
            .map(|p| p.cities.len())
            .max()
            .unwrap_or(0)
    }

    fn check_step_two(&mut self, events: &mut Vec<GameEvent>) {
        if self.step != 1 {
            return;
        }
        let threshold = self.rules.step_two_cities(self.turn_order.len());
        if self.max_cities() < threshold {
            return;
        }
        self.step = 2;
        self.power_plants.remove_lowest();
        info!("⏫ Game {} enters step 2", self.id);
        events.push(GameEvent::StepChanged { step: 2 });
    }

    /// Plants no bigger than the largest network are useless
    fn discard_outbuilt_plants(&mut self) {
        let max_cities = self.max_cities() as u32;
        let discarded = self.power_plants.discard_up_to(max_cities);
        if !discarded.is_empty() {
            info!("🗑️ Game {} discarded plants {:?}", self.id, discarded);
        }
    }

    pub(super) fn check_step_three(&mut self, events: &mut Vec<GameEvent>) {
        if !self.power_plants.step_three_due() {
            return;
        }
        self.power_plants.enter_step_three();
        self.step = 3;
        info!("⏫ Game {} enters step 3", self.id);
        events.push(GameEvent::StepChanged { step: 3 });
    }
}
