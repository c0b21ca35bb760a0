// Plant auctions
//
// One AuctionState lives for the whole auction phase. Each nomination
// snapshots the players still eligible this round (no plant bought, no
// skip) in turn order. Bidding rotates strictly through that list starting
// at the nominator; passing removes a bidder for the rest of this plant.
// When one bidder remains they win at the current bid, even if they never
// raised.

use log::info;
use serde::{Deserialize, Serialize};

use super::Game;
use crate::actions::{GameEvent, PlayerId};
use crate::enums::GamePhase;
use crate::errors::{GameError, PowerGridResult};
use crate::power_plant::PowerPlant;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    /// Plant under the hammer, None between nominations
    pub current_plant: Option<PowerPlant>,
    pub current_bid: u32,
    /// Leading bidder, None until someone raises
    pub current_bidder: Option<PlayerId>,
    pub participant_ids: Vec<PlayerId>,
    /// Position in `participant_ids` of the bidder on turn
    pub bidder_index: usize,
    pub plants_purchased: u32,
    pub round_complete: bool,
}

impl AuctionState {
    pub fn is_running(&self) -> bool {
        self.current_plant.is_some()
    }

    pub fn plant_id(&self) -> Option<u32> {
        self.current_plant.as_ref().map(|p| p.id)
    }

    pub fn bidder_to_act(&self) -> Option<&PlayerId> {
        if !self.is_running() {
            return None;
        }
        self.participant_ids.get(self.bidder_index)
    }

    fn advance_bidder(&mut self) {
        if !self.participant_ids.is_empty() {
            self.bidder_index = (self.bidder_index + 1) % self.participant_ids.len();
        }
    }

    /// Drop a bidder; the one after them moves onto their position
    fn remove_participant(&mut self, player_id: &str) {
        if let Some(pos) = self.participant_ids.iter().position(|id| id == player_id) {
            self.participant_ids.remove(pos);
            if pos < self.bidder_index {
                self.bidder_index -= 1;
            }
            if self.bidder_index >= self.participant_ids.len() {
                self.bidder_index = 0;
            }
        }
    }

    fn clear(&mut self) {
        self.current_plant = None;
        self.current_bid = 0;
        self.current_bidder = None;
        self.participant_ids.clear();
        self.bidder_index = 0;
    }
}

impl Game {
    fn running_auction(&self) -> PowerGridResult<&AuctionState> {
        self.auction
            .as_ref()
            .filter(|a| a.is_running())
            .ok_or_else(|| GameError::NoActiveAuction.into())
    }

    fn running_auction_mut(&mut self) -> PowerGridResult<&mut AuctionState> {
        self.auction
            .as_mut()
            .filter(|a| a.is_running())
            .ok_or_else(|| GameError::NoActiveAuction.into())
    }

    fn eligible_for_auction(&self, player_id: &str) -> bool {
        self.players
            .get(player_id)
            .is_some_and(|p| !p.has_bought_plant && !p.skipped_auction)
    }

    fn ensure_bidder(&self, auction: &AuctionState, player_id: &str) -> PowerGridResult<()> {
        match auction.bidder_to_act() {
            Some(current) if current == player_id => Ok(()),
            Some(current) => Err(GameError::not_player_turn(current.as_str(), player_id).into()),
            None => Err(GameError::NoActiveAuction.into()),
        }
    }

    /// Nominate a plant from the current market
    pub fn start_auction(&mut self, player_id: &str, plant_id: u32) -> PowerGridResult<Vec<GameEvent>> {
        self.open_auction(player_id, plant_id, None)
    }

    /// BID_PLANT either raises the running auction or, when none is
    /// running, nominates the plant with an opening bid. A bid of 0 passes.
    pub(super) fn bid_plant(
        &mut self,
        player_id: &str,
        plant_id: u32,
        bid: u32,
    ) -> PowerGridResult<Vec<GameEvent>> {
        let running = self.auction.as_ref().is_some_and(|a| a.is_running());
        match (running, bid) {
            (true, _) => self.process_bid(player_id, plant_id, bid),
            (false, 0) => self.skip_auction(player_id),
            (false, _) => self.open_auction(player_id, plant_id, Some(bid)),
        }
    }

    fn open_auction(
        &mut self,
        player_id: &str,
        plant_id: u32,
        opening_bid: Option<u32>,
    ) -> PowerGridResult<Vec<GameEvent>> {
        if let Some(plant_id) = self.auction.as_ref().and_then(AuctionState::plant_id) {
            return Err(GameError::AuctionInProgress { plant_id }.into());
        }
        self.ensure_turn(player_id)?;
        let player = self.player(player_id)?;
        if player.has_bought_plant {
            return Err(GameError::AlreadyBoughtPlant {
                player_id: player_id.to_string(),
            }
            .into());
        }
        let plant = self
            .power_plants
            .find_purchasable(plant_id)
            .cloned()
            .ok_or(GameError::PlantNotInMarket { plant_id })?;
        let price = opening_bid.unwrap_or(plant.cost);
        if price < plant.cost {
            return Err(GameError::OpeningBidTooLow {
                bid: price,
                minimum: plant.cost,
            }
            .into());
        }
        player.ensure_funds(price)?;

        let mut events = Vec::new();
        if self.current_phase == GamePhase::PlayerOrder {
            events.extend(self.advance_phase());
        }

        let participants: Vec<PlayerId> = self
            .turn_order
            .iter()
            .filter(|id| self.eligible_for_auction(id))
            .cloned()
            .collect();
        let auction = self.auction.get_or_insert_with(AuctionState::default);
        auction.current_plant = Some(plant);
        auction.current_bid = price;
        auction.current_bidder = None;
        auction.participant_ids = participants.clone();
        auction.bidder_index = participants
            .iter()
            .position(|id| id == player_id)
            .unwrap_or(0);
        info!(
            "🔨 {} nominated plant {} at {} ({} bidders)",
            player_id,
            plant_id,
            price,
            participants.len()
        );
        events.push(GameEvent::AuctionStarted {
            plant_id,
            opening_bid: price,
            participants: participants.clone(),
        });

        if opening_bid.is_some() {
            auction.current_bidder = Some(player_id.to_string());
            auction.advance_bidder();
            self.player_mut(player_id)?.current_bid = price;
            events.push(GameEvent::BidPlaced {
                player_id: player_id.to_string(),
                plant_id,
                bid: price,
            });
        }

        if participants.len() == 1 {
            events.extend(self.end_auction(player_id)?);
        } else {
            events.extend(self.turn_changed());
        }
        Ok(events)
    }

    /// Raise the bid on the running auction
    pub fn process_bid(
        &mut self,
        player_id: &str,
        plant_id: u32,
        bid: u32,
    ) -> PowerGridResult<Vec<GameEvent>> {
        let auction = self.running_auction()?;
        let current_plant = auction.plant_id().unwrap_or_default();
        if plant_id != current_plant {
            return Err(GameError::PlantMismatch {
                plant_id,
                current_plant,
            }
            .into());
        }
        if bid == 0 {
            return self.pass_on_bid(player_id);
        }
        self.ensure_bidder(auction, player_id)?;
        if bid <= auction.current_bid {
            return Err(GameError::BidTooLow {
                bid,
                current_bid: auction.current_bid,
            }
            .into());
        }
        self.player(player_id)?.ensure_funds(bid)?;

        let auction = self.running_auction_mut()?;
        auction.current_bid = bid;
        auction.current_bidder = Some(player_id.to_string());
        auction.advance_bidder();
        self.player_mut(player_id)?.current_bid = bid;

        let mut events = vec![GameEvent::BidPlaced {
            player_id: player_id.to_string(),
            plant_id,
            bid,
        }];
        events.extend(self.turn_changed());
        Ok(events)
    }

    /// Drop out of the running auction
    pub fn pass_on_bid(&mut self, player_id: &str) -> PowerGridResult<Vec<GameEvent>> {
        let auction = self.running_auction()?;
        self.ensure_bidder(auction, player_id)?;
        let plant_id = auction.plant_id().unwrap_or_default();
        let current_bid = auction.current_bid;
        let remaining: Vec<&PlayerId> = auction
            .participant_ids
            .iter()
            .filter(|id| id.as_str() != player_id)
            .collect();
        let survivor = match remaining.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        };
        let survivor_can_pay = survivor
            .as_ref()
            .and_then(|id| self.players.get(id))
            .is_some_and(|p| p.can_afford(current_bid));

        self.running_auction_mut()?.remove_participant(player_id);
        self.player_mut(player_id)?.has_passed = true;
        let mut events = vec![GameEvent::BidPassed {
            player_id: player_id.to_string(),
            plant_id,
        }];

        match survivor {
            Some(winner) if survivor_can_pay => {
                events.extend(self.end_auction(&winner)?);
            }
            Some(_) => events.extend(self.close_unsold()),
            None => events.extend(self.turn_changed()),
        }
        Ok(events)
    }

    /// Sell the plant under auction to `winner_id` at the current bid
    pub fn end_auction(&mut self, winner_id: &str) -> PowerGridResult<Vec<GameEvent>> {
        let auction = self.running_auction()?;
        let plant_id = auction.plant_id().unwrap_or_default();
        let price = auction.current_bid;
        self.player(winner_id)?.ensure_funds(price)?;

        let plant = self.power_plants.take(plant_id)?;
        let max_plants = self.rules.max_power_plants;
        let player = self.player_mut(winner_id)?;
        player.debit(price)?;
        player.has_bought_plant = true;
        let discarded = player.add_power_plant(plant, max_plants);
        let overflow = player.trim_to_storage();
        for (resource, units) in overflow {
            self.market.return_to_supply(resource, units);
        }

        if let Some(auction) = self.auction.as_mut() {
            auction.clear();
            auction.plants_purchased += 1;
        }
        for player in self.players.values_mut() {
            player.reset_bid();
        }
        info!("💰 {} bought plant {} for {}", winner_id, plant_id, price);

        let mut events = vec![GameEvent::AuctionWon {
            player_id: winner_id.to_string(),
            plant_id,
            price,
            discarded_plant: discarded.map(|p| p.id),
        }];
        self.check_step_three(&mut events);
        events.extend(self.advance_nominator());
        Ok(events)
    }

    /// Nobody left who can pay: the plant stays in the market and the
    /// nominator chooses again.
    fn close_unsold(&mut self) -> Vec<GameEvent> {
        let plant_id = self
            .auction
            .as_ref()
            .and_then(AuctionState::plant_id)
            .unwrap_or_default();
        if let Some(auction) = self.auction.as_mut() {
            auction.clear();
        }
        for player in self.players.values_mut() {
            player.reset_bid();
        }
        let mut events = vec![GameEvent::AuctionClosed { plant_id }];
        events.extend(self.turn_changed());
        events
    }

    /// Nominator declines to put up a plant this round
    pub(super) fn skip_auction(&mut self, player_id: &str) -> PowerGridResult<Vec<GameEvent>> {
        if let Some(plant_id) = self.auction.as_ref().and_then(AuctionState::plant_id) {
            return Err(GameError::AuctionInProgress { plant_id }.into());
        }
        self.ensure_turn(player_id)?;

        let mut events = Vec::new();
        if self.current_phase == GamePhase::PlayerOrder {
            events.extend(self.advance_phase());
        }
        self.player_mut(player_id)?.skipped_auction = true;
        events.push(GameEvent::AuctionSkipped {
            player_id: player_id.to_string(),
        });
        events.extend(self.advance_nominator());
        Ok(events)
    }

    /// Hand the nomination to the first eligible seat, or close the phase
    fn advance_nominator(&mut self) -> Vec<GameEvent> {
        let next = self
            .turn_order
            .iter()
            .position(|id| self.eligible_for_auction(id));
        match next {
            Some(index) => {
                self.current_turn = index;
                self.turn_changed().into_iter().collect()
            }
            None => {
                if let Some(auction) = self.auction.as_mut() {
                    auction.round_complete = true;
                }
                self.advance_phase()
            }
        }
    }
}
