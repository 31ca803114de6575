// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Per-Vehicle Negotiation Module
//
// Each party of an exchange runs its own module. It values the offered route
// against its current one, derives a reservation value and answers every
// incoming buyout with accept, reject or a counter-bid.
//
// Frames: the acceptor reasons in canonical buyouts (what it is paid). The
// initiator reasons in net payments, `buyout - savings`.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapter::from_decimal;
use crate::bidding::{BiddingError, BiddingModule, DistributionKind, Role};
use crate::network::{NetworkError, RoutingService};
use crate::preference::{Preference, Utility};
use crate::types::{EdgeId, ProtocolKind, VehicleId};

/// Share of the deadline after which a module stops conceding.
pub const LATE_ROUND_FRACTION: f64 = 0.75;

/// Solo totals of a route as seen by one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteQuote {
    pub cost: f64,
    /// Metres.
    pub length: f64,
    pub ticks: u64,
}

impl RouteQuote {
    pub fn for_route(
        network: &dyn RoutingService,
        route: &[EdgeId],
        preference: &Preference,
    ) -> Result<Self, NetworkError> {
        let cost = network.route_cost(route)?;
        let length = route.iter().try_fold(Decimal::ZERO, |l, id| {
            network
                .edge_by_name(id)
                .map(|e| l + e.length)
                .ok_or_else(|| NetworkError::UnknownEdge(id.clone()))
        })?;
        let length = from_decimal(length);
        Ok(Self {
            cost: from_decimal(cost),
            length,
            ticks: preference.estimate_ticks(length),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Valuation {
    /// Utility of the route currently held.
    pub current: f64,
    /// Utility of the route under negotiation.
    pub offered: f64,
    /// Reservation value in this module's own frame.
    pub reservation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Accept,
    Reject,
    Haggle(f64),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept => f.write_str("accept"),
            Decision::Reject => f.write_str("reject"),
            Decision::Haggle(_) => f.write_str("haggle"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationModule {
    vehicle: VehicleId,
    protocol: ProtocolKind,
    deadline: u32,
    valuation: Valuation,
    affordable: bool,
    bidding: BiddingModule,
    own_bids: Vec<f64>,
    received: Vec<f64>,
}

impl NegotiationModule {
    /// Module for the vehicle asked to take the proposed route.
    ///
    /// Its reservation value is the smallest buyout that covers the utility
    /// lost by switching routes.
    #[allow(clippy::too_many_arguments)]
    pub fn acceptor(
        vehicle: VehicleId,
        protocol: ProtocolKind,
        deadline: u32,
        distribution: DistributionKind,
        utility: &Utility,
        preference: &Preference,
        current: RouteQuote,
        offered: RouteQuote,
    ) -> Self {
        let cur = utility.evaluate(current.cost, current.length);
        let new = utility.evaluate(offered.cost, offered.length);
        let reservation = utility.to_money(new - cur);
        let affordable = preference.can_afford(offered.cost, offered.length, offered.ticks);
        Self {
            vehicle,
            protocol,
            deadline,
            valuation: Valuation { current: cur, offered: new, reservation },
            affordable,
            bidding: BiddingModule::new(Role::Acceptor, deadline, reservation, distribution),
            own_bids: Vec::new(),
            received: Vec::new(),
        }
    }

    /// Module for the vehicle proposing its own next edge.
    ///
    /// Platooning discounts its route by `savings`; it will pay at most what
    /// that discount is worth, expressed as a net payment.
    #[allow(clippy::too_many_arguments)]
    pub fn initiator(
        vehicle: VehicleId,
        protocol: ProtocolKind,
        deadline: u32,
        distribution: DistributionKind,
        utility: &Utility,
        current: RouteQuote,
        savings: f64,
        opening_buyout: f64,
    ) -> Self {
        let cur = utility.evaluate(current.cost, current.length);
        let discounted = utility.evaluate(current.cost - savings, current.length);
        let reservation = utility.to_money(cur - discounted) - savings;
        Self {
            vehicle,
            protocol,
            deadline,
            valuation: Valuation { current: cur, offered: discounted, reservation },
            affordable: true,
            bidding: BiddingModule::new(Role::Initiator, deadline, reservation, distribution),
            own_bids: vec![opening_buyout - savings],
            received: Vec::new(),
        }
    }

    pub fn vehicle(&self) -> VehicleId { self.vehicle }
    pub fn role(&self) -> Role { self.bidding.role() }
    pub fn valuation(&self) -> Valuation { self.valuation }
    pub fn reservation_value(&self) -> f64 { self.valuation.reservation }
    pub fn is_affordable(&self) -> bool { self.affordable }
    pub fn own_bids(&self) -> &[f64] { &self.own_bids }
    pub fn received(&self) -> &[f64] { &self.received }
    pub fn bidding(&self) -> &BiddingModule { &self.bidding }

    /// Answer a buyout expressed in this module's own frame.
    pub fn receive_offer(&mut self, buyout: f64, round: u32, seed: u64) -> Result<Decision, BiddingError> {
        self.received.push(buyout);
        self.bidding.update_strategy(buyout);
        if !self.affordable {
            return Ok(Decision::Reject);
        }
        let role = self.role();
        let rv = self.valuation.reservation;
        let acceptable = role.within(buyout, rv);

        match self.protocol {
            ProtocolKind::TakeItOrLeaveIt => Ok(if acceptable { Decision::Accept } else { Decision::Reject }),
            ProtocolKind::AlternatingOffers => {
                let late = round as f64 >= LATE_ROUND_FRACTION * self.deadline as f64;
                let beats_own = self.own_bids.last().is_some_and(|&b| role.prefers(buyout, b));
                if acceptable && (late || beats_own) {
                    return Ok(Decision::Accept);
                }
                if !acceptable && late {
                    return Ok(Decision::Reject);
                }
                let estimate = 0.5 * (rv + buyout);
                let bid = self.bidding.get_best_bid(&self.own_bids, round, estimate, seed)?;
                if acceptable && role.prefers(buyout, bid) {
                    return Ok(Decision::Accept);
                }
                self.own_bids.push(bid);
                Ok(Decision::Haggle(bid))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pref() -> Preference {
        Preference::new(1.0, 10.0, 1.0, 1.0, 1000, dec!(10000), dec!(100))
    }

    fn quote(cost: f64) -> RouteQuote {
        RouteQuote { cost, length: 500.0, ticks: 20 }
    }

    fn acceptor(protocol: ProtocolKind, current: f64, offered: f64) -> NegotiationModule {
        NegotiationModule::acceptor(
            VehicleId(1),
            protocol,
            6,
            DistributionKind::Normal,
            &Utility::new(1.0, 0.0),
            &pref(),
            quote(current),
            quote(offered),
        )
    }

    #[test]
    fn tili_accepts_when_new_route_is_better() {
        let mut m = acceptor(ProtocolKind::TakeItOrLeaveIt, 20.0, 15.0);
        assert!(m.reservation_value() < 0.0);
        let buyout = (10.0 - (10.0 + 10.0 / 3.0 * 2.0) / 2.0) / 4.0;
        let d = m.receive_offer(buyout, 0, 0).expect("test: decision");
        assert_eq!(d.to_string(), "accept");
    }

    #[test]
    fn tili_rejects_insufficient_buyout() {
        let mut m = acceptor(ProtocolKind::TakeItOrLeaveIt, 10.0, 12.0);
        assert_eq!(m.receive_offer(1.0, 0, 0).expect("test: decision"), Decision::Reject);
        let mut m = acceptor(ProtocolKind::TakeItOrLeaveIt, 10.0, 12.0);
        assert_eq!(m.receive_offer(2.0, 0, 0).expect("test: decision"), Decision::Accept);
    }

    #[test]
    fn unaffordable_route_is_always_rejected() {
        let mut m = acceptor(ProtocolKind::AlternatingOffers, 10.0, 150.0);
        assert!(!m.is_affordable());
        assert_eq!(m.receive_offer(1_000.0, 0, 0).expect("test: decision"), Decision::Reject);
    }

    #[test]
    fn ao_haggles_early_and_rejects_late() {
        let mut m = acceptor(ProtocolKind::AlternatingOffers, 10.0, 12.0);
        match m.receive_offer(0.5, 0, 1).expect("test: decision") {
            Decision::Haggle(bid) => assert!(bid >= 2.0, "demand {bid} below reservation"),
            other => panic!("expected haggle, got {other}"),
        }
        // 0.75 * 6 = 4.5
        assert_eq!(m.receive_offer(0.5, 5, 2).expect("test: decision"), Decision::Reject);
    }

    #[test]
    fn ao_accepts_offer_matching_own_demand() {
        let mut m = acceptor(ProtocolKind::AlternatingOffers, 10.0, 12.0);
        let Decision::Haggle(demand) = m.receive_offer(0.5, 0, 1).expect("test: decision") else {
            panic!("expected haggle");
        };
        assert_eq!(m.receive_offer(demand, 1, 2).expect("test: decision"), Decision::Accept);
    }

    #[test]
    fn initiator_reservation_is_zero_for_linear_utility() {
        let m = NegotiationModule::initiator(
            VehicleId(0),
            ProtocolKind::AlternatingOffers,
            6,
            DistributionKind::Normal,
            &Utility::new(2.0, 0.01),
            quote(30.0),
            1.6667,
            0.4167,
        );
        assert!(m.reservation_value().abs() < 1e-9);
        assert_eq!(m.role(), Role::Initiator);
        assert!((m.own_bids()[0] - (0.4167 - 1.6667)).abs() < 1e-12);
    }

    #[test]
    fn initiator_accepts_acceptable_counter_late() {
        let mut m = NegotiationModule::initiator(
            VehicleId(0),
            ProtocolKind::AlternatingOffers,
            4,
            DistributionKind::Normal,
            &Utility::new(1.0, 0.0),
            quote(30.0),
            2.0,
            0.5,
        );
        // Net -0.5: the acceptor asks for 1.5 of the 2.0 saved.
        assert_eq!(m.receive_offer(-0.5, 3, 0).expect("test: decision"), Decision::Accept);
        assert_eq!(m.receive_offer(0.5, 3, 0).expect("test: decision"), Decision::Reject);
    }
}
