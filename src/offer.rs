// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Offers

use std::fmt;

use serde::Serialize;

use crate::types::{EdgeId, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OfferId(pub u64);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry key of an offer, rendered `"offeror-acceptor"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OfferKey {
    pub offeror: VehicleId,
    pub acceptor: VehicleId,
}

impl OfferKey {
    pub fn involves(&self, id: VehicleId) -> bool {
        self.offeror == id || self.acceptor == id
    }

    pub fn other(&self, id: VehicleId) -> VehicleId {
        if id == self.offeror { self.acceptor } else { self.offeror }
    }
}

impl fmt::Display for OfferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.offeror, self.acceptor)
    }
}

/// Opening offer from an initiator: a buyout and the route it proposes to share.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialOffer {
    pub id: OfferId,
    pub buyout: f64,
    pub route: Vec<EdgeId>,
}

/// Haggling payload. The buyout is in the sender's own frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimpleOffer {
    pub id: OfferId,
    pub buyout: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OfferState {
    Pending,
    Accepted,
    Rejected,
    Closed,
}

impl OfferState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OfferState::Pending)
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Protocol-side record of one offeror/acceptor exchange.
///
/// `buyout` is canonical: what the offeror pays the acceptor. `savings` is
/// fixed at creation. Every transition out of `Pending` is final; attempting
/// another one is a sequencing bug and panics.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    id: OfferId,
    key: OfferKey,
    buyout: f64,
    proposed_route: Vec<EdgeId>,
    alternative_route: Vec<EdgeId>,
    savings: f64,
    state: OfferState,
}

impl Offer {
    pub fn new(
        id: OfferId,
        key: OfferKey,
        initial: &InitialOffer,
        alternative_route: Vec<EdgeId>,
        savings: f64,
    ) -> Self {
        Self {
            id,
            key,
            buyout: initial.buyout,
            proposed_route: initial.route.clone(),
            alternative_route,
            savings,
            state: OfferState::Pending,
        }
    }

    pub fn id(&self) -> OfferId { self.id }
    pub fn key(&self) -> OfferKey { self.key }
    pub fn buyout(&self) -> f64 { self.buyout }
    pub fn proposed_route(&self) -> &[EdgeId] { &self.proposed_route }
    pub fn alternative_route(&self) -> &[EdgeId] { &self.alternative_route }
    pub fn savings(&self) -> f64 { self.savings }
    pub fn state(&self) -> OfferState { self.state }

    pub fn is_pending(&self) -> bool {
        self.state == OfferState::Pending
    }

    pub fn set_buyout(&mut self, buyout: f64) {
        self.assert_pending("haggle");
        self.buyout = buyout;
    }

    pub fn accept(&mut self) {
        self.transition(OfferState::Accepted, "accept");
    }

    pub fn reject(&mut self) {
        self.transition(OfferState::Rejected, "reject");
    }

    pub fn close(&mut self) {
        self.transition(OfferState::Closed, "close");
    }

    fn transition(&mut self, next: OfferState, action: &str) {
        self.assert_pending(action);
        self.state = next;
    }

    fn assert_pending(&self, action: &str) {
        assert!(
            self.state == OfferState::Pending,
            "offer {} ({}) cannot {}: already {}",
            self.id,
            self.key,
            action,
            self.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer() -> Offer {
        let initial = InitialOffer {
            id: OfferId(0),
            buyout: 0.5,
            route: vec![EdgeId::from("e")],
        };
        let key = OfferKey { offeror: VehicleId(0), acceptor: VehicleId(1) };
        Offer::new(OfferId(1), key, &initial, vec![EdgeId::from("e"), EdgeId::from("f")], 2.0)
    }

    #[test]
    fn key_renders_offeror_then_acceptor() {
        let key = OfferKey { offeror: VehicleId(3), acceptor: VehicleId(7) };
        assert_eq!(key.to_string(), "v3-v7");
        assert_eq!(key.other(VehicleId(3)), VehicleId(7));
        assert!(key.involves(VehicleId(7)));
        assert!(!key.involves(VehicleId(1)));
    }

    #[test]
    fn pending_offer_can_be_haggled_then_accepted() {
        let mut o = offer();
        o.set_buyout(0.75);
        o.accept();
        assert_eq!(o.state(), OfferState::Accepted);
        assert_eq!(o.buyout(), 0.75);
        assert_eq!(o.savings(), 2.0);
    }

    #[test]
    #[should_panic(expected = "already accepted")]
    fn accepted_offer_cannot_be_accepted_again() {
        let mut o = offer();
        o.accept();
        o.accept();
    }

    #[test]
    #[should_panic(expected = "cannot haggle")]
    fn closed_offer_cannot_be_haggled() {
        let mut o = offer();
        o.close();
        o.set_buyout(1.0);
    }

    #[test]
    #[should_panic]
    fn rejected_offer_cannot_close() {
        let mut o = offer();
        o.reject();
        o.close();
    }
}
