// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Negotiation Protocols
//
// A session is opened for a crowd of co-located vehicles. The initiator
// proposes its own next edge to every other member; each resulting offer is
// then played out as an exchange between the two parties' negotiation
// modules. All messages are synchronous calls completed within the tick.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::adapter::{from_decimal, pair_savings};
use crate::bidding::{BiddingError, DistributionKind};
use crate::fleet::Fleet;
use crate::matcher::{faces_red, Crowd};
use crate::negotiation::{Decision, NegotiationModule, RouteQuote};
use crate::network::{NetworkError, RoutingService};
use crate::offer::{InitialOffer, Offer, OfferId, OfferKey, OfferState, SimpleOffer};
use crate::preference::speed_compatible;
use crate::telemetry::RunLog;
use crate::types::{EdgeId, NodeId, ProtocolKind, VehicleId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown offer {0}")]
    UnknownOffer(OfferId),
    #[error("{vehicle} is not a party to offer {offer}")]
    NotAParty { vehicle: VehicleId, offer: OfferId },
    #[error("{0} has no edge left to propose")]
    NothingToPropose(VehicleId),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Bidding(#[from] BiddingError),
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a protocol may touch while it runs, lent by the simulation.
pub struct NegotiationContext<'a> {
    pub fleet: &'a mut Fleet,
    pub network: &'a dyn RoutingService,
    pub log: &'a mut RunLog,
    pub rng: &'a mut ChaCha8Rng,
    pub distribution: DistributionKind,
    pub tick: u64,
    pub next_offer_id: &'a mut u64,
}

impl NegotiationContext<'_> {
    fn allocate_offer_id(&mut self) -> OfferId {
        let id = OfferId(*self.next_offer_id);
        *self.next_offer_id += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Exchange {
    offeror: NegotiationModule,
    acceptor: NegotiationModule,
}

#[derive(Debug, Clone)]
pub struct Session {
    crowd: BTreeSet<VehicleId>,
    anchor: NodeId,
    offers: BTreeMap<OfferKey, Offer>,
    exchanges: BTreeMap<OfferKey, Exchange>,
    round: u32,
}

impl Session {
    fn new(anchor: NodeId, crowd: impl IntoIterator<Item = VehicleId>) -> Self {
        Self {
            crowd: crowd.into_iter().collect(),
            anchor,
            offers: BTreeMap::new(),
            exchanges: BTreeMap::new(),
            round: 0,
        }
    }

    fn key_of(&self, id: OfferId) -> Result<OfferKey, ProtocolError> {
        self.offers
            .values()
            .find(|o| o.id() == id)
            .map(Offer::key)
            .ok_or(ProtocolError::UnknownOffer(id))
    }

    fn party_key(&self, vehicle: VehicleId, id: OfferId) -> Result<OfferKey, ProtocolError> {
        let key = self.key_of(id)?;
        if !key.involves(vehicle) {
            return Err(ProtocolError::NotAParty { vehicle, offer: id });
        }
        Ok(key)
    }

    /// Drop `vehicle` from the crowd once no pending offer involves it.
    fn release(&mut self, vehicle: VehicleId) {
        let busy = self.offers.iter().any(|(k, o)| k.involves(vehicle) && o.is_pending());
        if !busy {
            self.crowd.remove(&vehicle);
        }
    }

    fn conclude(&mut self, ctx: &mut NegotiationContext<'_>, kind: ProtocolKind, key: OfferKey) {
        if let Some(offer) = self.offers.get(&key) {
            ctx.log.record_negotiation(
                ctx.tick,
                kind,
                offer.id(),
                key,
                offer.state(),
                self.round,
                offer.buyout(),
                offer.savings(),
            );
        }
        self.release(key.offeror);
        self.release(key.acceptor);
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HaggleOutcome {
    /// Counter-offer passed on, in the receiver's frame.
    Forwarded { to: VehicleId, offer: SimpleOffer },
    /// Deadline reached; the offer is closed without a deal.
    Closed,
    /// The protocol has no haggling round.
    Ignored,
}

#[derive(Debug, Clone)]
pub enum Protocol {
    TakeItOrLeaveIt(Session),
    AlternatingOffers { session: Session, deadline: u32 },
}

impl Protocol {
    pub fn new(
        kind: ProtocolKind,
        deadline: u32,
        anchor: NodeId,
        crowd: impl IntoIterator<Item = VehicleId>,
    ) -> Self {
        let session = Session::new(anchor, crowd);
        match kind {
            ProtocolKind::TakeItOrLeaveIt => Protocol::TakeItOrLeaveIt(session),
            ProtocolKind::AlternatingOffers => Protocol::AlternatingOffers {
                session,
                deadline: deadline.max(1),
            },
        }
    }

    pub fn protocol_type(&self) -> ProtocolKind {
        match self {
            Protocol::TakeItOrLeaveIt(_) => ProtocolKind::TakeItOrLeaveIt,
            Protocol::AlternatingOffers { .. } => ProtocolKind::AlternatingOffers,
        }
    }

    fn session(&self) -> &Session {
        match self {
            Protocol::TakeItOrLeaveIt(s) => s,
            Protocol::AlternatingOffers { session, .. } => session,
        }
    }

    fn session_mut(&mut self) -> &mut Session {
        match self {
            Protocol::TakeItOrLeaveIt(s) => s,
            Protocol::AlternatingOffers { session, .. } => session,
        }
    }

    pub fn deadline(&self) -> u32 {
        match self {
            Protocol::TakeItOrLeaveIt(_) => 1,
            Protocol::AlternatingOffers { deadline, .. } => *deadline,
        }
    }

    pub fn round_counter(&self) -> u32 {
        self.session().round
    }

    pub fn anchor_node(&self) -> &NodeId {
        &self.session().anchor
    }

    pub fn crowd(&self) -> &BTreeSet<VehicleId> {
        &self.session().crowd
    }

    pub fn offer(&self, key: &OfferKey) -> Option<&Offer> {
        self.session().offers.get(key)
    }

    pub fn offers(&self) -> impl Iterator<Item = &Offer> {
        self.session().offers.values()
    }

    /// Every offer in the registry has reached a terminal state.
    pub fn is_concluded(&self) -> bool {
        self.session().offers.values().all(|o| o.state().is_terminal())
    }

    /// Discard the registry once the session is over.
    pub fn clear(&mut self) {
        let s = self.session_mut();
        s.offers.clear();
        s.exchanges.clear();
        s.round = 0;
    }

    /// Forward `initial` to every other crowd member, each with the route that
    /// takes it through the proposed edge to its own destination.
    pub fn send_offer(
        &mut self,
        ctx: &mut NegotiationContext<'_>,
        initiator: VehicleId,
        initial: InitialOffer,
    ) -> Result<Vec<OfferKey>, ProtocolError> {
        let kind = self.protocol_type();
        let deadline = self.deadline();
        let proposed = initial
            .route
            .first()
            .cloned()
            .ok_or(ProtocolError::NothingToPropose(initiator))?;
        let edge = ctx
            .network
            .edge_by_name(&proposed)
            .ok_or_else(|| NetworkError::UnknownEdge(proposed.clone()))?;
        let savings = from_decimal(pair_savings(edge.weight));

        let offeror_quote = {
            let v = ctx.fleet.get(initiator);
            RouteQuote::for_route(ctx.network, &initial.route, v.preference())?
        };

        let members: Vec<VehicleId> = self
            .session()
            .crowd
            .iter()
            .copied()
            .filter(|&m| m != initiator)
            .collect();
        let mut keys = Vec::new();
        for member in members {
            let v = ctx.fleet.get(member);
            let alternative = match ctx.network.route_through_edge(&proposed, v.destination()) {
                Ok(route) => route,
                Err(NetworkError::NoRoute { .. }) => {
                    debug!(vehicle = %member, edge = %proposed, "no onward route through proposed edge");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let current = RouteQuote::for_route(ctx.network, &ctx.fleet.route(member), v.preference())?;
            let offered = RouteQuote::for_route(ctx.network, &alternative, v.preference())?;
            let acceptor = NegotiationModule::acceptor(
                member,
                kind,
                deadline,
                ctx.distribution,
                v.utility(),
                v.preference(),
                current,
                offered,
            );
            let offeror = NegotiationModule::initiator(
                initiator,
                kind,
                deadline,
                ctx.distribution,
                ctx.fleet.get(initiator).utility(),
                offeror_quote,
                savings,
                initial.buyout,
            );

            let key = OfferKey { offeror: initiator, acceptor: member };
            let id = ctx.allocate_offer_id();
            let session = self.session_mut();
            session.offers.insert(key, Offer::new(id, key, &initial, alternative, savings));
            session.exchanges.insert(key, Exchange { offeror, acceptor });
            debug!(offer = %id, key = %key, buyout = initial.buyout, savings, "offer sent");
            keys.push(key);
        }
        Ok(keys)
    }

    /// One haggling message from `from`, buyout in the sender's frame.
    pub fn haggle(
        &mut self,
        ctx: &mut NegotiationContext<'_>,
        from: VehicleId,
        offer: SimpleOffer,
    ) -> Result<HaggleOutcome, ProtocolError> {
        let kind = self.protocol_type();
        let key = self.session().party_key(from, offer.id)?;
        let Protocol::AlternatingOffers { session, deadline } = self else {
            return Ok(HaggleOutcome::Ignored);
        };
        let deadline = *deadline;
        let Some(record) = session.offers.get_mut(&key) else {
            return Err(ProtocolError::UnknownOffer(offer.id));
        };

        if session.round >= deadline {
            record.close();
            debug!(offer = %offer.id, key = %key, round = session.round, "deadline reached");
            session.conclude(ctx, kind, key);
            return Ok(HaggleOutcome::Closed);
        }

        let savings = record.savings();
        let canonical = if from == key.offeror { offer.buyout + savings } else { offer.buyout };
        record.set_buyout(canonical);
        session.round += 1;

        let to = key.other(from);
        let buyout = if to == key.offeror { canonical - savings } else { canonical };
        Ok(HaggleOutcome::Forwarded { to, offer: SimpleOffer { id: offer.id, buyout } })
    }

    /// `from` accepts the standing buyout: pay it, reroute the acceptor and
    /// form the pair at the anchor node.
    pub fn receive_accept(
        &mut self,
        ctx: &mut NegotiationContext<'_>,
        from: VehicleId,
        id: OfferId,
    ) -> Result<(), ProtocolError> {
        let kind = self.protocol_type();
        let session = self.session_mut();
        let key = session.party_key(from, id)?;
        let Some(record) = session.offers.get_mut(&key) else {
            return Err(ProtocolError::UnknownOffer(id));
        };
        record.accept();
        let buyout = record.buyout();
        let route: Vec<EdgeId> = record.alternative_route().to_vec();

        ctx.fleet.get_mut(key.offeror).credit_buyout(-buyout);
        ctx.fleet.get_mut(key.acceptor).credit_buyout(buyout);
        ctx.fleet.replace_route(key.acceptor, route);
        ctx.fleet.form_group(&[key.offeror, key.acceptor], &session.anchor, ctx.tick);
        ctx.log.groups_formed += 1;

        let stale: Vec<OfferKey> = session
            .offers
            .iter()
            .filter(|(k, o)| **k != key && o.is_pending() && (k.involves(key.offeror) || k.involves(key.acceptor)))
            .map(|(k, _)| *k)
            .collect();
        session.conclude(ctx, kind, key);
        for k in stale {
            if let Some(o) = session.offers.get_mut(&k) {
                o.close();
            }
            session.conclude(ctx, kind, k);
        }
        Ok(())
    }

    pub fn receive_reject(
        &mut self,
        ctx: &mut NegotiationContext<'_>,
        from: VehicleId,
        id: OfferId,
    ) -> Result<(), ProtocolError> {
        self.terminate(ctx, from, id, OfferState::Rejected)
    }

    /// A party walks away without answering; the offer is closed.
    pub fn receive_breakaway(
        &mut self,
        ctx: &mut NegotiationContext<'_>,
        from: VehicleId,
        id: OfferId,
    ) -> Result<(), ProtocolError> {
        self.terminate(ctx, from, id, OfferState::Closed)
    }

    fn terminate(
        &mut self,
        ctx: &mut NegotiationContext<'_>,
        from: VehicleId,
        id: OfferId,
        state: OfferState,
    ) -> Result<(), ProtocolError> {
        let kind = self.protocol_type();
        let session = self.session_mut();
        let key = session.party_key(from, id)?;
        let Some(record) = session.offers.get_mut(&key) else {
            return Err(ProtocolError::UnknownOffer(id));
        };
        match state {
            OfferState::Rejected => record.reject(),
            _ => record.close(),
        }
        session.conclude(ctx, kind, key);
        Ok(())
    }

    /// Open the session for `initiator` and play out every offer in turn.
    /// Returns the number of deals struck.
    pub fn run(&mut self, ctx: &mut NegotiationContext<'_>, initiator: VehicleId) -> Result<u32, ProtocolError> {
        let route = ctx.fleet.route(initiator);
        let proposed = route.first().ok_or(ProtocolError::NothingToPropose(initiator))?;
        let edge = ctx
            .network
            .edge_by_name(proposed)
            .ok_or_else(|| NetworkError::UnknownEdge(proposed.clone()))?;
        let savings = from_decimal(pair_savings(edge.weight));
        let initial = InitialOffer {
            id: ctx.allocate_offer_id(),
            buyout: savings / 4.0,
            route,
        };

        let keys = self.send_offer(ctx, initiator, initial)?;
        let mut deals = 0;
        for key in keys {
            if !self.offer(&key).is_some_and(Offer::is_pending) {
                continue;
            }
            self.session_mut().round = 0;
            if self.exchange(ctx, key)? {
                deals += 1;
            }
        }
        Ok(deals)
    }

    fn exchange(&mut self, ctx: &mut NegotiationContext<'_>, key: OfferKey) -> Result<bool, ProtocolError> {
        let Some(offer) = self.offer(&key) else { return Ok(false) };
        let id = offer.id();
        let mut to = key.acceptor;
        let mut buyout = offer.buyout();

        loop {
            let round = self.round_counter();
            let seed: u64 = ctx.rng.gen();
            let Some(exchange) = self.session_mut().exchanges.get_mut(&key) else {
                return Err(ProtocolError::UnknownOffer(id));
            };
            let module = if to == key.offeror { &mut exchange.offeror } else { &mut exchange.acceptor };
            let decision = match module.receive_offer(buyout, round, seed) {
                Ok(d) => d,
                Err(e) => {
                    warn!(offer = %id, vehicle = %to, error = %e, "bidding failed, breaking away");
                    self.receive_breakaway(ctx, to, id)?;
                    return Ok(false);
                }
            };
            debug!(offer = %id, vehicle = %to, round, buyout, decision = %decision, "offer answered");

            match decision {
                Decision::Accept => {
                    self.receive_accept(ctx, to, id)?;
                    return Ok(true);
                }
                Decision::Reject => {
                    self.receive_reject(ctx, to, id)?;
                    return Ok(false);
                }
                Decision::Haggle(bid) => match self.haggle(ctx, to, SimpleOffer { id, buyout: bid })? {
                    // A counter that uses up the last round is never answered.
                    HaggleOutcome::Forwarded { to: next, offer } if self.round_counter() >= self.deadline() => {
                        let closed = self.haggle(ctx, next, offer)?;
                        debug_assert_eq!(closed, HaggleOutcome::Closed);
                        return Ok(false);
                    }
                    HaggleOutcome::Forwarded { to: next, offer } => {
                        to = next;
                        buyout = offer.buyout;
                    }
                    HaggleOutcome::Closed => return Ok(false),
                    HaggleOutcome::Ignored => {
                        self.receive_reject(ctx, to, id)?;
                        return Ok(false);
                    }
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Crowd orchestration
// ---------------------------------------------------------------------------

fn compatible(ctx: &NegotiationContext<'_>, a: VehicleId, b: VehicleId) -> bool {
    speed_compatible(ctx.fleet.get(a).preference(), ctx.fleet.get(b).preference())
        && faces_red(ctx.fleet, ctx.network, a) == faces_red(ctx.fleet, ctx.network, b)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrowdOutcome {
    pub sessions: u32,
    pub deals: u32,
}

/// Let crowd members take turns as initiator, lowest id first, until fewer
/// than two unmatched members remain.
pub fn negotiate_crowd(
    ctx: &mut NegotiationContext<'_>,
    kind: ProtocolKind,
    deadline: u32,
    crowd: &Crowd,
) -> Result<CrowdOutcome, ProtocolError> {
    let mut outcome = CrowdOutcome::default();
    let mut remaining = crowd.members.clone();
    remaining.sort();

    while remaining.len() >= 2 {
        let initiator = remaining[0];
        let members: Vec<VehicleId> = remaining
            .iter()
            .copied()
            .filter(|&v| v == initiator || compatible(ctx, initiator, v))
            .collect();
        if members.len() >= 2 {
            let mut protocol = Protocol::new(kind, deadline, crowd.anchor.clone(), members);
            outcome.sessions += 1;
            ctx.log.sessions += 1;
            outcome.deals += protocol.run(ctx, initiator)?;
            debug_assert!(protocol.is_concluded());
            protocol.clear();
        }
        remaining.retain(|&v| v != initiator && !ctx.fleet.get(v).is_platooning());
    }
    Ok(outcome)
}
