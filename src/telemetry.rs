// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Run Telemetry
//
// Explicit per-run record of negotiation outcomes and coordination counters.
// Owned by the simulation and lent to each phase; nothing here is global.

use serde::Serialize;
use tracing::info;

use crate::offer::{OfferId, OfferKey, OfferState};
use crate::types::{ProtocolKind, VehicleId};

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationRecord {
    pub tick: u64,
    pub protocol: ProtocolKind,
    pub offer: OfferId,
    pub key: String,
    pub offeror: VehicleId,
    pub acceptor: VehicleId,
    pub outcome: OfferState,
    pub rounds: u32,
    /// Canonical buyout at conclusion.
    pub buyout: f64,
    pub savings: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLog {
    records: Vec<NegotiationRecord>,
    pub sessions: u32,
    pub groups_formed: u32,
    pub splits: u32,
    pub completions: u32,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_negotiation(
        &mut self,
        tick: u64,
        protocol: ProtocolKind,
        offer: OfferId,
        key: OfferKey,
        outcome: OfferState,
        rounds: u32,
        buyout: f64,
        savings: f64,
    ) {
        info!(
            tick,
            protocol = %protocol,
            offer = %offer,
            key = %key,
            outcome = %outcome,
            rounds,
            buyout,
            "negotiation concluded"
        );
        self.records.push(NegotiationRecord {
            tick,
            protocol,
            offer,
            key: key.to_string(),
            offeror: key.offeror,
            acceptor: key.acceptor,
            outcome,
            rounds,
            buyout,
            savings,
        });
    }

    pub fn records(&self) -> &[NegotiationRecord] {
        &self.records
    }

    pub fn deals(&self) -> usize {
        self.count(OfferState::Accepted)
    }

    pub fn count(&self, outcome: OfferState) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Accepted share of concluded offers, zero when nothing was negotiated.
    pub fn deal_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.deals() as f64 / self.records.len() as f64
    }

    pub fn mean_rounds(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().map(|r| r.rounds as f64).sum::<f64>() / self.records.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> OfferKey {
        OfferKey { offeror: VehicleId(0), acceptor: VehicleId(1) }
    }

    #[test]
    fn empty_log_has_zero_rates() {
        let log = RunLog::new();
        assert_eq!(log.deal_rate(), 0.0);
        assert_eq!(log.mean_rounds(), 0.0);
    }

    #[test]
    fn deal_rate_counts_accepted_offers() {
        let mut log = RunLog::new();
        let p = ProtocolKind::AlternatingOffers;
        log.record_negotiation(1, p, OfferId(0), key(), OfferState::Accepted, 2, 0.4, 1.6);
        log.record_negotiation(1, p, OfferId(1), key(), OfferState::Rejected, 1, 0.4, 1.6);
        log.record_negotiation(2, p, OfferId(2), key(), OfferState::Closed, 6, 0.9, 1.6);
        log.record_negotiation(3, p, OfferId(3), key(), OfferState::Accepted, 3, 0.5, 1.6);
        assert_eq!(log.deals(), 2);
        assert_eq!(log.deal_rate(), 0.5);
        assert_eq!(log.mean_rounds(), 3.0);
        assert_eq!(log.records()[0].key, "v0-v1");
    }
}
