//! Domain-facing event broadcaster.
//!
//! One method per domain event kind. Each method wraps the caller's typed
//! payload into an [`EventEnvelope`], resolves the target rooms from a fixed
//! routing table, delivers locally through the router, and publishes across
//! the backplane so peer processes do the same.
//!
//! No method here returns an error: publishing a realtime event must never
//! fail a business transaction that already committed. Failures are logged
//! and delivery continues to the remaining targets.

use crate::backplane::Backplane;
use crate::event::{
    DividendAvailable, EventEnvelope, EventKind, MarketCreated, MarketResolved, MarketTrade,
    Notification, ShareTrade, SharesUnlocked, SystemNotice,
};
use crate::room::{RoomKind, RoomName};
use crate::router::RoomRouter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{trace, warn};

/// Maps typed domain events onto rooms and fans them out.
pub struct EventBroadcaster {
    router: Arc<RoomRouter>,
    backplane: Arc<dyn Backplane>,
}

impl EventBroadcaster {
    #[must_use]
    pub fn new(router: Arc<RoomRouter>, backplane: Arc<dyn Backplane>) -> Self {
        Self { router, backplane }
    }

    /// market-created → global.
    pub async fn market_created(&self, payload: MarketCreated) {
        let rooms = vec![RoomName::global()];
        self.dispatch(EventKind::MarketCreated, &payload, rooms).await;
    }

    /// market-trade → market room + trader's user room.
    pub async fn market_trade(&self, payload: MarketTrade) {
        let rooms = collect_rooms(
            EventKind::MarketTrade,
            [
                RoomName::new(RoomKind::Market, &payload.market_id),
                RoomName::user(&payload.trader),
            ],
        );
        self.dispatch(EventKind::MarketTrade, &payload, rooms).await;
    }

    /// market-resolved → market room + global.
    pub async fn market_resolved(&self, payload: MarketResolved) {
        let mut rooms = collect_rooms(
            EventKind::MarketResolved,
            [RoomName::new(RoomKind::Market, &payload.market_id)],
        );
        rooms.push(RoomName::global());
        self.dispatch(EventKind::MarketResolved, &payload, rooms).await;
    }

    /// shares-trade → creator room + trader's user room.
    pub async fn share_trade(&self, payload: ShareTrade) {
        let rooms = collect_rooms(
            EventKind::ShareTrade,
            [
                RoomName::new(RoomKind::Creator, &payload.creator_id),
                RoomName::user(&payload.trader),
            ],
        );
        self.dispatch(EventKind::ShareTrade, &payload, rooms).await;
    }

    /// shares-unlocked → holder's user room + creator room.
    pub async fn shares_unlocked(&self, payload: SharesUnlocked) {
        let rooms = collect_rooms(
            EventKind::SharesUnlocked,
            [
                RoomName::user(&payload.holder),
                RoomName::new(RoomKind::Creator, &payload.creator_id),
            ],
        );
        self.dispatch(EventKind::SharesUnlocked, &payload, rooms).await;
    }

    /// dividend-available → holder's user room.
    pub async fn dividend_available(&self, payload: DividendAvailable) {
        let rooms = collect_rooms(
            EventKind::DividendAvailable,
            [RoomName::user(&payload.holder)],
        );
        self.dispatch(EventKind::DividendAvailable, &payload, rooms).await;
    }

    /// notification → recipient's user room.
    pub async fn notify(&self, payload: Notification) {
        let rooms = collect_rooms(EventKind::Notification, [RoomName::user(&payload.user_id)]);
        self.dispatch(EventKind::Notification, &payload, rooms).await;
    }

    /// Bulk notification: one notification per recipient.
    pub async fn notify_many(&self, payloads: Vec<Notification>) {
        for payload in payloads {
            self.notify(payload).await;
        }
    }

    /// system-maintenance → every connected client (via the ever-subscribed
    /// global room).
    pub async fn system_maintenance(&self, payload: SystemNotice) {
        let rooms = vec![RoomName::global()];
        self.dispatch(EventKind::SystemMaintenance, &payload, rooms).await;
    }

    /// system-announcement → every connected client.
    pub async fn system_announcement(&self, payload: SystemNotice) {
        let rooms = vec![RoomName::global()];
        self.dispatch(EventKind::SystemAnnouncement, &payload, rooms).await;
    }

    /// Re-run local delivery for an envelope received from the backplane.
    ///
    /// Remote events are not re-published: the originating process already
    /// put them on the backplane once.
    pub fn deliver_remote(&self, room: &RoomName, envelope: EventEnvelope) {
        let count = self.router.publish(room, Arc::new(envelope));
        trace!(room = %room, recipients = count, "Delivered backplane event");
    }

    /// Wrap the payload and deliver to each target room, local first, then
    /// across the backplane. A failed target is logged and skipped.
    async fn dispatch<P: Serialize>(&self, kind: EventKind, payload: &P, rooms: Vec<RoomName>) {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(event = %kind, error = %e, "Failed to serialize event payload");
                return;
            }
        };
        let envelope = Arc::new(EventEnvelope::new(kind, data));

        for room in &rooms {
            let count = self.router.publish(room, envelope.clone());
            trace!(event = %kind, room = %room, recipients = count, "Local delivery");
        }

        for room in &rooms {
            if let Err(e) = self.backplane.publish(room, &envelope).await {
                warn!(event = %kind, room = %room, error = %e, "Backplane publish failed");
            }
        }
    }
}

/// Resolve a set of (kind, id) targets, logging and skipping malformed ones
/// instead of aborting the rest of the fan-out.
fn collect_rooms<const N: usize>(
    kind: EventKind,
    targets: [Result<RoomName, &'static str>; N],
) -> Vec<RoomName> {
    let mut rooms = Vec::with_capacity(N);
    for target in targets {
        match target {
            Ok(room) => rooms.push(room),
            Err(e) => warn!(event = %kind, error = %e, "Skipping malformed target room"),
        }
    }
    rooms
}
