//! Subscription router - maps envelopes to the cache keys they touch.
//!
//! Pure routing logic, no I/O. The reconciler asks the router which
//! detail entry an envelope targets and which listing families it makes
//! stale; the composition root asks it which channels a cached view
//! needs a subscription for.

use crate::domain::{Channel, EntityKind, EventAction, EventEnvelope};

/// What a single envelope does to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// The detail entry the envelope targets.
    pub detail: crate::domain::CacheKey,
    /// Listing families whose cached pages can no longer be trusted.
    pub stale_listings: &'static [EntityKind],
    /// Whether the detail entry should be removed rather than upserted.
    pub remove_detail: bool,
}

/// Listing families invalidated by a mutation of the given kind.
///
/// Inventory mutations also invalidate alert listings: the low-stock view
/// is derived from inventory quantities, so any stock change can add or
/// remove rows from it.
pub(crate) fn stale_listings_for(kind: EntityKind) -> &'static [EntityKind] {
    match kind {
        EntityKind::Inventory => &[EntityKind::Inventory, EntityKind::Alert],
        EntityKind::Price => &[EntityKind::Price],
        EntityKind::Alert => &[EntityKind::Alert],
    }
}

/// Route one envelope to its cache effects.
///
/// Price events are keyed by the inventory item they price, so a price
/// change lands on the same detail entry a dashboard card reads.
pub fn route(envelope: &EventEnvelope) -> RouteOutcome {
    let kind = envelope.channel().entity_kind();

    RouteOutcome {
        detail: crate::domain::CacheKey::detail(kind, envelope.entity_id()),
        stale_listings: stale_listings_for(kind),
        remove_detail: envelope.action == EventAction::Deleted,
    }
}

/// Channels a cached view of the given kind needs live updates from.
///
/// Alert views subscribe to the inventory channel as well, because stock
/// changes reshape the alert set before any alert event is emitted.
pub fn subscribed_channels(kind: EntityKind) -> &'static [Channel] {
    match kind {
        EntityKind::Inventory => &[Channel::Inventory],
        EntityKind::Price => &[Channel::Price],
        EntityKind::Alert => &[Channel::Alerts, Channel::Inventory],
    }
}
