//! Outbound admin notifications.
//!
//! The service calls the notifier only after the owning transaction has
//! committed. Delivery (chat message, job queue) belongs to the collaborator.

use bizpass_types::{OwnerRequestId, PlaceId, TgUserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminEvent {
    OwnerRequestCreated {
        request: OwnerRequestId,
        place: PlaceId,
        place_name: String,
        owner: TgUserId,
    },
    OwnerClaimRequested {
        request: OwnerRequestId,
        place: PlaceId,
        place_name: String,
        owner: TgUserId,
    },
    OwnerRequestApproved {
        request: OwnerRequestId,
        place: PlaceId,
        owner: TgUserId,
        actor: TgUserId,
    },
    OwnerRequestRejected {
        request: OwnerRequestId,
        place: PlaceId,
        owner: TgUserId,
        actor: TgUserId,
    },
}

impl AdminEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            AdminEvent::OwnerRequestCreated { .. } => "owner_request_created",
            AdminEvent::OwnerClaimRequested { .. } => "owner_claim_requested",
            AdminEvent::OwnerRequestApproved { .. } => "owner_request_approved",
            AdminEvent::OwnerRequestRejected { .. } => "owner_request_rejected",
        }
    }

    #[must_use]
    pub const fn place(&self) -> PlaceId {
        match self {
            AdminEvent::OwnerRequestCreated { place, .. }
            | AdminEvent::OwnerClaimRequested { place, .. }
            | AdminEvent::OwnerRequestApproved { place, .. }
            | AdminEvent::OwnerRequestRejected { place, .. } => *place,
        }
    }
}

/// Fire-and-forget sink for [`AdminEvent`]s.
pub trait AdminNotifier: Send + Sync {
    fn notify(&self, event: &AdminEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl AdminNotifier for NoopNotifier {
    fn notify(&self, _event: &AdminEvent) {}
}

/// Writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl AdminNotifier for TracingNotifier {
    fn notify(&self, event: &AdminEvent) {
        tracing::info!(kind = event.kind(), place_id = %event.place(), ?event, "Admin notification");
    }
}
