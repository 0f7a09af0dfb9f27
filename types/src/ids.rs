use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Row id of a listed place.
    PlaceId
);
row_id!(
    /// Row id of a place category (`general_services`).
    CategoryId
);
row_id!(
    /// Row id of a `business_owners` request.
    OwnerRequestId
);
row_id!(ClaimTokenId);
row_id!(PaymentEventId);
row_id!(AuditEntryId);
row_id!(
    /// Telegram user id of a person acting on the system (owner or admin).
    TgUserId
);
