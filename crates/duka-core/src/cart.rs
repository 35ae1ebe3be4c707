//! Cart identity and input normalization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The owner of a cart: an authenticated user or an anonymous guest token.
///
/// Exactly one of the two ids must be present on a cart request; a request
/// carrying neither is rejected at the boundary before the cart engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartIdentity {
    User(Uuid),
    Guest(Uuid),
}

impl CartIdentity {
    /// Resolve an identity from the optional ids a request carries.
    ///
    /// The user id wins when both are present, matching the lookup order of
    /// the cart engine. Returns `None` when neither id is supplied.
    #[must_use]
    pub fn from_ids(user_id: Option<Uuid>, guest_id: Option<Uuid>) -> Option<Self> {
        match (user_id, guest_id) {
            (Some(user), _) => Some(Self::User(user)),
            (None, Some(guest)) => Some(Self::Guest(guest)),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn user_id(self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(id),
            Self::Guest(_) => None,
        }
    }

    #[must_use]
    pub fn guest_id(self) -> Option<Uuid> {
        match self {
            Self::Guest(id) => Some(id),
            Self::User(_) => None,
        }
    }
}

/// Coerce a caller-supplied quantity to a positive line quantity.
///
/// Absent, zero, and negative values all fall back to 1 — an add-to-cart
/// call never decrements or no-ops a line. Values beyond `i32::MAX` are
/// clamped so the result always fits the `quantity` column.
#[must_use]
pub fn normalize_quantity(requested: Option<i64>) -> i32 {
    match requested {
        Some(n) if n > 0 => i32::try_from(n).unwrap_or(i32::MAX),
        _ => 1,
    }
}
