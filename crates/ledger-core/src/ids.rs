//! Identifier types for the credit ledger.
//!
//! Users and API keys are keyed by UUIDs, transactions by ULIDs so that
//! lexical order of the stored text is also creation order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

/// Defines an identifier newtype over `$inner`, stored and serialized as text.
macro_rules! id_type {
    ($name:ident, $inner:ty, $new:expr, $parse:expr, $err:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name($inner);

        impl $name {
            /// Generate a fresh identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self($new())
            }

            /// Wrap an existing value.
            #[must_use]
            pub const fn from_inner(inner: $inner) -> Self {
                Self(inner)
            }

            /// The wrapped value.
            #[must_use]
            pub const fn inner(&self) -> &$inner {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $parse(s).map(Self).map_err(|_| $err)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

id_type!(
    UserId,
    Uuid,
    Uuid::new_v4,
    Uuid::parse_str,
    IdError::InvalidUuid,
    "Internal identifier of a ledger user."
);
id_type!(
    ApiKeyId,
    Uuid,
    Uuid::new_v4,
    Uuid::parse_str,
    IdError::InvalidUuid,
    "Public handle of an issued API key, used for listing and revocation."
);
id_type!(
    TransactionId,
    Ulid,
    Ulid::new,
    Ulid::from_string,
    IdError::InvalidUlid,
    "Ledger row identifier. ULIDs sort by creation time."
);

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}
