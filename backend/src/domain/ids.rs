//! Integer identifiers used across the dispatch domain.
//!
//! Every identifier is a transparent wrapper over `i64` so the persistence
//! layer can store it in a `BIGINT` column while the domain keeps order ids,
//! technician ids and external chat ids from being mixed up.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw identifier.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

define_id! {
    /// Monotonic order identifier assigned by the store.
    OrderId
}

define_id! {
    /// External 64-bit principal id of a platform user.
    UserId
}

define_id! {
    /// Technician record identifier.
    TechnicianId
}

define_id! {
    /// External chat (group or private conversation) identifier.
    ChatId
}

define_id! {
    /// External message identifier within a chat.
    MessageId
}

define_id! {
    /// Stored period report identifier.
    ReportId
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("42", 42)]
    #[case(" -1001 ", -1001)]
    fn ids_parse_from_text(#[case] raw: &str, #[case] expected: i64) {
        let id: ChatId = raw.parse().expect("numeric id");
        assert_eq!(id.get(), expected);
    }

    #[rstest]
    fn ids_serialise_as_plain_numbers() {
        let json = serde_json::to_string(&OrderId::new(7)).expect("serialise id");
        assert_eq!(json, "7");
    }
}
