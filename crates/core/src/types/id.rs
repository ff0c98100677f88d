//! Newtype IDs for type-safe document references.
//!
//! Document databases key everything by opaque strings, so a restaurant ID,
//! an order ID and a user's UID are all `String` underneath. Use the
//! `define_id!` macro to keep them from being mixed up.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an ID.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty or only whitespace.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Name of the ID type that rejected the input.
        kind: &'static str,
    },
    /// The input contains a `/`, which would address a nested document path.
    #[error("{kind} cannot contain '/'")]
    ContainsSlash {
        /// Name of the ID type that rejected the input.
        kind: &'static str,
    },
    /// The input is `.`, `..` or wrapped in double underscores, which the
    /// document database reserves.
    #[error("{kind} uses a reserved name")]
    Reserved {
        /// Name of the ID type that rejected the input.
        kind: &'static str,
    },
}

/// Whether a document database reserves this id.
#[must_use]
pub fn is_reserved_id(id: &str) -> bool {
    id == "." || id == ".." || (id.len() >= 4 && id.starts_with("__") && id.ends_with("__"))
}

/// Macro to define a type-safe document ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()` (validating) and `as_str()`
/// - `Display`, `FromStr` and `AsRef<str>` implementations
///
/// # Example
///
/// ```rust
/// # use qr_table_core::define_id;
/// define_id!(RestaurantId);
/// define_id!(OrderId);
///
/// let restaurant = RestaurantId::parse("rest123").unwrap();
/// let order = OrderId::parse("rest123").unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: RestaurantId = order;
/// # let _ = (restaurant, order);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Parse an ID, rejecting empty values, path separators and
            /// reserved names.
            ///
            /// Surrounding whitespace is trimmed.
            ///
            /// # Errors
            ///
            /// Returns `IdError` if the input is empty, contains `/`, or is
            /// `.`, `..` or `__name__`.
            pub fn parse(s: &str) -> ::core::result::Result<Self, $crate::IdError> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err($crate::IdError::Empty {
                        kind: stringify!($name),
                    });
                }
                if trimmed.contains('/') {
                    return Err($crate::IdError::ContainsSlash {
                        kind: stringify!($name),
                    });
                }
                if $crate::is_reserved_id(trimmed) {
                    return Err($crate::IdError::Reserved {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(RestaurantId);
define_id!(OrderId);
define_id!(MenuItemId);
define_id!(Uid);

/// Table number printed on the QR code.
///
/// Kept as a string because tables are labelled, not counted: `"01"` and
/// `"1"` are different tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableNo(String);

impl TableNo {
    /// Table used when the URL carries no `table` parameter.
    pub const DEFAULT: &'static str = "01";

    /// Parse a table number, falling back to [`TableNo::DEFAULT`] for blank input.
    #[must_use]
    pub fn parse_or_default(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some(t) if !t.is_empty() => Self(t.to_owned()),
            _ => Self::default(),
        }
    }

    /// Returns the table number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableNo {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for TableNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
