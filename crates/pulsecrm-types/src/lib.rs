//! Core types and traits shared across the PulseCRM workspace.
//!
//! Domain records (leads, conversations, cases, carts, invoices, content,
//! alerts), the structured results produced by the AI services, the LLM
//! message model and the daemon configuration all live here so that the
//! persistence, runtime, kernel and API crates agree on one vocabulary.

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// persisted form is a fixed string.
#[macro_export]
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stable string form used in storage and on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub mod alert;
pub mod case;
pub mod commerce;
pub mod config;
pub mod content;
pub mod conversation;
pub mod customer;
pub mod intent;
pub mod lead;
pub mod message;
pub mod prediction;
pub mod routing;
pub mod sentiment;

/// Returned when a stored string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Generate a fresh random identifier for a persisted record.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
