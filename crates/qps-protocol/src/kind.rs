//! Client, RPC and server kind selectors.
//!
//! Kinds travel as strings. A string outside the known set decodes into the
//! `Unrecognized` variant instead of failing the whole message, so a worker
//! can tell a driver/worker version mismatch apart from a malformed frame.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! wire_kind {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this build does not know about.
            Unrecognized(String),
        }

        impl $name {
            /// Wire name of this kind.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Unrecognized(raw) => raw.as_str(),
                }
            }

            pub fn is_recognized(&self) -> bool {
                !matches!(self, Self::Unrecognized(_))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.as_str() {
                    $( $wire => Self::$variant, )+
                    _ => Self::Unrecognized(raw),
                }
            }
        }

        impl From<$name> for String {
            fn from(kind: $name) -> Self {
                match kind {
                    $name::Unrecognized(raw) => raw,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_kind! {
    /// Threading model of a load-generating client.
    pub enum ClientType {
        Synchronous => "SYNCHRONOUS_CLIENT",
        Async => "ASYNC_CLIENT",
    }
}

wire_kind! {
    /// Shape of the RPCs a client issues.
    pub enum RpcType {
        Unary => "UNARY",
        Streaming => "STREAMING",
    }
}

wire_kind! {
    /// Threading model of a server-under-test.
    pub enum ServerType {
        Synchronous => "SYNCHRONOUS_SERVER",
        Async => "ASYNC_SERVER",
    }
}
