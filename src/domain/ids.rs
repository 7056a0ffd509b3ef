//! Type-safe 32-byte identifiers shared by both ledgers.
//!
//! [`ContractId`], [`Hashlock`] and [`Preimage`] all wrap a `[u8; 32]` but
//! must never be confused with one another: a contract id keys the
//! on-chain HTLC, a hashlock keys the Lightning hold invoice, and a
//! preimage is the secret that opens both.
//!
//! All three parse from hex with or without a `0x` prefix, case-insensitive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Error returned when a 32-byte hex identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    /// Input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// Input decoded to the wrong number of bytes.
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

fn parse_bytes32(s: &str) -> Result<[u8; 32], IdParseError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    <[u8; 32]>::try_from(bytes).map_err(|_| IdParseError::InvalidLength(len))
}

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident, prefixed = $prefixed:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Wraps raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Lowercase hex without a `0x` prefix.
            #[must_use]
            pub fn to_plain_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Lowercase hex with a `0x` prefix.
            #[must_use]
            pub fn to_prefixed_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_bytes32(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if $prefixed {
                    write!(f, "0x{}", hex::encode(self.0))
                } else {
                    f.write_str(&hex::encode(self.0))
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

bytes32_id!(
    /// Identifier of an on-chain HTLC, as emitted by the contract's
    /// creation event. Displays as `0x`-prefixed hex.
    ContractId,
    prefixed = true
);

bytes32_id!(
    /// SHA-256 commitment shared by the HTLC and the Lightning invoice.
    /// Displays as `0x`-prefixed hex; also used as the hold-invoice id.
    Hashlock,
    prefixed = true
);

bytes32_id!(
    /// The secret that opens a [`Hashlock`]. Displays as plain hex, the
    /// form the Lightning node expects when settling.
    Preimage,
    prefixed = false
);

impl Preimage {
    /// Returns `true` if every byte is zero, which the HTLC contract uses
    /// for "not yet revealed".
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Computes the hashlock this preimage opens.
    #[must_use]
    pub fn hashlock(&self) -> Hashlock {
        let digest = Sha256::digest(self.0);
        Hashlock(digest.into())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const HEX: &str = "deadbeef00000000000000000000000000000000000000000000000000000001";

    #[test]
    fn parses_with_and_without_prefix() {
        let Ok(a) = HEX.parse::<ContractId>() else {
            panic!("plain hex should parse");
        };
        let Ok(b) = format!("0x{HEX}").parse::<ContractId>() else {
            panic!("prefixed hex should parse");
        };
        assert_eq!(a, b);
    }

    #[test]
    fn uppercase_hex_normalizes_to_lowercase() {
        let Ok(id) = HEX.to_uppercase().parse::<Hashlock>() else {
            panic!("uppercase hex should parse");
        };
        assert_eq!(id.to_plain_hex(), HEX);
    }

    #[test]
    fn rejects_short_input() {
        assert_eq!(
            "0xdeadbeef".parse::<ContractId>(),
            Err(IdParseError::InvalidLength(4))
        );
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            "zz".parse::<Preimage>(),
            Err(IdParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn contract_id_displays_prefixed_preimage_plain() {
        let Ok(id) = HEX.parse::<ContractId>() else {
            panic!("valid");
        };
        let Ok(secret) = HEX.parse::<Preimage>() else {
            panic!("valid");
        };
        assert_eq!(id.to_string(), format!("0x{HEX}"));
        assert_eq!(secret.to_string(), HEX);
    }

    #[test]
    fn zero_preimage_is_detected() {
        assert!(Preimage::from_bytes([0; 32]).is_zero());
        assert!(!Preimage::from_bytes([1; 32]).is_zero());
    }

    #[test]
    fn preimage_hashes_to_sha256() {
        // sha256 of 32 zero bytes
        let expected = "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925";
        let lock = Preimage::from_bytes([0; 32]).hashlock();
        assert_eq!(lock.to_plain_hex(), expected);
    }

    #[test]
    fn serializes_as_display_string() {
        let id = ContractId::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let back: Result<ContractId, _> = serde_json::from_str(&json);
        assert_eq!(back.ok(), Some(id));
    }
}
