//! Wallet address parsing.
//!
//! Users are identified by an Ethereum-style account address. The canonical
//! stored form is lowercase `0x` + 40 hex digits. Mixed-case input must carry
//! a valid EIP-55 checksum; all-lowercase and all-uppercase input is accepted
//! as unchecksummed.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Number of hex digits in an address body.
const ADDRESS_HEX_LEN: usize = 40;

/// A validated, lowercase-normalized wallet address.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and normalize an address.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAddress` if the input is not `0x` followed
    /// by 40 hex digits, or if mixed-case input fails the EIP-55 checksum.
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let invalid = || LedgerError::InvalidAddress(input.to_string());

        let body = input
            .trim()
            .strip_prefix("0x")
            .or_else(|| input.trim().strip_prefix("0X"))
            .ok_or_else(invalid)?;

        if body.len() != ADDRESS_HEX_LEN || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper && body != checksum_body(body) {
            return Err(invalid());
        }

        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    /// The normalized (lowercase) form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The EIP-55 mixed-case form, for display.
    #[must_use]
    pub fn to_checksummed(&self) -> String {
        format!("0x{}", checksum_body(&self.0[2..]))
    }
}

/// Apply EIP-55 casing to a 40-digit hex body.
fn checksum_body(body: &str) -> String {
    let lower = body.to_ascii_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());

    lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

impl FromStr for WalletAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletAddress({})", self.0)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
