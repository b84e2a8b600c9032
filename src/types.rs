use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;

/// On-chain account identifier.
pub type Address = Pubkey;

/// Dynamically-typed report or decoded record: nested maps, arrays and scalars.
pub type Record = serde_json::Value;

pub const SYSTEM_PROGRAM_ID: Address = Pubkey::from_str_const("11111111111111111111111111111111");
pub const SYSVAR_INSTRUCTIONS_ID: Address =
    Pubkey::from_str_const("Sysvar1nstructions1111111111111111111111111");
pub const TOKEN_PROGRAM_ID: Address =
    Pubkey::from_str_const("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Address =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const WRAPPED_SOL_MINT: Address =
    Pubkey::from_str_const("So11111111111111111111111111111111111111112");

/// An account reference as it appears in an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountMeta {
    #[serde(with = "base58")]
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(address: Address, is_signer: bool, is_writable: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable,
        }
    }

    pub fn readonly(address: Address) -> Self {
        Self::new(address, false, false)
    }
}

/// A fully assembled instruction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// A raw program event as returned by the log poller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    /// Program that emitted the event.
    #[serde(with = "base58")]
    pub program_id: Address,
    /// Slot in which the transaction landed.
    pub slot: u64,
    /// Unix seconds of the containing block.
    pub block_time: i64,
    /// Transaction signature (base58).
    pub signature: String,
    /// Position of this event within the transaction logs.
    pub log_index: u32,
    /// Whether the containing transaction failed.
    #[serde(default)]
    pub reverted: bool,
    /// Anchor event payload: 8-byte discriminator followed by Borsh data.
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Server-side filter handed to [`crate::ChainClient::fetch_events`].
///
/// Clients may ignore any part of it; the reader re-applies the same filter to whatever
/// comes back.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    pub program_id: Address,
    pub event_name: String,
    pub discriminator: [u8; 8],
    /// Events from blocks older than this (unix seconds) are out of the retention window.
    pub since: i64,
    pub include_reverted: bool,
    /// At most three `(on-chain path, expected value)` pairs.
    pub indexed: Vec<IndexedFilter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFilter {
    pub on_chain_path: String,
    pub value: Record,
}

/// Base58 serde representation for addresses in config documents.
pub mod base58 {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};
    use solana_pubkey::Pubkey;

    pub fn serialize<S: Serializer>(address: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(address)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(|e| serde::de::Error::custom(format!("{s}: {e}")))
    }

    pub mod vec {
        use std::str::FromStr;

        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serializer};
        use solana_pubkey::Pubkey;

        pub fn serialize<S: Serializer>(
            addresses: &[Pubkey],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(addresses.len()))?;
            for address in addresses {
                seq.serialize_element(&address.to_string())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Pubkey>, D::Error> {
            let raw = Vec::<String>::deserialize(deserializer)?;
            raw.iter()
                .map(|s| {
                    Pubkey::from_str(s).map_err(|e| serde::de::Error::custom(format!("{s}: {e}")))
                })
                .collect()
        }
    }
}

/// `0x`-prefixed hex serde representation for byte payloads.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Seconds-based serde representation for retention windows.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
