use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use super::amount::Amount;

/// Unique identifier of a transaction: the 32-byte hash of its body.
///
/// Hashing is performed by the ledger collaborator; the wallet only ever
/// compares and displays ids.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // first four bytes are enough to tell test transactions apart
        write!(
            f,
            "TransactionId({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Transaction format version.
///
/// Version 3 transactions opt in to the topologically-restricted
/// until-confirmation (TRUC) mempool policy; version 2 is the standard
/// format. Other versions are not relayed and never reach the wallet.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIs,
)]
pub enum TxVersion {
    #[strum(to_string = "2")]
    Standard,
    #[strum(to_string = "3")]
    Truc,
}

impl TxVersion {
    pub fn as_u32(self) -> u32 {
        match self {
            TxVersion::Standard => 2,
            TxVersion::Truc => 3,
        }
    }
}

impl TryFrom<u32> for TxVersion {
    type Error = u32;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        match version {
            2 => Ok(TxVersion::Standard),
            3 => Ok(TxVersion::Truc),
            other => Err(other),
        }
    }
}

/// Reference to one output of one transaction. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord)]
pub struct Outpoint {
    pub txid: TransactionId,
    pub index: u32,
}

impl Outpoint {
    pub const fn new(txid: TransactionId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl Display for Outpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// Opaque spending condition attached to an output.
///
/// The wallet never interprets the locking program; it only hands the lock
/// to the ownership oracle to ask "is this ours". 32 bytes is the lock
/// commitment, not the program itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord)]
pub struct ScriptLock([u8; 32]);

impl ScriptLock {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// One output of a transaction: a value and the lock that guards it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub lock: ScriptLock,
}

impl TxOutput {
    pub fn new(value: Amount, lock: ScriptLock) -> Self {
        Self { value, lock }
    }
}

/// The wallet's view of a transaction body.
///
/// Script witnesses, proofs and signatures are stripped before the ledger
/// layer hands transactions to the wallet; `vsize` is the virtual size of
/// the full serialization, reported by the same layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TransactionId,
    pub version: TxVersion,
    pub inputs: Vec<Outpoint>,
    pub outputs: Vec<TxOutput>,
    pub vsize: u64,
}

impl Transaction {
    /// A coinbase transaction creates coins and spends nothing.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// The outpoints this transaction's outputs occupy.
    pub fn output_outpoints(&self) -> impl Iterator<Item = Outpoint> + '_ {
        (0..self.outputs.len() as u32).map(|index| Outpoint::new(self.txid, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trip() {
        assert_eq!(Ok(TxVersion::Standard), TxVersion::try_from(2));
        assert_eq!(Ok(TxVersion::Truc), TxVersion::try_from(3));
        assert_eq!(Err(1), TxVersion::try_from(1));
        assert_eq!(3, TxVersion::Truc.as_u32());
        assert_eq!("3", TxVersion::Truc.to_string());
    }

    #[test]
    fn txid_display_is_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let txid = TransactionId::new(bytes);
        let shown = txid.to_string();
        assert_eq!(64, shown.len());
        assert!(shown.starts_with("ab"));
        assert!(shown.ends_with("01"));
    }
}
