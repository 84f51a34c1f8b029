use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::rewards::RewardEntry;

/// Marker message stored in every genesis block
pub const GENESIS_MESSAGE: &str = "Genesis Block: QuranChain Begins";

/// A single verse with its original text and translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Verse {
    pub arabic: String,
    pub english: String,
}

/// The data sealed into a block
///
/// Serialized with an internal `type` tag so the persisted `data` field of a
/// block reads like `{"type": "QuranText", "surah_number": 1, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    Genesis {
        message: String,
    },

    QuranText {
        surah_number: u32,
        surah_name: String,
        verses: Vec<Verse>,
    },

    Reward {
        rewards: Vec<RewardEntry>,
    },

    User {
        username: String,
        wallet_address: String,
        quran_coin_balance: u64,
        muslim_coin_balance: u64,
    },
}

impl Payload {
    /// The genesis marker payload
    pub fn genesis() -> Self {
        Payload::Genesis {
            message: GENESIS_MESSAGE.to_string(),
        }
    }

    /// The discriminating tag, used for display and log lines only
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Genesis { .. } => "Genesis",
            Payload::QuranText { .. } => "QuranText",
            Payload::Reward { .. } => "Reward",
            Payload::User { .. } => "User",
        }
    }
}
