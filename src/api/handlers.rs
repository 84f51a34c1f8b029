use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::location::{self, Coordinates};
use crate::blockchain::{Block, Chapter, Payload, RewardEntry, RewardError, Wallet, WalletError};

use super::AppState;

/// Shared node state
pub type AppData = web::Data<AppState>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    #[schema(value_type = Object)]
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(state: AppData) -> impl Responder {
    let chain = state.chain.blocks();
    let is_valid = state.chain.validate();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    })
}

/// Check if the blockchain is valid
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.chain.validate())
}

/// Request for the register endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// The username to register
    pub username: String,
}

/// Response for the register endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    /// The new wallet
    pub wallet: Wallet,

    /// Index of the block recording the registration
    pub block_index: u64,
}

/// Register a user
///
/// Creates a zero-balance wallet and records the registration on chain
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = RegisterResponse),
        (status = 400, description = "Invalid username"),
        (status = 409, description = "Username already taken"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_user(state: AppData, request: web::Json<RegisterRequest>) -> impl Responder {
    let username = request.username.trim();
    if username.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Username must not be empty"
        }));
    }

    let wallet = match state.wallets.register(username) {
        Ok(wallet) => wallet,
        Err(err @ WalletError::DuplicateUsername(_)) => {
            return HttpResponse::Conflict().json(serde_json::json!({
                "error": err.to_string()
            }));
        }
        Err(err) => {
            error!("Failed to register {}: {}", username, err);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to register user: {}", err)
            }));
        }
    };

    let payload = Payload::User {
        username: wallet.username.clone(),
        wallet_address: wallet.address.clone(),
        quran_coin_balance: wallet.quran_coin_balance,
        muslim_coin_balance: wallet.muslim_coin_balance,
    };

    let data = state.clone();
    match web::block(move || data.chain.append(payload)).await {
        Ok(Ok(block)) => HttpResponse::Created().json(RegisterResponse {
            wallet,
            block_index: block.index(),
        }),
        Ok(Err(err)) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Wallet created but registration block failed: {}", err)
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Mining task failed: {}", err)
        })),
    }
}

/// Get a user's wallet
#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    responses(
        (status = 200, description = "Wallet retrieved successfully", body = Wallet),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn get_user(state: AppData, username: web::Path<String>) -> impl Responder {
    let username = username.into_inner();

    match state.wallets.get(&username) {
        Some(wallet) => HttpResponse::Ok().json(wallet),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": WalletError::UnknownUsername(username).to_string()
        })),
    }
}

/// Get wallet balance
///
/// Returns both balances of the wallet with the given address
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance/{address}",
    responses(
        (status = 200, description = "Wallet balance retrieved successfully", body = Wallet),
        (status = 404, description = "Unknown address")
    )
)]
pub async fn get_wallet_balance(state: AppData, address: web::Path<String>) -> impl Responder {
    match state.wallets.find_by_address(address.as_str()) {
        Some(wallet) => HttpResponse::Ok().json(wallet),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("No wallet with address {}", address.as_str())
        })),
    }
}

/// Kind of reward being submitted
///
/// `MuslimCoin` is refused here; it is only earned by a location check-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub enum RewardKind {
    QuranCoin,
    MuslimCoin,
    #[serde(rename = "NFT")]
    Nft,
}

/// Request for the submit reward endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RewardRequest {
    /// The kind of reward
    pub reward_type: RewardKind,

    /// Username of the miner
    pub miner: String,

    /// Surah number (QuranCoin)
    pub surah: Option<u32>,

    /// Number of ayahs memorized (QuranCoin)
    pub ayah_count: Option<u64>,

    /// Memorization progress (NFT)
    pub completion_percent: Option<u8>,
}

impl RewardRequest {
    /// Converts the request into a reward entry
    pub fn into_entry(self) -> Result<RewardEntry, String> {
        fn required<T>(value: Option<T>, field: &str) -> Result<T, String> {
            value.ok_or_else(|| format!("Missing field: {}", field))
        }

        match self.reward_type {
            RewardKind::QuranCoin => Ok(RewardEntry::text(
                self.miner,
                required(self.surah, "surah")?,
                required(self.ayah_count, "ayah_count")?,
            )),
            RewardKind::MuslimCoin => {
                Err("MuslimCoin rewards are only issued through /api/v1/checkin".to_string())
            }
            RewardKind::Nft => Ok(RewardEntry::achievement(
                self.miner,
                required(self.completion_percent, "completion_percent")?,
            )),
        }
    }
}

/// Response for the reward endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RewardResponse {
    /// The message
    pub message: String,

    /// The queued reward
    #[schema(value_type = Object)]
    pub reward: RewardEntry,

    /// Number of rewards waiting for the next flush
    pub pending: usize,
}

/// Submit a reward
///
/// Queues a reward for the next reward block
#[utoipa::path(
    post,
    path = "/api/v1/rewards",
    request_body = RewardRequest,
    responses(
        (status = 202, description = "Reward queued", body = RewardResponse),
        (status = 400, description = "Invalid reward data, or a MuslimCoin reward outside check-in")
    )
)]
pub async fn submit_reward(state: AppData, request: web::Json<RewardRequest>) -> impl Responder {
    let reward = match request.into_inner().into_entry() {
        Ok(reward) => reward,
        Err(message) => {
            return HttpResponse::BadRequest().json(serde_json::json!({ "error": message }));
        }
    };

    match state.rewards.add(reward.clone()) {
        Ok(pending) => HttpResponse::Accepted().json(RewardResponse {
            message: format!("{} reward queued for {}", reward.reward_type(), reward.miner()),
            reward,
            pending,
        }),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string()
        })),
    }
}

/// Get all pending rewards
#[utoipa::path(
    get,
    path = "/api/v1/rewards/pending",
    responses(
        (status = 200, description = "Pending rewards retrieved successfully")
    )
)]
pub async fn get_pending_rewards(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.rewards.pending())
}

/// Response for the flush endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FlushResponse {
    /// The message
    pub message: String,

    /// The reward block
    #[schema(value_type = Object)]
    pub block: Block,

    /// Wallets credited by the block
    pub credited: Vec<Wallet>,
}

/// Flush pending rewards
///
/// Mines one block holding every pending reward and credits registered miners
#[utoipa::path(
    post,
    path = "/api/v1/rewards/flush",
    responses(
        (status = 200, description = "Reward block mined", body = FlushResponse),
        (status = 204, description = "No pending rewards"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn flush_rewards(state: AppData) -> impl Responder {
    let data = state.clone();
    let block = match web::block(move || data.rewards.flush(&data.chain)).await {
        Ok(Ok(Some(block))) => block,
        Ok(Ok(None)) => return HttpResponse::NoContent().finish(),
        Ok(Err(err)) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to mine reward block: {}", err)
            }));
        }
        Err(err) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Mining task failed: {}", err)
            }));
        }
    };

    let credited = match block.data() {
        Payload::Reward { rewards } => state.wallets.apply_rewards(rewards),
        _ => Ok(Vec::new()),
    };

    match credited {
        Ok(credited) => HttpResponse::Ok().json(FlushResponse {
            message: "New Reward Block Mined".to_string(),
            block,
            credited,
        }),
        Err(err) => {
            error!("Reward block {} mined but crediting failed: {}", block.index(), err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Reward block mined but crediting failed: {}", err),
                "block_index": block.index()
            }))
        }
    }
}

/// Request for the check-in endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CheckInRequest {
    /// Username of the miner
    pub miner: String,

    /// Where the miner is
    pub location: Coordinates,

    /// Number of prayers
    #[serde(default = "default_prayer_count")]
    pub prayer_count: u64,
}

fn default_prayer_count() -> u64 {
    1
}

/// Check in at a registered location
///
/// Queues a MuslimCoin reward if the miner is within 50 meters of a registered location
#[utoipa::path(
    post,
    path = "/api/v1/checkin",
    request_body = CheckInRequest,
    responses(
        (status = 202, description = "Check-in successful, reward queued", body = RewardResponse),
        (status = 400, description = "No registered location nearby"),
        (status = 503, description = "No check-in locations are configured")
    )
)]
pub async fn check_in(state: AppData, request: web::Json<CheckInRequest>) -> impl Responder {
    let request = request.into_inner();

    let reward = match location::check_in(&state.locations, &request.miner, request.location, request.prayer_count) {
        Ok(reward) => reward,
        Err(err @ RewardError::NoLocations) => {
            return HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": err.to_string()
            }));
        }
        Err(err) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": err.to_string()
            }));
        }
    };

    let message = match &reward {
        RewardEntry::CheckIn { location, .. } => format!("Check-in successful at {}", location),
        _ => "Check-in successful".to_string(),
    };

    match state.rewards.add(reward.clone()) {
        Ok(pending) => HttpResponse::Accepted().json(RewardResponse {
            message,
            reward,
            pending,
        }),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string()
        })),
    }
}

/// Response for the chapters endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChaptersResponse {
    /// The message
    pub message: String,

    /// Indices of the mined blocks, one per chapter
    pub block_indices: Vec<u64>,
}

/// Add text chapters
///
/// Mines one block per chapter, in order
#[utoipa::path(
    post,
    path = "/api/v1/chapters",
    request_body = Vec<Chapter>,
    responses(
        (status = 201, description = "Chapters added", body = ChaptersResponse),
        (status = 400, description = "No chapters given"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn add_chapters(state: AppData, chapters: web::Json<Vec<Chapter>>) -> impl Responder {
    let chapters = chapters.into_inner();
    if chapters.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "No chapters given"
        }));
    }

    let data = state.clone();
    match web::block(move || data.chain.append_chapters(chapters)).await {
        Ok(Ok(blocks)) => HttpResponse::Created().json(ChaptersResponse {
            message: format!("Mined {} chapter blocks", blocks.len()),
            block_indices: blocks.iter().map(Block::index).collect(),
        }),
        Ok(Err(err)) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to add chapters: {}", err)
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Mining task failed: {}", err)
        })),
    }
}
