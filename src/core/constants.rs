//! Shared constants used across the application

/// Backend base URL used when the profile does not override it.
pub const DEFAULT_BASE_URL: &str = "https://relief-backend.onrender.com";

/// Session id sent with chat messages when none is chosen explicitly.
pub const DEFAULT_SESSION_ID: &str = "default";

/// How many messages a history fetch asks for.
pub const HISTORY_FETCH_LIMIT: u32 = 200;

/// Consumable product granting 5 chats.
pub const PRODUCT_5_CHATS: &str = "mental_health_5_chats_v1";

/// Consumable product granting 10 chats.
pub const PRODUCT_10_CHATS: &str = "mental_health_10_chats_v1";

/// Chats granted per known product id. The un-suffixed ids still show up in
/// restored purchases made before the catalog was re-versioned.
///
/// The grant amount is decided by the backend; this mapping only labels
/// products in the UI and never feeds the quota cache.
pub fn chats_for_product(product_id: &str) -> Option<u32> {
    match product_id {
        "mental_health_5_chats_v1" | "mental_health_5_chats" => Some(5),
        "mental_health_10_chats_v1" | "mental_health_10_chats" => Some(10),
        _ => None,
    }
}
