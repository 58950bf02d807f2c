use actix_web::web;
use bcrypt::hash;

use crate::error::AppError;

/// Work factor for stored password hashes.
pub const HASH_COST: u32 = 10;

/// Hashes on the blocking thread pool.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    let hashed = web::block(move || hash(password, HASH_COST)).await??;
    Ok(hashed)
}
