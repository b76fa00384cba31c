use rand::rngs::OsRng;
use rand::Rng;

/// Characters for generated passwords: no 0/O, 1/l/I look-alikes.
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";
const TEMPORARY_PASSWORD_LENGTH: usize = 12;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Verified against when the account does not exist, so an unknown email
/// costs the same time as a wrong password.
const DUMMY_HASH: &str = "$2a$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub fn generate_temporary_password() -> String {
    let mut rng = OsRng;
    (0..TEMPORARY_PASSWORD_LENGTH)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// bcrypt on the blocking pool
pub async fn hash_password(plain: &str, cost: u32) -> Result<String, PasswordError> {
    let plain = plain.to_string();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost)).await??;
    Ok(hashed)
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(plain: &str, hash: &str) -> Result<bool, PasswordError> {
    let plain = plain.to_string();
    let hash = hash.to_string();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash).unwrap_or(false)).await?;
    Ok(matches)
}

/// Burns one verification so missing accounts are not distinguishable by timing.
pub async fn verify_against_dummy(plain: &str) -> Result<(), PasswordError> {
    verify_password(plain, DUMMY_HASH).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_passwords_use_the_unambiguous_alphabet() {
        let password = generate_temporary_password();
        assert_eq!(password.len(), TEMPORARY_PASSWORD_LENGTH);
        assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert_ne!(password, generate_temporary_password());
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("correct horse", 4).await.unwrap();
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash").await.unwrap());
        verify_against_dummy("anything").await.unwrap();
    }
}
