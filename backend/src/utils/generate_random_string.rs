use crate::errors::{ServiceError, ServiceResult};
use rand::{Rng, distributions::Alphanumeric};
use std::future::Future;

/// Upper bound for retry-until-unused generation loops.
pub const MAX_GENERATION_ATTEMPTS: usize = 16;

/// Generates a random alphanumeric string of the specified length.
///
/// The generated string contains uppercase letters (A-Z), lowercase letters (a-z),
/// and digits (0-9). `thread_rng` is a CSPRNG, so the output is suitable for
/// tokens and secrets.
///
/// # Arguments
///
/// * `length` - The desired length of the generated string
pub fn generate_random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generates a random string of decimal digits, leading zeros allowed.
pub fn generate_numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Draws candidates from `generate` until `is_taken` reports one as unused.
///
/// Gives up after `max_attempts` draws with an internal error, so a saturated
/// key space cannot loop forever.
pub async fn generate_unique<G, F, Fut>(
    max_attempts: usize,
    mut generate: G,
    mut is_taken: F,
) -> ServiceResult<String>
where
    G: FnMut() -> String,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    for attempt in 1..=max_attempts {
        let candidate = generate();
        if !is_taken(candidate.clone()).await? {
            return Ok(candidate);
        }
        tracing::debug!("Generated value already in use (attempt {})", attempt);
    }

    Err(ServiceError::internal_error(
        "Unable to generate a unique value",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_length_and_charset() {
        let token = generate_random_string(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_numeric_code() {
        let code = generate_numeric_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_generate_unique_retries_until_free() {
        let mut calls = 0;
        let value = generate_unique(
            5,
            || {
                calls += 1;
                format!("candidate-{}", calls)
            },
            |candidate| async move { Ok(candidate != "candidate-3") },
        )
        .await
        .unwrap();

        assert_eq!(value, "candidate-3");
    }

    #[tokio::test]
    async fn test_generate_unique_is_bounded() {
        let mut draws = 0;
        let result = generate_unique(
            4,
            || {
                draws += 1;
                "always-taken".to_string()
            },
            |_| async { Ok(true) },
        )
        .await;

        assert!(matches!(result, Err(ServiceError::InternalError { .. })));
        assert_eq!(draws, 4);
    }
}
