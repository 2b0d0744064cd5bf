use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Minimum number of meaningful characters in a user bio
pub const MIN_BIO_CHARS: usize = 10;

/// Request to match a user bio against the speaker roster
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchRequest {
    #[validate(custom(function = "validate_bio"))]
    #[serde(alias = "userBio")]
    pub user_bio: String,
    #[validate(range(min = 0.0, max = 10.0))]
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Return the full ranked roster instead of only the matches
    #[serde(default, alias = "includeAll")]
    pub include_all: bool,
}

fn validate_bio(bio: &str) -> Result<(), ValidationError> {
    if bio.trim().chars().count() < MIN_BIO_CHARS {
        let mut err = ValidationError::new("bio_too_short");
        err.message = Some("User bio must be at least 10 characters".into());
        return Err(err);
    }
    Ok(())
}
