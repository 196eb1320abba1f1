//! Registration draft validation.
//!
//! Pure shape/range checks with no side effects. Rules are applied in
//! order and the first violation is returned; callers expect a single
//! message, not an aggregate. The sex code is enforced by construction
//! (`Sex` is a two-variant enum), so no rule for it appears here.

use fieldreg_types::{CenterMap, RegistrationDraft};
use thiserror::Error;

/// Accepted mobile prefixes for the phone rule.
pub const MOBILE_PREFIXES: [&str; 5] = ["0412", "0414", "0416", "0424", "0426"];

const NATIONAL_ID_MIN_LEN: usize = 6;
const NATIONAL_ID_MAX_LEN: usize = 10;
const PHONE_LEN: usize = 11;
const MIN_AGE: u8 = 16;
const MAX_AGE: u8 = 120;

/// A violated validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("national id must be {NATIONAL_ID_MIN_LEN}-{NATIONAL_ID_MAX_LEN} digits")]
    NationalId,

    #[error("name must be at least 3 characters")]
    Name,

    #[error("phone must be {PHONE_LEN} digits starting with a mobile prefix")]
    Phone,

    #[error("age must be between {MIN_AGE} and {MAX_AGE}")]
    Age,

    #[error("voting center must not be empty")]
    MissingCenter,

    #[error("community must not be empty")]
    MissingCommunity,

    #[error("unknown voting center: {0}")]
    UnknownCenter(String),

    #[error("community {community} does not belong to center {center}")]
    CommunityMismatch { center: String, community: String },
}

/// A draft that passed validation, with its name trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidDraft(RegistrationDraft);

impl ValidDraft {
    /// Unwraps the validated draft.
    #[must_use]
    pub fn into_inner(self) -> RegistrationDraft {
        self.0
    }

    /// The validated draft.
    #[must_use]
    pub fn draft(&self) -> &RegistrationDraft {
        &self.0
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Validates a draft against the shape rules and, when a center map is
/// available, the referential center/community rule.
///
/// `centers` is `None` while the configuration mapping has not been
/// synced yet; the referential check is then skipped so that an operator
/// who has never been online can still register (presence of both keys is
/// still required).
pub fn validate(
    draft: &RegistrationDraft,
    centers: Option<&CenterMap>,
) -> Result<ValidDraft, ValidationError> {
    let id_len = draft.national_id.len();
    if !all_digits(&draft.national_id)
        || id_len < NATIONAL_ID_MIN_LEN
        || id_len > NATIONAL_ID_MAX_LEN
    {
        return Err(ValidationError::NationalId);
    }

    let name = draft.name.trim();
    if name.chars().count() < 3 {
        return Err(ValidationError::Name);
    }

    if !all_digits(&draft.phone)
        || draft.phone.len() != PHONE_LEN
        || !MOBILE_PREFIXES.iter().any(|p| draft.phone.starts_with(p))
    {
        return Err(ValidationError::Phone);
    }

    if draft.age < MIN_AGE || draft.age > MAX_AGE {
        return Err(ValidationError::Age);
    }

    if draft.voting_center.trim().is_empty() {
        return Err(ValidationError::MissingCenter);
    }
    if draft.community.trim().is_empty() {
        return Err(ValidationError::MissingCommunity);
    }

    if let Some(centers) = centers {
        if !centers.has_center(&draft.voting_center) {
            return Err(ValidationError::UnknownCenter(draft.voting_center.clone()));
        }
        if !centers.contains(&draft.voting_center, &draft.community) {
            return Err(ValidationError::CommunityMismatch {
                center: draft.voting_center.clone(),
                community: draft.community.clone(),
            });
        }
    }

    let mut validated = draft.clone();
    validated.name = name.to_string();
    Ok(ValidDraft(validated))
}
