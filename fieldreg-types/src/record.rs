//! Voter records and registration drafts.
//!
//! A draft is whatever an operator typed into the form, unvalidated. A
//! voter record is a validated draft plus attribution and turnout state,
//! as stored in the remote `voters` collection. Records are mutated only
//! to flip `voted`; identity fields are immutable after registration.

use crate::OperatorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sex code as captured on the registration form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "F"),
            Sex::Male => write!(f, "M"),
        }
    }
}

impl FromStr for Sex {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F" | "f" => Ok(Sex::Female),
            "M" | "m" => Ok(Sex::Male),
            other => Err(crate::Error::UnknownSexCode(other.to_string())),
        }
    }
}

/// An unvalidated registration payload submitted by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationDraft {
    /// National identity number (digits only once validated).
    pub national_id: String,
    /// Full name as written on the form.
    pub name: String,
    /// Mobile phone number, 11 digits.
    pub phone: String,
    /// Sex code.
    pub sex: Sex,
    /// Age in years.
    pub age: u8,
    /// Voting center key into the configuration mapping.
    pub voting_center: String,
    /// Community key; must belong to the voting center's configured set.
    pub community: String,
}

/// A registered voter as stored in the remote `voters` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub national_id: String,
    pub name: String,
    pub phone: String,
    pub sex: Sex,
    pub age: u8,
    pub voting_center: String,
    pub community: String,
    /// Whether turnout has been confirmed for this voter.
    pub voted: bool,
    /// When turnout was confirmed, if it was.
    pub vote_timestamp: Option<DateTime<Utc>>,
    /// Operator who registered this voter.
    pub registered_by: OperatorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VoterRecord {
    /// Builds a fresh record from a draft, attributed to the given operator.
    #[must_use]
    pub fn from_draft(draft: RegistrationDraft, registered_by: OperatorId) -> Self {
        let now = Utc::now();
        Self {
            national_id: draft.national_id,
            name: draft.name,
            phone: draft.phone,
            sex: draft.sex,
            age: draft.age,
            voting_center: draft.voting_center,
            community: draft.community,
            voted: false,
            vote_timestamp: None,
            registered_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Flips the turnout flag and stamps the vote timestamp.
    pub fn mark_voted(&mut self) {
        let now = Utc::now();
        self.voted = true;
        self.vote_timestamp = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sex_codes_parse_case_insensitively() {
        assert_eq!("F".parse::<Sex>().unwrap(), Sex::Female);
        assert_eq!("m".parse::<Sex>().unwrap(), Sex::Male);
        assert!("X".parse::<Sex>().is_err());
        assert_eq!(Sex::Female.to_string(), "F");
    }

    #[test]
    fn from_draft_starts_unvoted() {
        let draft = RegistrationDraft {
            national_id: "12345678".to_string(),
            name: "Ana".to_string(),
            phone: "04121234567".to_string(),
            sex: Sex::Female,
            age: 30,
            voting_center: "C1".to_string(),
            community: "K1".to_string(),
        };
        let operator = OperatorId::new();
        let mut record = VoterRecord::from_draft(draft, operator);

        assert!(!record.voted);
        assert!(record.vote_timestamp.is_none());
        assert_eq!(record.registered_by, operator);
        assert_eq!(record.created_at, record.updated_at);

        record.mark_voted();
        assert!(record.voted);
        assert_eq!(record.vote_timestamp, Some(record.updated_at));
    }
}
