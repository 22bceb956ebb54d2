use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one independent counter sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CounterKey {
    /// Global per-entity-type counter, e.g. `DOC`.
    Flat { namespace: String },
    /// Counter that restarts every calendar month, e.g. support tickets.
    Periodic { prefix: String, year: i32, month: u32 },
}

impl CounterKey {
    pub fn flat(namespace: impl Into<String>) -> Self {
        CounterKey::Flat { namespace: namespace.into() }
    }

    pub fn periodic(prefix: impl Into<String>, year: i32, month: u32) -> Self {
        CounterKey::Periodic { prefix: prefix.into(), year, month }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterKey::Flat { namespace } => write!(f, "{}", namespace),
            CounterKey::Periodic { prefix, year, month } => {
                write!(f, "{}:{:04}{:02}", prefix, year, month)
            }
        }
    }
}

/// A counter row as seen inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub key: CounterKey,
    pub value: u64,
    pub updated_at: DateTime<Utc>,
}

/// Entity types that carry a prefixed public identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Clinic,
    Doctor,
    Employee,
    Patient,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 4] = [
        IdentifierKind::Clinic,
        IdentifierKind::Doctor,
        IdentifierKind::Employee,
        IdentifierKind::Patient,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            IdentifierKind::Clinic => "CL",
            IdentifierKind::Doctor => "DOC",
            IdentifierKind::Employee => "EMP",
            IdentifierKind::Patient => "PAT",
        }
    }

    pub fn digit_width(&self) -> usize {
        match self {
            IdentifierKind::Clinic => 5,
            IdentifierKind::Doctor => 4,
            IdentifierKind::Employee => 4,
            IdentifierKind::Patient => 6,
        }
    }

    /// Table holding the owning entities.
    pub fn table(&self) -> &'static str {
        match self {
            IdentifierKind::Clinic => "clinics",
            IdentifierKind::Doctor => "doctors",
            IdentifierKind::Employee => "helpdesk_users",
            IdentifierKind::Patient => "patient_profiles",
        }
    }

    /// Column the identifier is persisted in.
    pub fn column(&self) -> &'static str {
        match self {
            IdentifierKind::Clinic => "code",
            _ => "public_id",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Clinic => "clinic",
            IdentifierKind::Doctor => "doctor",
            IdentifierKind::Employee => "employee",
            IdentifierKind::Patient => "patient",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clinic" | "clinics" => Ok(IdentifierKind::Clinic),
            "doctor" | "doctors" => Ok(IdentifierKind::Doctor),
            "employee" | "employees" | "helpdesk_user" => Ok(IdentifierKind::Employee),
            "patient" | "patients" => Ok(IdentifierKind::Patient),
            other => Err(format!("unknown identifier kind '{}'", other)),
        }
    }
}

/// Support ticket numbers: `DP-SUP-YYYYMM-NNNNNN`.
pub const TICKET_NUMBER_PREFIX: &str = "DP-SUP";
pub const TICKET_NUMBER_WIDTH: usize = 6;

/// An entity row as far as identifier assignment is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub public_id: Option<String>,
}

impl EntityRecord {
    pub fn unassigned(id: impl Into<String>) -> Self {
        Self { id: id.into(), public_id: None }
    }

    /// `NULL` and `''` both mean "not assigned yet", as in the database filters.
    pub fn has_identifier(&self) -> bool {
        self.public_id.as_deref().is_some_and(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub public_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierResponse {
    pub kind: IdentifierKind,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketNumberRequest {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketNumberResponse {
    pub number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillResponse {
    pub kind: IdentifierKind,
    pub assigned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_kind_policies() {
        let shapes: Vec<(&str, usize)> = IdentifierKind::ALL
            .iter()
            .map(|kind| (kind.prefix(), kind.digit_width()))
            .collect();

        assert_eq!(shapes, vec![("CL", 5), ("DOC", 4), ("EMP", 4), ("PAT", 6)]);
    }

    #[test]
    fn test_identifier_kind_parsing() {
        assert_eq!("Clinics".parse::<IdentifierKind>(), Ok(IdentifierKind::Clinic));
        assert_eq!("employee".parse::<IdentifierKind>(), Ok(IdentifierKind::Employee));
        assert!("nurse".parse::<IdentifierKind>().is_err());
    }

    #[test]
    fn test_entity_record_blank_identifier_counts_as_missing() {
        let mut record = EntityRecord::unassigned("1");
        assert!(!record.has_identifier());

        record.public_id = Some(String::new());
        assert!(!record.has_identifier());

        // Only the exact empty string is blank; the PostgREST filter is `eq.`.
        record.public_id = Some(" ".to_string());
        assert!(record.has_identifier());

        record.public_id = Some("CL-00001".to_string());
        assert!(record.has_identifier());
    }

    #[test]
    fn test_counter_key_display() {
        assert_eq!(CounterKey::flat("DOC").to_string(), "DOC");
        assert_eq!(CounterKey::periodic("DP-SUP", 2026, 1).to_string(), "DP-SUP:202601");
    }
}
