use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One scraped profile. Every text field defaults to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Requested identifier, never read from the page
    pub id: u32,
    pub name: String,
    pub job_field: String,
    pub experience: String,
    pub education_level: String,
    pub min_salary: String,
    pub education_details: String,
    pub skills: String,
    pub work_experience: String,
    pub phone: String,
    pub email: String,
    pub profile_image: String,
}

impl CandidateRecord {
    /// Output column order
    pub const COLUMNS: [&'static str; 12] = [
        "id",
        "name",
        "job_field",
        "experience",
        "education_level",
        "min_salary",
        "education_details",
        "skills",
        "work_experience",
        "phone",
        "email",
        "profile_image",
    ];

    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Result of fetching one profile
#[derive(Debug)]
pub enum FetchOutcome {
    Scraped(CandidateRecord),
    /// The site answered with something other than 200
    Missing { id: u32, status: u16 },
    /// Transport-level failure
    Failed { id: u32, error: FetchError },
}

impl FetchOutcome {
    pub fn id(&self) -> u32 {
        match self {
            FetchOutcome::Scraped(record) => record.id,
            FetchOutcome::Missing { id, .. } | FetchOutcome::Failed { id, .. } => *id,
        }
    }

    /// Whether a retry could turn this into a record
    pub fn is_transient(&self) -> bool {
        match self {
            FetchOutcome::Scraped(_) => false,
            FetchOutcome::Missing { status, .. } => *status == 429 || *status >= 500,
            FetchOutcome::Failed { error, .. } => error.is_transient(),
        }
    }
}

/// Records of one batch, in completion order
#[derive(Debug, Default)]
pub struct BatchResult {
    pub records: Vec<CandidateRecord>,
    pub failures: usize,
}

impl BatchResult {
    pub fn push(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Scraped(record) => self.records.push(record),
            FetchOutcome::Missing { .. } | FetchOutcome::Failed { .. } => self.failures += 1,
        }
    }
}
