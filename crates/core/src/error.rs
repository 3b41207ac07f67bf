use thiserror::Error;

/// Validation failures surfaced synchronously at campaign-create time.
/// Per the error-handling taxonomy, these never reach persistence.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("template '{0}' is not eligible for campaign use (must be approved, active, non-quarantined, non-marketing)")]
    TemplateNotEligible(String),

    #[error("campaign must list at least one template")]
    EmptyTemplateList,

    #[error("CSV row {row} could not be read: {reason}")]
    MalformedCsvRow { row: usize, reason: String },

    #[error("no valid contacts found in CSV input")]
    NoValidContacts,
}

/// Phone validation failure reasons, stored verbatim as
/// `CampaignContact.invalid_reason`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PhoneValidationError {
    #[error("expected {expected} digits after stripping non-digits, found {found}")]
    WrongLength { expected: usize, found: usize },

    #[error("number does not start with required country prefix '{prefix}'")]
    WrongPrefix { prefix: String },
}

/// Top-level error type for engine-internal operations (persistence,
/// orchestration, queue processing) that aren't validation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("campaign {0} not found")]
    CampaignNotFound(uuid::Uuid),

    #[error("campaign {0} cannot be deleted while running")]
    CannotDeleteRunning(uuid::Uuid),
}
