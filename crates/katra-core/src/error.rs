//! Error surface
//!
//! One sum type for the whole engine. Every variant carries a stable numeric
//! code so tool callers can branch without string matching, plus a short
//! suggestion string for the user-facing error line.

/// Engine-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum KatraError {
    // ========== Input errors ==========
    /// A required argument was null or empty
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),
    /// An input exceeded its length cap
    #[error("Input too long: {field} (max {max} bytes)")]
    InputTooLong {
        /// Which field
        field: &'static str,
        /// The configured cap
        max: usize,
    },
    /// A numeric input fell outside its documented range
    #[error("Out of range: {field}")]
    OutOfRange {
        /// Which field
        field: &'static str,
    },
    /// A recipient name did not resolve against the registry
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    // ========== State errors ==========
    /// Operation called before the engine was opened
    #[error("Engine not initialized")]
    NotInitialized,
    /// Init called on an already-open engine
    #[error("Engine already initialized")]
    AlreadyInitialized,
    /// The operation needs a feature that is disabled in config
    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    // ========== Capacity errors ==========
    /// Tier-1 is under critical pressure and refused a low-importance write
    #[error("Memory tier full: write refused under critical pressure")]
    MemoryTierFull,
    /// A digest bucket file is at its size cap
    #[error("Digest bucket full: {path}")]
    BucketFull {
        /// The bucket file that hit the cap
        path: String,
    },
    /// A configured capacity was exceeded
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    // ========== I/O errors ==========
    /// Underlying relational store failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// File open/read/write failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Wire encode/decode failed
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // ========== Not found ==========
    /// A requested id or name is missing
    #[error("Not found: {0}")]
    NotFound(String),

    // ========== Logic errors ==========
    /// A lock was poisoned by a panicking holder
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
    /// An internal invariant was violated
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

/// Engine-wide result type
pub type Result<T> = std::result::Result<T, KatraError>;

impl KatraError {
    /// Stable numeric code for tool callers.
    ///
    /// Thousands digit is the category: 1=input, 2=state, 3=capacity,
    /// 4=io, 5=not-found, 6=logic.
    pub fn code(&self) -> u16 {
        match self {
            KatraError::MissingInput(_) => 1001,
            KatraError::InputTooLong { .. } => 1002,
            KatraError::OutOfRange { .. } => 1003,
            KatraError::UnknownRecipient(_) => 1004,
            KatraError::NotInitialized => 2001,
            KatraError::AlreadyInitialized => 2002,
            KatraError::FeatureDisabled(_) => 2003,
            KatraError::MemoryTierFull => 3001,
            KatraError::BucketFull { .. } => 3002,
            KatraError::CapacityExceeded(_) => 3003,
            KatraError::Database(_) => 4001,
            KatraError::Io(_) => 4002,
            KatraError::Serde(_) => 4003,
            KatraError::NotFound(_) => 5001,
            KatraError::LockPoisoned(_) => 6001,
            KatraError::Invariant(_) => 6002,
        }
    }

    /// Short recovery hint for the user-facing error line
    pub fn suggestion(&self) -> &'static str {
        match self {
            KatraError::MissingInput(_) => "provide the missing argument",
            KatraError::InputTooLong { .. } => "shorten the input",
            KatraError::OutOfRange { .. } => "use a value inside the documented range",
            KatraError::UnknownRecipient(_) => "check registered agents with the registry",
            KatraError::NotInitialized => "open the engine first",
            KatraError::AlreadyInitialized => "reuse the existing handle",
            KatraError::FeatureDisabled(_) => "enable the feature in configuration",
            KatraError::MemoryTierFull => "run maintenance or raise the importance of the write",
            KatraError::BucketFull { .. } => "raise tier2_max_file_size_mb or archive less",
            KatraError::CapacityExceeded(_) => "raise the configured limit",
            KatraError::Database(_) | KatraError::Io(_) => "check disk space and permissions",
            KatraError::Serde(_) => "the stored data may be corrupt; rebuild the index",
            KatraError::NotFound(_) => "verify the id or name",
            KatraError::LockPoisoned(_) => "restart the process",
            KatraError::Invariant(_) => "report this; the store may need an index rebuild",
        }
    }

    /// One-line rendering for tool callers: message, suggestion, code.
    pub fn brief(&self) -> String {
        format!("{} ({}) [E{}]", self, self.suggestion(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_categorized() {
        assert_eq!(KatraError::MissingInput("ci_id").code() / 1000, 1);
        assert_eq!(KatraError::NotInitialized.code() / 1000, 2);
        assert_eq!(KatraError::MemoryTierFull.code() / 1000, 3);
        assert_eq!(KatraError::NotFound("x".into()).code() / 1000, 5);
    }

    #[test]
    fn test_brief_carries_code() {
        let brief = KatraError::MemoryTierFull.brief();
        assert!(brief.contains("[E3001]"));
        assert!(brief.contains("refused"));
    }
}
