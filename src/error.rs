use thiserror::Error;

/// Errors raised while loading a region's dataset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Unknown region: {0}")]
    InvalidRegion(String),

    #[error("Data for region {region} is unavailable: {reason}")]
    DataUnavailable { region: String, reason: String },
}

impl LoadError {
    pub fn unavailable(region: impl Into<String>, reason: impl ToString) -> Self {
        LoadError::DataUnavailable {
            region: region.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::DataUnavailable { .. })
    }

    /// Short message for the status area of the table view.
    pub fn user_message(&self) -> String {
        match self {
            LoadError::InvalidRegion(key) => format!("Region '{}' is not configured", key),
            LoadError::DataUnavailable { region, reason } => {
                format!("Could not read data for {}: {}", region, reason)
            }
        }
    }
}
