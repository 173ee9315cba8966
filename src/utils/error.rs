use thiserror::Error;

#[derive(Error, Debug)]
pub enum CostingError {
    #[error("Allocation for {field} out of range: {amount:.2} (maximum RM {max:.2})")]
    OutOfRangeAllocation { field: String, amount: f64, max: f64 },

    #[error("Allocation for {field} would exceed total payment received by RM {excess:.2}")]
    OverAllocation { field: String, excess: f64 },

    #[error("Payment cannot exceed total project cost (RM {total_cost:.2}), got RM {amount:.2}")]
    OverReceipt { amount: f64, total_cost: f64 },

    #[error("Bank details incomplete for: {}", fields.join(", "))]
    IncompleteBankDetails { fields: Vec<String> },

    #[error("Management fee organization {org} is already selected")]
    DuplicateManagementOrg { org: String },

    #[error("At most {max} management fee entries are allowed")]
    ManagementFeeLimit { max: usize },

    #[error("Consultant {consultant_id} is already on the project")]
    DuplicateConsultant { consultant_id: i64 },

    #[error("No {section} item at index {index}")]
    ItemNotFound { section: String, index: usize },

    #[error("Consultant {consultant_id} is not on the project")]
    ConsultantNotFound { consultant_id: i64 },

    #[error("Bank details for consultants come from their profile and cannot be edited here")]
    ReadOnlyBankDetails,

    #[error("Auto allocation requires the payment received (RM {received:.2}) to equal the total cost (RM {total_cost:.2})")]
    AutoAllocateUnavailable { received: f64, total_cost: f64 },

    #[error("Memo amount for {field} exceeds the unpaid balance: RM {amount:.2} (balance RM {balance:.2})")]
    MemoBalanceExceeded {
        field: String,
        amount: f64,
        balance: f64,
    },

    #[error("Memo is incomplete: {reason}")]
    IncompleteMemo { reason: String },

    #[error("Step '{step}' is incomplete: {reason}")]
    StepIncomplete { step: String, reason: String },

    #[error("A submission is already in progress")]
    SubmissionInProgress,

    #[error("Validation failed on server: {message}")]
    ValidationError { message: String },

    #[error("Not authorized (status {status}): {message}")]
    AuthError { status: u16, message: String },

    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Allocation,
    CostBreakdown,
    Workflow,
    Api,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CostingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CostingError::OutOfRangeAllocation { .. }
            | CostingError::OverAllocation { .. }
            | CostingError::OverReceipt { .. }
            | CostingError::IncompleteBankDetails { .. }
            | CostingError::ReadOnlyBankDetails
            | CostingError::AutoAllocateUnavailable { .. }
            | CostingError::MemoBalanceExceeded { .. }
            | CostingError::IncompleteMemo { .. } => ErrorCategory::Allocation,
            CostingError::DuplicateManagementOrg { .. }
            | CostingError::ManagementFeeLimit { .. }
            | CostingError::DuplicateConsultant { .. }
            | CostingError::ItemNotFound { .. }
            | CostingError::ConsultantNotFound { .. } => ErrorCategory::CostBreakdown,
            CostingError::StepIncomplete { .. } | CostingError::SubmissionInProgress => {
                ErrorCategory::Workflow
            }
            CostingError::ValidationError { .. }
            | CostingError::AuthError { .. }
            | CostingError::ServerError { .. }
            | CostingError::NotFound { .. }
            | CostingError::RequestFailed { .. }
            | CostingError::HttpError(_) => ErrorCategory::Api,
            CostingError::ConfigError { .. }
            | CostingError::InvalidConfigValueError { .. }
            | CostingError::MissingConfigError { .. } => ErrorCategory::Configuration,
            CostingError::IoError(_) | CostingError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 草稿內的錯誤都可以修正後重試
            ErrorCategory::Allocation | ErrorCategory::CostBreakdown => ErrorSeverity::Low,
            ErrorCategory::Workflow => ErrorSeverity::Medium,
            ErrorCategory::Api => match self {
                CostingError::ServerError { .. } | CostingError::HttpError(_) => {
                    ErrorSeverity::Medium
                }
                _ => ErrorSeverity::High,
            },
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Core errors never invalidate the draft.
    pub fn is_recoverable(&self) -> bool {
        self.severity() <= ErrorSeverity::Medium
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            CostingError::OutOfRangeAllocation { max, .. } => {
                format!("Enter an amount between 0 and RM {:.2}", max)
            }
            CostingError::OverAllocation { .. } => {
                "Reduce another allocation first, or lower this one".to_string()
            }
            CostingError::OverReceipt { total_cost, .. } => {
                format!("Enter a payment no greater than RM {:.2}", total_cost)
            }
            CostingError::IncompleteBankDetails { .. } => {
                "Fill in bank name, account holder and account number for every allocated item"
                    .to_string()
            }
            CostingError::DuplicateManagementOrg { .. } => {
                "Choose a different organization for this entry".to_string()
            }
            CostingError::ManagementFeeLimit { .. } => {
                "Remove an existing management fee entry before adding another".to_string()
            }
            CostingError::DuplicateConsultant { .. } => {
                "The consultant is already listed; edit the existing row instead".to_string()
            }
            CostingError::ItemNotFound { .. } => "Refresh the draft and try again".to_string(),
            CostingError::ConsultantNotFound { .. } => {
                "Check the consultant id against the project's consultant list".to_string()
            }
            CostingError::MemoBalanceExceeded { balance, .. } => {
                format!("Enter an amount no greater than RM {:.2}", balance)
            }
            CostingError::IncompleteMemo { .. } => {
                "Fill in the memo header and every item's payee details".to_string()
            }
            CostingError::ReadOnlyBankDetails => {
                "Update the consultant's bank details in their profile".to_string()
            }
            CostingError::AutoAllocateUnavailable { .. } => {
                "Set the payment received equal to the total project cost, or allocate manually"
                    .to_string()
            }
            CostingError::StepIncomplete { .. } => {
                "Complete the highlighted fields before continuing".to_string()
            }
            CostingError::SubmissionInProgress => {
                "Wait for the current submission to finish".to_string()
            }
            CostingError::ValidationError { .. } => {
                "Review the project fields rejected by the server".to_string()
            }
            CostingError::AuthError { .. } => {
                "Sign in again or check the configured access token".to_string()
            }
            CostingError::ServerError { .. } | CostingError::HttpError(_) => {
                "Try again later; the draft has been kept".to_string()
            }
            CostingError::NotFound { .. } => "Check the API base URL".to_string(),
            CostingError::RequestFailed { .. } => "Check the request and try again".to_string(),
            CostingError::IoError(_) => "Check the file path and permissions".to_string(),
            CostingError::SerializationError(_) => "Check the draft file is valid JSON".to_string(),
            CostingError::ConfigError { .. }
            | CostingError::InvalidConfigValueError { .. }
            | CostingError::MissingConfigError { .. } => {
                "Fix the configuration file or command line arguments".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Api => format!("Could not reach the project service: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CostingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_are_recoverable() {
        let err = CostingError::OverReceipt {
            amount: 25000.0,
            total_cost: 20723.0,
        };
        assert_eq!(err.category(), ErrorCategory::Allocation);
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("20723.00"));
    }

    #[test]
    fn test_incomplete_bank_details_lists_fields() {
        let err = CostingError::IncompleteBankDetails {
            fields: vec!["directCost-0".to_string(), "sstAllocation-0".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Bank details incomplete for: directCost-0, sstAllocation-0"
        );
    }

    #[test]
    fn test_consultant_not_found_keeps_signed_id() {
        let err = CostingError::ConsultantNotFound { consultant_id: -3 };
        assert_eq!(err.to_string(), "Consultant -3 is not on the project");
        assert_eq!(err.category(), ErrorCategory::CostBreakdown);
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_api_error_severity() {
        let auth = CostingError::AuthError {
            status: 401,
            message: "expired".to_string(),
        };
        let server = CostingError::ServerError {
            status: 503,
            message: "down".to_string(),
        };
        assert_eq!(auth.severity(), ErrorSeverity::High);
        assert_eq!(server.severity(), ErrorSeverity::Medium);
        assert!(server.user_friendly_message().starts_with("Could not reach"));
    }
}
