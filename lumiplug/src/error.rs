//! Error types for lumiplug

use crate::mapper::DecodeError;
use crate::property::{Id, ResourceState};
use crate::tokens::{Package, Type};
use std::fmt;
use tonic::{Code, Status};

/// Lifecycle operation a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Check,
    Name,
    Create,
    Get,
    InspectChange,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Check => "Check",
            Operation::Name => "Name",
            Operation::Create => "Create",
            Operation::Get => "Get",
            Operation::InspectChange => "InspectChange",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }

    /// Whether a failure leaves the remote resource in an unknown state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a call failed: operation, resource type and ID when one is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub operation: Operation,
    pub ty: Type,
    pub id: Option<Id>,
}

impl CallSite {
    pub fn new(operation: Operation, ty: &Type, id: Option<&Id>) -> Self {
        Self {
            operation,
            ty: ty.clone(),
            id: id.cloned(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}({}, id={})", self.operation, self.ty, id),
            None => write!(f, "{}({})", self.operation, self.ty),
        }
    }
}

/// Error type for lumiplug operations
#[derive(Debug, thiserror::Error)]
pub enum LumiplugError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Plugin not found for package '{package}' (searched {})", .searched.join(", "))]
    PluginNotFound {
        package: Package,
        searched: Vec<String>,
    },

    #[error("Plugin for package '{package}' failed to start: {message}")]
    PluginStart { package: Package, message: String },

    #[error("Cannot marshal property '{key}': {message}")]
    Marshal { key: String, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("{site} failed: {message} ({code:?})")]
    Provider {
        site: CallSite,
        code: Code,
        message: String,
    },

    #[error("{site} failed: transport error: {}", .status.message())]
    Transport { site: CallSite, status: Box<Status> },

    #[error("{site} failed: deadline exceeded")]
    Timeout { site: CallSite },

    #[error("{site} failed: cancelled")]
    Cancelled { site: CallSite },

    #[error("{site} failed: provider contract violation: {message}")]
    ContractViolation { site: CallSite, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddressParseError(#[from] std::net::AddrParseError),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),
}

/// Result type alias for lumiplug operations
pub type Result<T> = std::result::Result<T, LumiplugError>;

impl LumiplugError {
    /// Classifies a status returned by a call
    ///
    /// Channel-level codes are transport failures; anything else was reported
    /// by the provider itself.
    pub fn from_status(site: CallSite, status: Status) -> Self {
        match status.code() {
            Code::Unavailable
            | Code::Unknown
            | Code::Cancelled
            | Code::DeadlineExceeded
            | Code::ResourceExhausted
            | Code::Aborted => LumiplugError::Transport {
                site,
                status: Box::new(status),
            },
            code => LumiplugError::Provider {
                site,
                code,
                message: status.message().to_string(),
            },
        }
    }

    /// True for failures where the call may not have reached the provider
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LumiplugError::Transport { .. }
                | LumiplugError::Timeout { .. }
                | LumiplugError::Cancelled { .. }
        )
    }

    pub fn site(&self) -> Option<&CallSite> {
        match self {
            LumiplugError::Provider { site, .. }
            | LumiplugError::Transport { site, .. }
            | LumiplugError::Timeout { site }
            | LumiplugError::Cancelled { site }
            | LumiplugError::ContractViolation { site, .. } => Some(site),
            _ => None,
        }
    }
}

/// Failure of Create, Update or Delete together with what is known about the
/// remote resource afterwards
#[derive(Debug, thiserror::Error)]
#[error("{source} (resource state: {state})")]
pub struct MutationError {
    pub state: ResourceState,
    pub source: LumiplugError,
}

impl MutationError {
    /// Failed before anything was sent; the resource is untouched
    pub fn before_call(source: LumiplugError) -> Self {
        Self {
            state: ResourceState::Ok,
            source,
        }
    }

    /// Failed after the request was sent; the resource must be re-read
    pub fn after_call(source: LumiplugError) -> Self {
        Self {
            state: ResourceState::Unknown,
            source,
        }
    }
}

/// Error returned by resource implementations inside a provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Failed(String),
}

impl From<ProviderError> for Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => Status::not_found(msg),
            ProviderError::InvalidArgument(msg) => Status::invalid_argument(msg),
            ProviderError::Conflict(msg) => Status::already_exists(msg),
            ProviderError::Failed(msg) => Status::internal(msg),
        }
    }
}

impl From<DecodeError> for ProviderError {
    fn from(err: DecodeError) -> Self {
        ProviderError::InvalidArgument(err.to_string())
    }
}

impl From<String> for ProviderError {
    fn from(s: String) -> Self {
        ProviderError::Failed(s)
    }
}

impl From<&str> for ProviderError {
    fn from(s: &str) -> Self {
        ProviderError::Failed(s.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn site(id: Option<&str>) -> CallSite {
        let ty = Type::new("aws:ec2/securityGroup:SecurityGroup").unwrap();
        CallSite::new(Operation::Update, &ty, id.map(Id::new).as_ref())
    }

    #[test]
    fn call_site_names_operation_type_and_id() {
        assert_eq!(
            site(Some("sg-1")).to_string(),
            "Update(aws:ec2/securityGroup:SecurityGroup, id=sg-1)"
        );
        assert_eq!(
            site(None).to_string(),
            "Update(aws:ec2/securityGroup:SecurityGroup)"
        );
    }

    #[test]
    fn statuses_are_classified() {
        let transport = LumiplugError::from_status(site(None), Status::unavailable("gone"));
        assert!(transport.is_transport());

        let provider = LumiplugError::from_status(site(None), Status::not_found("no such group"));
        assert!(!provider.is_transport());
        assert!(provider.to_string().contains("no such group"));
    }

    #[test]
    fn mutation_error_reports_state() {
        let err = MutationError::after_call(LumiplugError::Timeout {
            site: site(Some("sg-1")),
        });
        assert_eq!(err.state, ResourceState::Unknown);
        assert!(err.to_string().ends_with("(resource state: unknown)"));

        let err = MutationError::before_call(LumiplugError::Marshal {
            key: "vpc".to_string(),
            message: "unresolved".to_string(),
        });
        assert_eq!(err.state, ResourceState::Ok);
    }

    #[test]
    fn provider_errors_map_to_status_codes() {
        assert_eq!(
            Status::from(ProviderError::NotFound("x".into())).code(),
            Code::NotFound
        );
        assert_eq!(Status::from(ProviderError::from("boom")).code(), Code::Internal);
    }
}
