/*
 * Failure of an external collaborator (directory listing, preset storage or
 * flattening), carried with the backend's own message. Backend-specific error
 * types are converted into this at the session boundary so callers only deal
 * with one shape.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Listing,
    Presets,
    Flatten,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceKind::Listing => "directory listing",
            ServiceKind::Presets => "preset storage",
            ServiceKind::Flatten => "flatten",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub service: ServiceKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: ServiceKind, message: impl Into<String>) -> Self {
        ServiceError {
            service,
            message: message.into(),
        }
    }

    pub fn listing(err: impl std::fmt::Display) -> Self {
        Self::new(ServiceKind::Listing, err.to_string())
    }

    pub fn presets(err: impl std::fmt::Display) -> Self {
        Self::new(ServiceKind::Presets, err.to_string())
    }

    pub fn flatten(err: impl std::fmt::Display) -> Self {
        Self::new(ServiceKind::Flatten, err.to_string())
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} service error: {}", self.service, self.message)
    }
}

impl std::error::Error for ServiceError {}
