pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The object was written concurrently. The whole reconcile is retried.
    #[error("the object has been modified; please apply your changes to the latest version")]
    Conflict,

    /// The API server refused the request and will keep refusing it.
    #[error("the request was rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Kube(kube::Error),

    #[error("failed to serialize status: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A failure to create a scan's execution units.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct WorkloadError {
    /// Retriable failures are retried after a fixed delay; others fail the scan.
    pub retriable: bool,
    #[source]
    pub source: Error,
}

// === impl Error ===

impl Error {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Rejected(_) => "rejected",
            Self::Kube(_) => "kube",
            Self::Serialize(_) => "serialize",
        }
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(rsp) if rsp.code == 409 => Self::Conflict,
            kube::Error::Api(rsp) if matches!(rsp.code, 400 | 403 | 422) => {
                Self::Rejected(rsp.message)
            }
            error => Self::Kube(error),
        }
    }
}

// === impl WorkloadError ===

impl From<Error> for WorkloadError {
    fn from(source: Error) -> Self {
        Self {
            retriable: !matches!(source, Error::Rejected(_)),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn classifies_api_errors() {
        assert!(matches!(Error::from(api_error(409, "Conflict")), Error::Conflict));
        assert!(matches!(
            Error::from(api_error(422, "Invalid")),
            Error::Rejected(msg) if msg == "Invalid happened"
        ));
        assert!(matches!(
            Error::from(api_error(500, "InternalError")),
            Error::Kube(_)
        ));
    }

    #[test]
    fn only_rejections_are_not_retriable() {
        assert!(!WorkloadError::from(Error::Rejected("forbidden".to_string())).retriable);
        assert!(WorkloadError::from(Error::Conflict).retriable);
        assert!(WorkloadError::from(Error::from(api_error(503, "ServiceUnavailable"))).retriable);
    }
}
