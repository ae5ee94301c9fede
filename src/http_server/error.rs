use super::*;

/// Errors surfaced by the HTTP status API. Kept separate from
/// [`stratum::error::InternalError`] since these map onto HTTP status codes
/// rather than JSON-RPC error codes.
#[derive(Debug, snafu::Snafu)]
pub(crate) enum ServerError {
    #[snafu(display("{message} not found"))]
    NotFound { message: String },
}

pub(crate) type ServerResult<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let status = match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        };

        (status, message).into_response()
    }
}

/// Mirrors the teacher's `OptionExt` convenience for turning a missing
/// lookup into a 404 without a manual `match`.
pub(crate) trait OptionExt<T> {
    fn ok_or_not_found(self, message: impl FnOnce() -> String) -> ServerResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, message: impl FnOnce() -> String) -> ServerResult<T> {
        self.ok_or_else(|| ServerError::NotFound {
            message: message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_or_not_found_passes_through_some() {
        let value: Option<u32> = Some(5);
        assert_eq!(value.ok_or_not_found(|| "x".to_string()).unwrap(), 5);
    }

    #[test]
    fn ok_or_not_found_errors_on_none() {
        let value: Option<u32> = None;
        assert!(value.ok_or_not_found(|| "x".to_string()).is_err());
    }
}
