use super::*;

#[derive(Debug, Snafu)]
pub enum InternalError {
    #[snafu(display("failed to parse: {message}"))]
    Parse { message: String },
    #[snafu(display("invalid value: {reason}"))]
    InvalidValue { reason: String },
    #[snafu(display("failed to parse hex integer `{input}`: {source}"))]
    ParseHexInt {
        input: String,
        source: std::num::ParseIntError,
    },
    #[snafu(display("username cannot be empty"))]
    EmptyUsername,
    #[snafu(display("invalid bitcoin address: {source}"))]
    InvalidAddress {
        source: bitcoin::address::ParseError,
    },
    #[snafu(display("address {address} is not valid for {expected} network"))]
    NetworkMismatch { expected: Network, address: String },
    #[snafu(display("address does not belong to any known network"))]
    UnknownNetwork,
}

/// Numeric error codes are a wire contract with the miner; do not renumber.
/// `BadNonceSize`/`UnauthorizedWorker` share code 24 and `Duplicate`/`NotSubscribed`
/// share code 25 because the distilled protocol reuses these numbers across the
/// submit-validation and session-gating error families; the two never fire for the
/// same submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StratumErrorCode {
    Banned = 10,
    JobNotFound = 20,
    BadExtranonce2Size = 21,
    BadNtimeSize = 22,
    NtimeOutOfRange = 23,
    BadNonceSize = 24,
    UnauthorizedWorker = 24,
    Duplicate = 25,
    NotSubscribed = 25,
    LowDiff = 26,
}

impl StratumErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Banned => "you are banned",
            Self::JobNotFound => "job not found",
            Self::BadExtranonce2Size => "incorrect size of extranonce2",
            Self::BadNtimeSize => "incorrect size of ntime",
            Self::NtimeOutOfRange => "ntime out of range",
            Self::BadNonceSize => "incorrect size of nonce",
            Self::UnauthorizedWorker => "unauthorized worker",
            Self::Duplicate => "duplicate share",
            Self::NotSubscribed => "not subscribed",
            Self::LowDiff => "low difficulty share",
        }
    }

    pub fn into_response(self, traceback: Option<Value>) -> JsonRpcError {
        JsonRpcError {
            error_code: self.code(),
            message: self.message().into(),
            traceback,
        }
    }
}

impl fmt::Display for StratumErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub error_code: i32,
    pub message: String,
    pub traceback: Option<Value>,
}

impl Serialize for JsonRpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.error_code, &self.message, &self.traceback).serialize(serializer)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.traceback {
            Some(traceback) => write!(
                f,
                "Stratum error {}: {} (traceback: {})",
                self.error_code,
                self.message,
                serde_json::to_string(traceback).unwrap_or_else(|_| "<invalid traceback>".into())
            ),
            None => write!(f, "Stratum error {}: {}", self.error_code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_contract() {
        assert_eq!(StratumErrorCode::Banned.code(), 10);
        assert_eq!(StratumErrorCode::JobNotFound.code(), 20);
        assert_eq!(StratumErrorCode::BadExtranonce2Size.code(), 21);
        assert_eq!(StratumErrorCode::BadNtimeSize.code(), 22);
        assert_eq!(StratumErrorCode::NtimeOutOfRange.code(), 23);
        assert_eq!(StratumErrorCode::BadNonceSize.code(), 24);
        assert_eq!(StratumErrorCode::UnauthorizedWorker.code(), 24);
        assert_eq!(StratumErrorCode::Duplicate.code(), 25);
        assert_eq!(StratumErrorCode::NotSubscribed.code(), 25);
        assert_eq!(StratumErrorCode::LowDiff.code(), 26);
    }

    #[test]
    fn into_response_carries_traceback() {
        let response = StratumErrorCode::JobNotFound.into_response(None);
        assert_eq!(response.error_code, 20);
        assert_eq!(response.message, "job not found");
        assert!(response.traceback.is_none());
    }

    #[test]
    fn json_rpc_error_serializes_as_triple() {
        let error = StratumErrorCode::LowDiff.into_response(None);
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value, serde_json::json!([26, "low difficulty share", null]));
    }
}
