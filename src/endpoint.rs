use super::*;

/// A `scheme://host:port` address, as used for the ZMQ block-notification
/// socket. Kept as a thin string-backed newtype rather than splitting into
/// host/port fields because the only thing callers ever do with it is hand
/// the whole string to a socket connect call.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub(crate) struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl FromStr for Endpoint {
    type Err = InternalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (scheme, rest) = s.split_once("://").ok_or_else(|| InternalError::Parse {
            message: format!("endpoint `{s}` missing `scheme://` prefix"),
        })?;

        let (host, port) = rest.rsplit_once(':').ok_or_else(|| InternalError::Parse {
            message: format!("endpoint `{s}` missing `:port` suffix"),
        })?;

        let port = port.parse::<u16>().map_err(|_| InternalError::Parse {
            message: format!("endpoint `{s}` has invalid port `{port}`"),
        })?;

        if host.is_empty() {
            return Err(InternalError::Parse {
                message: format!("endpoint `{s}` has empty host"),
            });
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_endpoint() {
        let endpoint: Endpoint = "tcp://127.0.0.1:28332".parse().unwrap();
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:28332");
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!("127.0.0.1:28332".parse::<Endpoint>().is_err());
    }

    #[test]
    fn rejects_missing_port() {
        assert!("tcp://127.0.0.1".parse::<Endpoint>().is_err());
    }

    #[test]
    fn rejects_bad_port() {
        assert!("tcp://127.0.0.1:notaport".parse::<Endpoint>().is_err());
    }
}
