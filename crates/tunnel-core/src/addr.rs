use std::{fmt, path::PathBuf, str::FromStr};

use crate::error::{InvalidAddrSpecSnafu, InvalidPortSnafu, UnknownProtoSnafu};

/// A backend or local-listen address of the shape `<proto>:<host>:<port>`,
/// where `proto` is `tcp` or `unix`. For `unix`, everything after the first
/// colon is a filesystem path (which may itself contain colons), not a
/// second `host:port` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl FromStr for TargetAddr {
    type Err = crate::error::Error;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (proto, rest) = spec
            .split_once(':')
            .ok_or_else(|| InvalidAddrSpecSnafu { spec }.build())?;

        match proto {
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| InvalidAddrSpecSnafu { spec }.build())?;
                let port: u16 = port.parse().map_err(|source| {
                    InvalidPortSnafu { port }.into_error(source)
                })?;
                Ok(TargetAddr::Tcp {
                    host: host.to_owned(),
                    port,
                })
            }
            "unix" => Ok(TargetAddr::Unix {
                path: PathBuf::from(rest),
            }),
            other => Err(UnknownProtoSnafu { proto: other }.build()),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
            TargetAddr::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp() {
        let addr: TargetAddr = "tcp:127.0.0.1:9000".parse().unwrap();
        assert_eq!(
            addr,
            TargetAddr::Tcp {
                host: "127.0.0.1".into(),
                port: 9000
            }
        );
    }

    #[test]
    fn parses_unix_path_with_colons() {
        let addr: TargetAddr = "unix:/var/run/app:1.sock".parse().unwrap();
        assert_eq!(
            addr,
            TargetAddr::Unix {
                path: "/var/run/app:1.sock".into()
            }
        );
    }

    #[test]
    fn rejects_unknown_proto() {
        assert!("sctp:127.0.0.1:1".parse::<TargetAddr>().is_err());
    }

    #[test]
    fn round_trips_through_display() {
        let addr: TargetAddr = "tcp:example.com:443".parse().unwrap();
        assert_eq!(addr.to_string(), "tcp:example.com:443");
    }
}
