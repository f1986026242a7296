use base64::Engine as _;
use snafu::ResultExt;
use tunnel_core::addr::TargetAddr;

use super::{BackendAddrSnafu, Base64Snafu, TokenError, TokenParser};

/// `enc ∈ {"", "base64"}`; any other value is treated as `""` (pass-through),
/// matching the Go source's own permissive switch over the encoding string.
pub struct Cleartext {
    base64: bool,
}

impl Cleartext {
    pub fn new(enc: &str) -> Self {
        Self {
            base64: enc.eq_ignore_ascii_case("base64"),
        }
    }
}

impl TokenParser for Cleartext {
    fn parse(&self, token: &str) -> Result<TargetAddr, TokenError> {
        let addr_str = if self.base64 {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(token)
                .context(Base64Snafu)?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            token.to_owned()
        };

        addr_str.parse().context(BackendAddrSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_parses_plain_address() {
        let parser = Cleartext::new("");
        let addr = parser.parse("tcp:127.0.0.1:9000").unwrap();
        assert_eq!(addr, "tcp:127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn base64_decodes_before_parsing() {
        let parser = Cleartext::new("base64");
        let encoded = base64::engine::general_purpose::STANDARD.encode("tcp:127.0.0.1:9000");
        let addr = parser.parse(&encoded).unwrap();
        assert_eq!(addr, "tcp:127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn malformed_address_is_an_error() {
        let parser = Cleartext::new("");
        assert!(parser.parse("!!!not-an-address!!!").is_err());
    }
}
