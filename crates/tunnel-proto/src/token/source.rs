use std::{net::Ipv4Addr, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt;
use tokio::io::AsyncReadExt;

use super::{
    FileOpenSnafu, HttpDecodeSnafu, HttpRequestSnafu, NotFoundSnafu, TokenContext, TokenError,
    TokenSource,
};

/// Ignores the caller's input entirely and always returns the same token.
pub struct Fixed {
    token: Vec<u8>,
}

impl Fixed {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.as_bytes().to_vec(),
        }
    }
}

#[async_trait]
impl TokenSource for Fixed {
    async fn get_token(&self, _ctx: &TokenContext) -> Result<Vec<u8>, TokenError> {
        Ok(self.token.clone())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Address,
    Port,
}

/// One record per nonblank line: `<key> <token>`. The shape of the first
/// nonblank line's key freezes the lookup mode for the whole file: an IPv4
/// dotted quad selects address mode, a bare decimal port selects port
/// mode. Re-read from disk on every call, matching the simple file-backed
/// source this plugin is modeled on.
pub struct File {
    path: String,
}

impl File {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
        }
    }
}

fn detect_mode(key: &str) -> Option<FileMode> {
    if key.parse::<Ipv4Addr>().is_ok() {
        Some(FileMode::Address)
    } else if key.parse::<u16>().is_ok() {
        Some(FileMode::Port)
    } else {
        None
    }
}

#[async_trait]
impl TokenSource for File {
    async fn get_token(&self, ctx: &TokenContext) -> Result<Vec<u8>, TokenError> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .context(FileOpenSnafu { path: self.path.clone() })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .context(FileOpenSnafu { path: self.path.clone() })?;

        let mut mode = None;
        let lookup_key = |mode: FileMode| match mode {
            FileMode::Address => ctx.client_addr.ip().to_string(),
            FileMode::Port => ctx.local_port.to_string(),
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, token)) = line.split_once(' ') else {
                continue;
            };

            let line_mode = match detect_mode(key) {
                Some(m) => m,
                None => continue,
            };
            let mode = *mode.get_or_insert(line_mode);
            if line_mode != mode {
                continue;
            }

            if key == lookup_key(mode) {
                return Ok(token.as_bytes().to_vec());
            }
        }

        let key = mode.map(lookup_key).unwrap_or_default();
        NotFoundSnafu {
            key,
            path: self.path.clone(),
        }
        .fail()
    }
}

#[derive(Deserialize)]
struct HttpTokenResponse {
    token: String,
}

pub struct Http {
    url: String,
    client: reqwest::Client,
}

impl Http {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client config is static and always valid"),
        }
    }
}

#[async_trait]
impl TokenSource for Http {
    async fn get_token(&self, ctx: &TokenContext) -> Result<Vec<u8>, TokenError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("addr", ctx.client_addr.to_string())])
            .send()
            .await
            .context(HttpRequestSnafu { url: self.url.clone() })?;

        let decoded: HttpTokenResponse = resp.json().await.context(HttpDecodeSnafu)?;
        Ok(decoded.token.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    fn ctx(addr: &str, port: u16) -> TokenContext {
        TokenContext {
            client_addr: addr.parse::<SocketAddr>().unwrap(),
            local_port: port,
        }
    }

    #[tokio::test]
    async fn fixed_ignores_input() {
        let source = Fixed::new("tcp:127.0.0.1:9000");
        let a = source.get_token(&ctx("10.0.0.1:1", 1)).await.unwrap();
        let b = source.get_token(&ctx("10.0.0.2:2", 2)).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn file_address_mode_matches_client_ip() {
        let dir = tempfile_dir();
        let path = dir.join("tokens.txt");
        tokio::fs::write(&path, "127.0.0.1 tcp:127.0.0.1:9000\n10.0.0.2 tcp:127.0.0.1:9001\n")
            .await
            .unwrap();

        let source = File::new(path.to_str().unwrap());
        let token = source
            .get_token(&ctx("127.0.0.1:5555", 0))
            .await
            .unwrap();
        assert_eq!(token, b"tcp:127.0.0.1:9000");
    }

    #[tokio::test]
    async fn file_port_mode_freezes_on_first_line() {
        let dir = tempfile_dir();
        let path = dir.join("tokens.txt");
        // First nonblank line's key is a bare port -> port mode for the whole file.
        tokio::fs::write(&path, "6500 tcp:127.0.0.1:9000\n127.0.0.1 tcp:127.0.0.1:9001\n")
            .await
            .unwrap();

        let source = File::new(path.to_str().unwrap());
        let token = source.get_token(&ctx("10.0.0.1:1", 6500)).await.unwrap();
        assert_eq!(token, b"tcp:127.0.0.1:9000");

        // The address-keyed line is ignored: mode is frozen to port.
        assert!(source.get_token(&ctx("127.0.0.1:1", 1)).await.is_err());
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("tunnel-proto-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
