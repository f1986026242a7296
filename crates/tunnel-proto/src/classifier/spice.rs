//! SPICE remote-display protocol discriminator.
//! Layout reference: <https://www.spice-space.org/spice-protocol.html>

use std::time::{Duration, Instant};

use serde_json::{Value, json};

use super::{Discriminator, Outcome};

const SPICE_MAGIC: &[u8; 4] = b"REDQ";
const MAJOR_VERSION_INDEX: usize = 4;
const MINOR_VERSION_INDEX: usize = 8;
const CHANNEL_TYPE_INDEX: usize = 20;

const INITIAL_OFFSET: usize = 12;
const MESSAGE_SIZE_LEN: usize = 4;
const MESSAGE_TYPE_LEN: usize = 2;
const LINK_STATUS_LEN: usize = 4;
const SESSION_ID_LEN: usize = 4;
const SERVER_NAME_LEN_LEN: usize = 4;

const MESSAGE_TYPE_INIT: u16 = 103;
const MESSAGE_TYPE_SERVER_NAME: u16 = 113;
const MESSAGE_TYPE_SERVER_UUID: u16 = 114;

const SAFETY_TIMEOUT: Duration = Duration::from_secs(10);

fn channel_name(byte: u8) -> &'static str {
    match byte {
        1 => "main",
        2 => "display",
        3 => "inputs",
        4 => "cursor",
        5 => "playback",
        6 => "record",
        7 => "tunnel",
        8 => "smartcard",
        9 => "usbredir",
        10 => "port",
        11 => "webdev",
        _ => "unknown",
    }
}

#[derive(Debug, Default)]
struct SpiceProperties {
    version: Option<String>,
    session_id: Option<String>,
    channel_type: Option<String>,
    server_name: Option<String>,
    server_uuid: Option<String>,
}

#[derive(Debug, Default)]
pub struct SpiceDiscriminator {
    properties: SpiceProperties,
}

impl SpiceDiscriminator {
    /// Parses the server-side link reply, only reached for the "main"
    /// channel. `server` grows across ticks; insufficient length at any
    /// step is reported as `Incomplete` so the next tick retries from
    /// scratch once more bytes have arrived.
    fn analyze_server_header(&mut self, server: &[u8]) -> Outcome {
        let deadline = Instant::now() + SAFETY_TIMEOUT;

        let mut offset = INITIAL_OFFSET + MESSAGE_SIZE_LEN;
        if server.len() < offset {
            return Outcome::Incomplete;
        }
        let first_packet_size =
            u32::from_le_bytes(server[offset - MESSAGE_SIZE_LEN..offset].try_into().unwrap())
                as usize;

        offset += first_packet_size + LINK_STATUS_LEN;
        if server.len() < offset {
            return Outcome::Incomplete;
        }
        let link_status =
            u32::from_le_bytes(server[offset - LINK_STATUS_LEN..offset].try_into().unwrap());
        if link_status != 0 {
            return Outcome::Affirm;
        }

        let mut need_init = true;
        let mut need_name = true;
        let mut need_uuid = true;

        loop {
            if Instant::now() >= deadline {
                return Outcome::Affirm;
            }
            if !(need_init || need_name || need_uuid) {
                return Outcome::Affirm;
            }

            offset += MESSAGE_TYPE_LEN;
            if server.len() < offset {
                return Outcome::Incomplete;
            }
            let message_type = u16::from_le_bytes(
                server[offset - MESSAGE_TYPE_LEN..offset].try_into().unwrap(),
            );

            match message_type {
                MESSAGE_TYPE_INIT => {
                    offset += MESSAGE_SIZE_LEN;
                    if server.len() < offset {
                        return Outcome::Incomplete;
                    }
                    let size = u32::from_le_bytes(
                        server[offset - MESSAGE_SIZE_LEN..offset].try_into().unwrap(),
                    ) as usize;
                    offset += size;
                    if server.len() < offset {
                        return Outcome::Incomplete;
                    }
                    if size < SESSION_ID_LEN {
                        return Outcome::Affirm;
                    }
                    let body_start = offset - size;
                    self.properties.session_id = Some(hex::encode(
                        &server[body_start..body_start + SESSION_ID_LEN],
                    ));
                    need_init = false;
                }
                MESSAGE_TYPE_SERVER_NAME => {
                    offset += MESSAGE_SIZE_LEN;
                    if server.len() < offset {
                        return Outcome::Incomplete;
                    }
                    let size = u32::from_le_bytes(
                        server[offset - MESSAGE_SIZE_LEN..offset].try_into().unwrap(),
                    ) as usize;
                    offset += size;
                    if server.len() < offset {
                        return Outcome::Incomplete;
                    }
                    if size < SERVER_NAME_LEN_LEN {
                        return Outcome::Affirm;
                    }
                    let body_start = offset - size;
                    let name_len = u32::from_le_bytes(
                        server[body_start..body_start + SERVER_NAME_LEN_LEN]
                            .try_into()
                            .unwrap(),
                    ) as usize;
                    let name_start = body_start + SERVER_NAME_LEN_LEN;
                    let name_end = name_start + name_len.saturating_sub(1);
                    if name_len > size - SERVER_NAME_LEN_LEN || name_end > server.len() {
                        return Outcome::Affirm;
                    }
                    // Trailing NUL terminator is not part of the logical name.
                    let name_bytes = &server[name_start..name_end];
                    self.properties.server_name =
                        Some(String::from_utf8_lossy(name_bytes).into_owned());
                    need_name = false;
                }
                MESSAGE_TYPE_SERVER_UUID => {
                    offset += MESSAGE_SIZE_LEN;
                    if server.len() < offset {
                        return Outcome::Incomplete;
                    }
                    let size = u32::from_le_bytes(
                        server[offset - MESSAGE_SIZE_LEN..offset].try_into().unwrap(),
                    ) as usize;
                    offset += size;
                    if server.len() < offset {
                        return Outcome::Incomplete;
                    }
                    let body_start = offset - size;
                    let Ok(uuid) = uuid::Uuid::from_slice(&server[body_start..offset]) else {
                        return Outcome::Affirm;
                    };
                    self.properties.server_uuid = Some(uuid.to_string());
                    need_uuid = false;
                }
                _ => return Outcome::Affirm,
            }
        }
    }
}

impl Discriminator for SpiceDiscriminator {
    fn name(&self) -> &'static str {
        "spice"
    }

    fn analyze_header(&mut self, client: &[u8], server: &[u8]) -> Outcome {
        if client.len() < 21 {
            return Outcome::Uncertainty;
        }
        if &client[0..4] != SPICE_MAGIC {
            return Outcome::Deny;
        }

        if self.properties.channel_type.is_none() {
            self.properties.version = Some(format!(
                "{:x}.{:x}",
                client[MAJOR_VERSION_INDEX], client[MINOR_VERSION_INDEX]
            ));
            self.properties.session_id = Some(hex::encode(&client[16..20]));
        } else if self.properties.channel_type.as_deref() == Some("main") {
            return self.analyze_server_header(server);
        } else {
            return Outcome::Affirm;
        }

        let channel_type = channel_name(client[CHANNEL_TYPE_INDEX]);
        self.properties.channel_type = Some(channel_type.to_owned());

        if channel_type == "main" {
            self.analyze_server_header(server)
        } else {
            Outcome::Affirm
        }
    }

    fn properties(&self) -> Value {
        json!({
            "version": self.properties.version,
            "sessionId": self.properties.session_id,
            "channelType": self.properties.channel_type,
            "serverName": self.properties.server_name,
            "serverUUID": self.properties.server_uuid,
        })
    }
}
