//! Establishing a framed, authenticated channel.
//!
//! A [`Connector`] produces the byte stream a [`Session`](crate::Session)
//! runs on. [`TcpConnector`] opens a TCP socket and runs the protocol-v10
//! handshake over it:
//!
//! 1. Receive the server greeting (version, connection id, scramble)
//! 2. Send the handshake response with credentials
//! 3. Follow auth switches and `caching_sha2_password` exchanges until OK

#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use mywire_core::error::{ConnectionError, ConnectionErrorKind, ServerError};
use mywire_core::{Error, Result};

use crate::auth::{self, AuthPlugin, caching_sha2};
use crate::config::MySqlConfig;
use crate::protocol::{PacketChannel, PacketReader, PacketWriter, capabilities};

/// What the server told us about itself during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Capabilities both sides agreed on
    pub capabilities: u32,
    /// Server default collation id
    pub charset: u8,
    pub status_flags: u16,
}

impl ServerInfo {
    /// Do rows and field lists end without a classic EOF packet?
    pub const fn deprecate_eof(&self) -> bool {
        self.capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0
    }
}

/// An authenticated channel, ready for commands.
#[derive(Debug)]
pub struct Established<S> {
    pub channel: PacketChannel<S>,
    pub server: ServerInfo,
}

/// Source of authenticated channels for a session.
///
/// Called once by `Session::connect` and again on every reconnect.
pub trait Connector {
    type Stream: Read + Write;

    #[allow(clippy::result_large_err)]
    fn connect(&mut self, config: &MySqlConfig) -> Result<Established<Self::Stream>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self, config: &MySqlConfig) -> Result<Established<TcpStream>> {
        let stream = open_tcp(config)?;
        // Timeouts cover the handshake only.
        stream.set_read_timeout(Some(config.connect_timeout)).ok();
        stream.set_write_timeout(Some(config.connect_timeout)).ok();

        let mut channel = PacketChannel::new(stream);
        channel.set_max_message_size(config.max_packet_size);
        let server = handshake(&mut channel, config)?;

        channel.get_ref().set_read_timeout(None).ok();
        channel.get_ref().set_write_timeout(None).ok();
        Ok(Established { channel, server })
    }
}

#[allow(clippy::result_large_err)]
fn open_tcp(config: &MySqlConfig) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = config
        .socket_addr()
        .to_socket_addrs()
        .map_err(|e| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Invalid socket address {}: {}", config.socket_addr(), e),
                source: Some(Box::new(e)),
            })
        })?
        .collect();

    let mut last_err = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, config.connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                tracing::debug!(%addr, "tcp connected");
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(match last_err {
        Some(e) => {
            let kind = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                ConnectionErrorKind::Refused
            } else {
                ConnectionErrorKind::Connect
            };
            Error::Connection(ConnectionError {
                kind,
                message: format!("Failed to connect to {}: {}", config.socket_addr(), e),
                source: Some(Box::new(e)),
            })
        }
        None => Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: format!("{} resolved to no addresses", config.socket_addr()),
            source: None,
        }),
    })
}

/// The initial handshake packet (protocol v10).
#[derive(Debug, Clone)]
struct Greeting {
    protocol_version: u8,
    server_version: String,
    connection_id: u32,
    capabilities: u32,
    charset: u8,
    status_flags: u16,
    auth_plugin: String,
    auth_data: Vec<u8>,
}

#[allow(clippy::result_large_err)]
fn parse_greeting(payload: &[u8]) -> Result<Greeting> {
    if payload.first() == Some(&0xFF) {
        let err = PacketReader::new(payload)
            .parse_err_packet()
            .ok_or_else(|| Error::protocol("Invalid error packet in greeting"))?;
        return Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: format!("Server refused connection: {}", ServerError::from(err)),
            source: None,
        }));
    }

    let mut reader = PacketReader::new(payload);
    let missing = |what: &str| Error::protocol(format!("Greeting is missing {}", what));

    let protocol_version = reader
        .read_u8()
        .ok_or_else(|| missing("protocol version"))?;
    if protocol_version != 10 {
        return Err(Error::protocol(format!(
            "Unsupported protocol version: {}",
            protocol_version
        )));
    }

    let server_version = reader
        .read_null_string()
        .ok_or_else(|| missing("server version"))?;
    let connection_id = reader
        .read_u32_le()
        .ok_or_else(|| missing("connection id"))?;
    let mut auth_data = reader
        .read_bytes(8)
        .ok_or_else(|| missing("auth data"))?
        .to_vec();
    reader.skip(1);

    let caps_lower = reader
        .read_u16_le()
        .ok_or_else(|| missing("capability flags"))?;
    let charset = reader.read_u8().unwrap_or(crate::protocol::charset::DEFAULT_CHARSET);
    let status_flags = reader.read_u16_le().unwrap_or(0);
    let caps_upper = reader.read_u16_le().unwrap_or(0);
    let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

    let auth_data_len = usize::from(reader.read_u8().unwrap_or(0));
    reader.skip(10);

    if capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
        let len2 = auth_data_len.saturating_sub(8).max(13);
        if let Some(part2) = reader.read_bytes(len2.min(reader.remaining())) {
            let part2 = part2.strip_suffix(&[0]).unwrap_or(part2);
            auth_data.extend_from_slice(part2);
        }
    }

    let auth_plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
        reader.read_null_string().unwrap_or_default()
    } else {
        String::new()
    };

    Ok(Greeting {
        protocol_version,
        server_version,
        connection_id,
        capabilities,
        charset,
        status_flags,
        auth_plugin,
        auth_data,
    })
}

fn handshake_response(
    config: &MySqlConfig,
    client_caps: u32,
    plugin: &AuthPlugin,
    auth: &[u8],
) -> Vec<u8> {
    let mut writer = PacketWriter::new();
    writer.write_u32_le(client_caps);
    writer.write_u32_le(u32::try_from(config.max_packet_size).unwrap_or(u32::MAX));
    writer.write_u8(config.charset);
    writer.write_zeros(23);
    writer.write_null_string(&config.user);

    if client_caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        writer.write_lenenc_bytes(auth);
    } else {
        // Scrambles are at most 32 bytes here.
        writer.write_u8(auth.len() as u8);
        writer.write_bytes(auth);
    }

    if client_caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
        writer.write_null_string(config.database.as_deref().unwrap_or_default());
    }
    if client_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
        writer.write_null_string(plugin.name());
    }
    writer.into_bytes()
}

/// Run the connection handshake on a fresh channel.
///
/// Leaves the channel ready for the first command.
#[allow(clippy::result_large_err)]
pub fn handshake<S: Read + Write>(
    channel: &mut PacketChannel<S>,
    config: &MySqlConfig,
) -> Result<ServerInfo> {
    channel.reset_sequence();
    let greeting = parse_greeting(&channel.read_packet()?)?;
    tracing::debug!(
        server_version = %greeting.server_version,
        connection_id = greeting.connection_id,
        plugin = %greeting.auth_plugin,
        "server greeting"
    );

    let required = capabilities::CLIENT_PROTOCOL_41 | capabilities::CLIENT_SECURE_CONNECTION;
    if greeting.capabilities & required != required {
        return Err(Error::protocol("Server does not support protocol 4.1"));
    }

    let client_caps = config.capability_flags() & greeting.capabilities;
    let password = config.password.as_deref().unwrap_or_default();
    let plugin = AuthPlugin::from_name(&greeting.auth_plugin);
    let response = plugin.initial_response(password, &greeting.auth_data)?;
    channel.write_packet(&handshake_response(config, client_caps, &plugin, &response))?;

    let status_flags = authenticate(channel, password, plugin, greeting.auth_data)?;

    Ok(ServerInfo {
        protocol_version: greeting.protocol_version,
        server_version: greeting.server_version,
        connection_id: greeting.connection_id,
        capabilities: client_caps,
        charset: greeting.charset,
        status_flags,
    })
}

/// Drive the auth exchange to its final OK; returns the status flags.
#[allow(clippy::result_large_err)]
fn authenticate<S: Read + Write>(
    channel: &mut PacketChannel<S>,
    password: &str,
    mut plugin: AuthPlugin,
    mut seed: Vec<u8>,
) -> Result<u16> {
    loop {
        let packet = channel.read_packet()?;
        let mut reader = PacketReader::new(&packet);
        match packet.first() {
            Some(0x00) => {
                let ok = reader
                    .parse_ok_packet()
                    .ok_or_else(|| Error::protocol("Invalid OK packet after auth"))?;
                return Ok(ok.status_flags);
            }
            Some(0xFF) => {
                let err = reader
                    .parse_err_packet()
                    .ok_or_else(|| Error::protocol("Invalid error packet after auth"))?;
                return Err(auth::auth_error(format!(
                    "Authentication failed: {}",
                    ServerError::from(err)
                )));
            }
            Some(0xFE) => {
                reader.skip(1);
                let name = reader
                    .read_null_string()
                    .ok_or_else(|| Error::protocol("Missing plugin name in auth switch"))?;
                plugin = AuthPlugin::from_name(&name);
                seed = reader.read_rest().to_vec();
                tracing::debug!(plugin = %name, "auth switch");
                channel.write_packet(&plugin.initial_response(password, &seed)?)?;
            }
            Some(0x01) => match &packet[1..] {
                [caching_sha2::FAST_AUTH_SUCCESS] => {}
                [caching_sha2::PERFORM_FULL_AUTH] => {
                    tracing::debug!("full auth requested, fetching server key");
                    channel.write_packet(&[caching_sha2::REQUEST_PUBLIC_KEY])?;
                }
                public_key => {
                    if !matches!(
                        plugin,
                        AuthPlugin::CachingSha2Password | AuthPlugin::Sha256Password
                    ) {
                        return Err(Error::protocol(format!(
                            "Unexpected auth data for {}",
                            plugin.name()
                        )));
                    }
                    let encrypted = auth::encrypt_password(password, &seed, public_key)?;
                    channel.write_packet(&encrypted)?;
                }
            },
            other => {
                return Err(Error::protocol(format!(
                    "Unknown auth response: {:02X?}",
                    other
                )));
            }
        }
    }
}
