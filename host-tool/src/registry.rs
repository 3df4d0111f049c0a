use bootctl_protocol::{CommandId, Packet as ProtoPacket};

use crate::error::Error;

/// The target of an `ERASE_FLASH` command: either a mass erase or a list of
/// sector indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseTarget {
    Mass,
    Sectors(Vec<u8>),
}

/// One command in the registry, carrying whatever operand it needs.
///
/// `gather_input()` from the distilled design — acquiring an operator-
/// supplied operand before `build_packet` runs — is a no-op here: this is
/// an unattended CLI, so every operand (`device_id`, `address`, sector
/// list, image bytes) already arrived via command-line flags before a
/// `Command` value is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Retransmit,
    GetBootloaderVersion,
    GetAppVersion,
    GetChipId,
    Sync,
    VerifyDeviceId { device_id: u16 },
    SendBinSize { image_len: u32 },
    /// One `MAX_PAYLOAD`-sized (or smaller, for the final chunk) slice of
    /// the image. The engine drives the streaming loop itself rather than
    /// walking a successor chain — see `engine::Engine::stream_firmware`.
    SendBinInPackets { chunk: Vec<u8> },
    GetHelp,
    GetCid,
    GetRdpLvl,
    JmpToAddr { address: u32 },
    EraseFlash { target: EraseTarget },
}

/// Operands shared across the fixed update chain
/// (`SYNC → VERIFY_DEVICE_ID → SEND_BIN_SIZE`), so that `Command::successors`
/// can build the next node without the caller threading them through by
/// hand.
#[derive(Debug, Clone)]
pub struct UpdateSession {
    pub device_id: u16,
    pub image_len: u32,
}

/// Parsed fields from a validated ACK payload. Replaces the original
/// stringly-typed `dict` result with one variant per response shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseFields {
    #[default]
    None,
    Version {
        major: u8,
        minor: u8,
        patch: u8,
    },
    ChipId(u16),
    RdpLevel(u8),
    SupportedCommands(Vec<u8>),
    SizeNegotiation {
        start_address: u32,
        total_packets: u32,
    },
    PacketAck {
        start_address: u32,
        current_packet: u32,
    },
    Raw(Vec<u8>),
}

impl std::fmt::Display for ResponseFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseFields::None => write!(f, "ok"),
            ResponseFields::Version { major, minor, patch } => {
                write!(f, "{major}.{minor}.{patch}")
            }
            ResponseFields::ChipId(id) => write!(f, "0x{id:04X}"),
            ResponseFields::RdpLevel(level) => write!(f, "RDP level {level}"),
            ResponseFields::SupportedCommands(ids) => {
                write!(f, "{} supported command(s)", ids.len())
            }
            ResponseFields::SizeNegotiation { start_address, total_packets } => {
                write!(f, "start=0x{start_address:08X} total_packets={total_packets}")
            }
            ResponseFields::PacketAck { start_address, current_packet } => {
                write!(f, "start=0x{start_address:08X} packet={current_packet}")
            }
            ResponseFields::Raw(bytes) => write!(f, "{}", hex::encode(bytes)),
        }
    }
}

/// Outcome of a single command exchange, produced by `handle_response` or a
/// NACK/timeout along the way.
#[derive(Debug, Clone)]
pub struct CommandExecutionResponse {
    pub success: bool,
    pub fields: ResponseFields,
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl Command {
    pub fn id(&self) -> CommandId {
        match self {
            Command::Retransmit => CommandId::Retransmit,
            Command::GetBootloaderVersion => CommandId::GetBootloaderVersion,
            Command::GetAppVersion => CommandId::GetAppVersion,
            Command::GetChipId => CommandId::GetChipId,
            Command::Sync => CommandId::Sync,
            Command::VerifyDeviceId { .. } => CommandId::VerifyDeviceId,
            Command::SendBinSize { .. } => CommandId::SendBinSize,
            Command::SendBinInPackets { .. } => CommandId::SendBinInPackets,
            Command::GetHelp => CommandId::GetHelp,
            Command::GetCid => CommandId::GetCid,
            Command::GetRdpLvl => CommandId::GetRdpLvl,
            Command::JmpToAddr { .. } => CommandId::JmpToAddr,
            Command::EraseFlash { .. } => CommandId::EraseFlash,
        }
    }

    /// Builds the outbound packet for this command.
    pub fn build_packet(&self) -> ProtoPacket {
        let id = self.id() as u8;
        let payload = match self {
            Command::Retransmit
            | Command::GetBootloaderVersion
            | Command::GetAppVersion
            | Command::GetChipId
            | Command::Sync
            | Command::GetHelp
            | Command::GetCid
            | Command::GetRdpLvl => Vec::new(),
            Command::VerifyDeviceId { device_id } => device_id.to_le_bytes().to_vec(),
            Command::SendBinSize { image_len } => image_len.to_le_bytes().to_vec(),
            Command::SendBinInPackets { chunk } => chunk.clone(),
            Command::JmpToAddr { address } => address.to_le_bytes().to_vec(),
            Command::EraseFlash { target } => match target {
                EraseTarget::Mass => vec![0xFF, 0xFF],
                EraseTarget::Sectors(sectors) => {
                    let mut payload = Vec::with_capacity(1 + sectors.len());
                    payload.push(sectors.len() as u8);
                    payload.extend_from_slice(sectors);
                    payload
                }
            },
        };

        ProtoPacket::new(id, payload)
    }

    /// The directed chain of commands that continue after a successful
    /// response. `SEND_BIN_IN_PACKETS` has no successor here — it iterates
    /// its own streaming loop (see `engine::Engine::stream_firmware`).
    pub fn successors(&self, session: &UpdateSession) -> Vec<Command> {
        match self {
            Command::Sync => vec![Command::VerifyDeviceId {
                device_id: session.device_id,
            }],
            Command::VerifyDeviceId { .. } => vec![Command::SendBinSize {
                image_len: session.image_len,
            }],
            _ => Vec::new(),
        }
    }

    /// Parses an ACK payload into the fields this command promises.
    /// Only called once the engine has already confirmed `id == ACK`.
    pub fn handle_ack_payload(&self, payload: &[u8]) -> Result<ResponseFields, Error> {
        match self {
            Command::Retransmit
            | Command::Sync
            | Command::VerifyDeviceId { .. }
            | Command::EraseFlash { .. }
            | Command::JmpToAddr { .. } => Ok(ResponseFields::None),

            Command::GetBootloaderVersion | Command::GetAppVersion => {
                if payload.len() != 3 {
                    return Err(Error::MalformedAckPayload {
                        expected: 3,
                        got: payload.len(),
                    });
                }
                Ok(ResponseFields::Version {
                    major: payload[0],
                    minor: payload[1],
                    patch: payload[2],
                })
            }

            Command::GetChipId => {
                if payload.len() != 2 {
                    return Err(Error::MalformedAckPayload {
                        expected: 2,
                        got: payload.len(),
                    });
                }
                Ok(ResponseFields::ChipId(u16::from_le_bytes([payload[0], payload[1]])))
            }

            Command::GetRdpLvl => {
                if payload.len() != 1 {
                    return Err(Error::MalformedAckPayload {
                        expected: 1,
                        got: payload.len(),
                    });
                }
                Ok(ResponseFields::RdpLevel(payload[0]))
            }

            Command::GetHelp => {
                let declared = *payload.first().ok_or(Error::MalformedAckPayload {
                    expected: 1,
                    got: 0,
                })? as usize;
                if payload.len() != 1 + declared {
                    return Err(Error::MalformedAckPayload {
                        expected: 1 + declared,
                        got: payload.len(),
                    });
                }
                Ok(ResponseFields::SupportedCommands(payload[1..].to_vec()))
            }

            Command::SendBinSize { .. } => {
                if payload.len() != 8 {
                    return Err(Error::MalformedAckPayload {
                        expected: 8,
                        got: payload.len(),
                    });
                }
                Ok(ResponseFields::SizeNegotiation {
                    start_address: le_u32(&payload[0..4]),
                    total_packets: le_u32(&payload[4..8]),
                })
            }

            Command::SendBinInPackets { .. } => {
                if payload.len() != 8 {
                    return Err(Error::MalformedAckPayload {
                        expected: 8,
                        got: payload.len(),
                    });
                }
                Ok(ResponseFields::PacketAck {
                    start_address: le_u32(&payload[0..4]),
                    current_packet: le_u32(&payload[4..8]),
                })
            }

            Command::GetCid => Ok(ResponseFields::Raw(payload.to_vec())),
        }
    }
}
