#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crc::{Crc, CRC_32_MPEG_2};

/// CRC-32/MPEG-2: poly 0x04C11DB7, init 0xFFFFFFFF, no reflection, no final XOR.
///
/// This is the variant the bootloader's hardware CRC peripheral computes.
/// CRC-32/ISO-HDLC (the reflected variant) is not wire-compatible with the
/// device and must never be used for packet framing.
pub const CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Maximum payload of a single `SEND_BIN_IN_PACKETS` frame.
pub const MAX_PAYLOAD: usize = 16;

/// Reply IDs distinguishing success, failure-with-reason and frame-retry-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseType {
    Ack = 0xE0,
    Nack = 0xE1,
    Retransmit = 0xE2,
}

impl ResponseType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xE0 => Some(Self::Ack),
            0xE1 => Some(Self::Nack),
            0xE2 => Some(Self::Retransmit),
            _ => None,
        }
    }
}

/// Wire command IDs, contiguous from `0xB0`. These are authoritative — the
/// device depends on the numeric identity, never renumber them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    Retransmit = 0xB0,
    GetBootloaderVersion = 0xB1,
    GetAppVersion = 0xB2,
    GetChipId = 0xB3,
    Sync = 0xB4,
    VerifyDeviceId = 0xB5,
    SendBinSize = 0xB6,
    SendBinInPackets = 0xB7,
    GetHelp = 0xB8,
    GetCid = 0xB9,
    GetRdpLvl = 0xBA,
    JmpToAddr = 0xBB,
    EraseFlash = 0xBC,
}

impl CommandId {
    pub const ALL: [CommandId; 13] = [
        CommandId::Retransmit,
        CommandId::GetBootloaderVersion,
        CommandId::GetAppVersion,
        CommandId::GetChipId,
        CommandId::Sync,
        CommandId::VerifyDeviceId,
        CommandId::SendBinSize,
        CommandId::SendBinInPackets,
        CommandId::GetHelp,
        CommandId::GetCid,
        CommandId::GetRdpLvl,
        CommandId::JmpToAddr,
        CommandId::EraseFlash,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u8 == value)
    }

    /// Human readable mnemonic, used to resolve the `GET_HELP` command table.
    pub fn mnemonic(self) -> &'static str {
        match self {
            CommandId::Retransmit => "RETRANSMIT",
            CommandId::GetBootloaderVersion => "GET_BOOTLOADER_VERSION",
            CommandId::GetAppVersion => "GET_APP_VERSION",
            CommandId::GetChipId => "GET_CHIP_ID",
            CommandId::Sync => "SYNC",
            CommandId::VerifyDeviceId => "VERIFY_DEVICE_ID",
            CommandId::SendBinSize => "SEND_BIN_SIZE",
            CommandId::SendBinInPackets => "SEND_BIN_IN_PACKETS",
            CommandId::GetHelp => "GET_HELP",
            CommandId::GetCid => "GET_CID",
            CommandId::GetRdpLvl => "GET_RDP_LVL",
            CommandId::JmpToAddr => "JMP_TO_ADDR",
            CommandId::EraseFlash => "ERASE_FLASH",
        }
    }
}

/// Error returned when decoding a frame off the wire fails. Decoding never
/// panics — every failure path is one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes were supplied than the declared header/length require.
    Truncated,
    /// Buffer is shorter than the minimum 6-byte frame.
    Malformed,
    /// Recomputed CRC does not match the trailer.
    CrcMismatch,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            DecodeError::Truncated => "truncated frame",
            DecodeError::Malformed => "malformed frame (shorter than 6 bytes)",
            DecodeError::CrcMismatch => "CRC mismatch",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// One frame on the wire, in either direction.
///
/// Serialized size is always `2 + payload.len() + 4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: u8, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// CRC-32/MPEG-2 over `id ‖ length ‖ payload`.
    pub fn crc32(&self) -> u32 {
        let mut digest = CRC32_MPEG2.digest();
        digest.update(&[self.id, self.payload.len() as u8]);
        digest.update(&self.payload);
        digest.finalize()
    }

    /// Serialize to `id, len, payload…, crc32 (LE)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.payload.len() + 4);
        bytes.push(self.id);
        bytes.push(self.payload.len() as u8);
        bytes.extend_from_slice(&self.payload);
        bytes.extend_from_slice(&self.crc32().to_le_bytes());
        bytes
    }

    /// Decode a complete frame. `bytes` must contain exactly one frame
    /// (header + payload + trailer) — the transport is responsible for
    /// reading exactly the declared number of bytes before calling this.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 6 {
            return Err(DecodeError::Malformed);
        }

        let id = bytes[0];
        let length = bytes[1] as usize;
        let expected_len = 2 + length + 4;
        if bytes.len() < expected_len {
            return Err(DecodeError::Truncated);
        }

        let payload = bytes[2..2 + length].to_vec();
        let crc_bytes = &bytes[2 + length..2 + length + 4];
        let received_crc =
            u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let packet = Packet { id, payload };
        if packet.crc32() != received_crc {
            return Err(DecodeError::CrcMismatch);
        }

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_of_empty_is_all_ones() {
        let digest = CRC32_MPEG2.digest();
        assert_eq!(digest.finalize(), 0xFFFF_FFFF);
    }

    #[test]
    fn crc_of_single_zero_byte() {
        let mut digest = CRC32_MPEG2.digest();
        digest.update(&[0x00]);
        assert_eq!(digest.finalize(), 0x4F53_44CD);
    }

    #[test]
    fn round_trip_encode_decode() {
        let payload = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let packet = Packet::new(CommandId::GetChipId as u8, payload.clone());
        let bytes = packet.to_bytes();

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.id, CommandId::GetChipId as u8);
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.crc32(), packet.crc32());
    }

    #[test]
    fn bit_flip_in_payload_causes_crc_mismatch() {
        let packet = Packet::new(CommandId::GetChipId as u8, vec![0x01, 0x02]);
        let mut bytes = packet.to_bytes();
        bytes[2] ^= 0x01; // flip one bit in the payload

        assert_eq!(Packet::decode(&bytes), Err(DecodeError::CrcMismatch));
    }

    #[test]
    fn bit_flip_in_trailer_causes_crc_mismatch() {
        let packet = Packet::new(CommandId::Sync as u8, Vec::new());
        let mut bytes = packet.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;

        assert_eq!(Packet::decode(&bytes), Err(DecodeError::CrcMismatch));
    }

    #[test]
    fn short_buffer_is_malformed() {
        assert_eq!(
            Packet::decode(&[0xE0, 0x00, 0x00]),
            Err(DecodeError::Malformed)
        );
    }

    #[test]
    fn declared_length_longer_than_buffer_is_truncated() {
        // id, length=3, but only one payload byte present, no CRC
        assert_eq!(
            Packet::decode(&[0xE0, 0x03, 0x01]),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn get_bootloader_version_ack_scenario() {
        // RX: E0 03 01 02 03 <crc4>
        let packet = Packet::new(ResponseType::Ack as u8, vec![0x01, 0x02, 0x03]);
        let bytes = packet.to_bytes();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn send_bin_size_total_packets_is_ceil_division() {
        let size: usize = 40;
        let total_packets = size.div_ceil(MAX_PAYLOAD);
        assert_eq!(total_packets, 3);
    }

    #[test]
    fn command_ids_are_contiguous_from_0xb0() {
        for (i, cmd) in CommandId::ALL.iter().enumerate() {
            assert_eq!(*cmd as u8, 0xB0 + i as u8);
        }
    }
}
