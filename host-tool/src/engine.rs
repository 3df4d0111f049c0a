use bootctl_protocol::{CommandId, Packet as ProtoPacket, ResponseType, MAX_PAYLOAD};

use crate::error::{Error, NackCode};
use crate::registry::{Command, CommandExecutionResponse, UpdateSession};
use crate::transport::Transport;

/// Per-session state for the update handshake. `Done` and `Idle` are the
/// only terminal states — `Idle` on any failure, `Done` once every frame of
/// `SEND_BIN_IN_PACKETS` has been acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Synced,
    Verified,
    Sized,
    Streaming,
    Done,
}

/// Drives commands over a `Transport`: one exchange at a time, no
/// pipelining, no automatic retry at this layer. Generic over the
/// transport so the exchange logic can be driven by an in-memory mock in
/// tests as well as a real `SerialTransport`.
pub struct Engine<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> Engine<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Runs exactly one command: serialize → reset buffers → send → receive
    /// → validate → dispatch. Does not walk successors — see `run_chain`.
    pub fn execute(&mut self, command: &Command) -> Result<CommandExecutionResponse, Error> {
        let packet = command.build_packet();
        let frame = packet.to_bytes();

        tracing::debug!(id = format!("{:#04X}", packet.id), len = packet.len(), "TX frame");

        self.transport.reset_input()?;
        self.transport.reset_output()?;
        self.transport.write_all(&frame)?;

        let raw = self.transport.read_frame()?;
        let decoded = ProtoPacket::decode(&raw)?;

        tracing::debug!(
            id = format!("{:#04X}", decoded.id),
            len = decoded.len(),
            "RX frame"
        );

        match ResponseType::from_u8(decoded.id) {
            Some(ResponseType::Ack) => {
                let fields = command.handle_ack_payload(&decoded.payload)?;
                Ok(CommandExecutionResponse {
                    success: true,
                    fields,
                })
            }
            Some(ResponseType::Nack) => {
                let code = decoded
                    .payload
                    .first()
                    .copied()
                    .map(NackCode::from_u8)
                    .unwrap_or(NackCode::Unknown(0xFF));
                tracing::warn!(%code, "device NACKed command 0x{:02X}", packet.id);
                Err(Error::DeviceNack(code))
            }
            Some(ResponseType::Retransmit) => {
                tracing::warn!("device requested retransmit for 0x{:02X}", packet.id);
                Err(Error::RetransmitRequested)
            }
            None => Err(Error::UnexpectedId(decoded.id)),
        }
    }

    /// Runs `command`, then walks its successor chain as long as each node
    /// succeeds. Returns the response of the last node executed; any
    /// failure along the way aborts the chain at that node.
    pub fn run_chain(
        &mut self,
        command: Command,
        session: &UpdateSession,
    ) -> Result<CommandExecutionResponse, Error> {
        let response = self.execute(&command)?;
        match command.successors(session).into_iter().next() {
            Some(next) => self.run_chain(next, session),
            None => Ok(response),
        }
    }

    /// The `SEND_BIN_IN_PACKETS` streaming loop: `⌈size/16⌉` chunks, one
    /// exchange per chunk. Stops at the first failure — the device
    /// verifies monotonicity of `current_packet`, the host only reports it.
    pub fn stream_firmware(
        &mut self,
        image: &[u8],
        mut on_progress: impl FnMut(u32, u32),
    ) -> Result<(), Error> {
        let total_packets = image.len().div_ceil(MAX_PAYLOAD) as u32;

        for (i, chunk) in image.chunks(MAX_PAYLOAD).enumerate() {
            let command = Command::SendBinInPackets {
                chunk: chunk.to_vec(),
            };
            self.execute(&command)?;
            on_progress((i + 1) as u32, total_packets);
        }

        Ok(())
    }

    /// Drives the full update handshake: `SYNC → VERIFY_DEVICE_ID →
    /// SEND_BIN_SIZE → SEND_BIN_IN_PACKETS(*)`. Returns the terminal state
    /// (`Done` on success); any failure leaves the session in `Idle` and
    /// propagates the error — the operator decides whether to retry.
    pub fn run_update(
        &mut self,
        device_id: u16,
        image: &[u8],
        mut on_progress: impl FnMut(u32, u32),
    ) -> Result<SessionState, Error> {
        let session = UpdateSession {
            device_id,
            image_len: image.len() as u32,
        };

        let mut state = SessionState::Idle;
        let result = (|| -> Result<SessionState, Error> {
            self.execute(&Command::Sync)?;
            state = SessionState::Synced;

            self.execute(&Command::VerifyDeviceId { device_id })?;
            state = SessionState::Verified;

            self.execute(&Command::SendBinSize {
                image_len: session.image_len,
            })?;
            state = SessionState::Sized;

            state = SessionState::Streaming;
            self.stream_firmware(image, &mut on_progress)?;

            state = SessionState::Done;
            Ok(state)
        })();

        match &result {
            Ok(done) => tracing::info!(state = ?done, "update finished"),
            Err(err) => tracing::warn!(state = ?state, %err, "update aborted, returning to Idle"),
        }
        result
    }

    /// Resolves a raw wire command byte back to its mnemonic, for printing
    /// the `GET_HELP` response.
    pub fn command_name(id: u8) -> &'static str {
        CommandId::from_u8(id).map(CommandId::mnemonic).unwrap_or("UNKNOWN")
    }
}
