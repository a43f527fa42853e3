use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR: Header = 0;
const CONTROL: Header = 1;
const REDUCE: Header = 2;
const BROADCAST: Header = 3;
const GATHER: Header = 4;

/// The payload data for the `Data` variant of the `Msg` enum.
///
/// The variant names the collective the data belongs to, so a rank entering a different
/// collective than its peers is detected instead of misinterpreting the bytes.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A contribution to, or the result of, an all-reduce.
    Reduce(&'a [f32]),
    /// Values broadcast from the root rank.
    Broadcast(&'a [f32]),
    /// A contribution to, or the result of, an all-gather.
    Gather(&'a [u32]),
}

impl Payload<'_> {
    /// Returns a short name for this kind of payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Reduce(_) => "data/reduce",
            Payload::Broadcast(_) => "data/broadcast",
            Payload::Gather(_) => "data/gather",
        }
    }
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Sent by a non-root rank when it joins the group.
    Join { rank: usize, device: usize },
    /// The root's answer to `Join` once every rank is connected.
    Welcome { world_size: usize },
    Barrier,
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// Returns a short name for this kind of message, used for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Join { .. }) => "control/join",
            Msg::Control(Command::Welcome { .. }) => "control/welcome",
            Msg::Control(Command::Barrier) => "control/barrier",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(payload) => payload.kind(),
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid message kind {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>> {
        match self {
            Msg::Err(detail) => {
                buf.extend_from_slice(&ERR.to_be_bytes());
                Ok(Some(detail.as_bytes()))
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL.to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
                Ok(None)
            }
            Msg::Data(payload) => {
                let (kind, bytes): (Header, &[u8]) = match payload {
                    Payload::Reduce(nums) => (REDUCE, bytemuck::cast_slice(nums)),
                    Payload::Broadcast(nums) => (BROADCAST, bytemuck::cast_slice(nums)),
                    Payload::Gather(words) => (GATHER, bytemuck::cast_slice(words)),
                };

                buf.extend_from_slice(&kind.to_be_bytes());
                Ok(Some(bytes))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut header = [0; HEADER_SIZE];
        header.copy_from_slice(kind_buf);
        let kind = Header::from_be_bytes(header);

        match kind {
            ERR => {
                let detail = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(detail)))
            }
            CONTROL => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            REDUCE => Ok(Self::Data(Payload::Reduce(cast(rest)?))),
            BROADCAST => Ok(Self::Data(Payload::Broadcast(cast(rest)?))),
            GATHER => Ok(Self::Data(Payload::Gather(cast(rest)?))),
            other => Self::invalid_kind(other),
        }
    }
}

/// Views the raw payload bytes as a slice of numbers.
///
/// Fails if the length is not a multiple of the element size or the buffer is misaligned.
fn cast<T: bytemuck::Pod>(bytes: &[u8]) -> io::Result<&[T]> {
    bytemuck::try_cast_slice(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: &Msg<'_>) -> Vec<u32> {
        let mut buf = Vec::new();
        let tail = msg.serialize(&mut buf).unwrap();
        if let Some(tail) = tail {
            buf.extend_from_slice(tail);
        }

        // Copy into a 4 byte aligned buffer like the receiver does.
        let mut words = vec![0u32; buf.len().div_ceil(4)];
        bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..buf.len()].copy_from_slice(&buf);
        words
    }

    #[test]
    fn reduce_payload_keeps_its_values() {
        let grad = [1.5, -2.0, 0.25];
        let mut words = encode(&Msg::Data(Payload::Reduce(&grad)));
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);

        match Msg::deserialize(bytes).unwrap() {
            Msg::Data(Payload::Reduce(got)) => assert_eq!(got, grad),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn control_message_is_json_after_the_header() {
        let msg = Msg::Control(Command::Join { rank: 3, device: 1 });
        let mut buf = Vec::new();
        assert!(msg.serialize(&mut buf).unwrap().is_none());

        let json: serde_json::Value = serde_json::from_slice(&buf[HEADER_SIZE..]).unwrap();
        assert_eq!(json["join"]["rank"], 3);
        assert_eq!(json["join"]["device"], 1);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut buf = 42u32.to_be_bytes().to_vec();
        assert!(Msg::deserialize(&mut buf).is_err());
    }

    #[test]
    fn truncated_numbers_are_rejected() {
        let mut words = vec![0u32; 2];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);
        bytes[..HEADER_SIZE].copy_from_slice(&REDUCE.to_be_bytes());

        // 3 payload bytes cannot be a slice of f32.
        assert!(Msg::deserialize(&mut bytes[..HEADER_SIZE + 3]).is_err());
    }
}
