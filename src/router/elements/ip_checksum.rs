//! IPv4 header checksum.

use crate::router::element::{Element, ElementContext, HandlerSpec};
use crate::router::error::PacketError;
use crate::router::packet::Packet;

/// Minimum IPv4 header length in bytes.
pub const IP_MIN_HEADER_LEN: usize = 20;

/// Offset of the checksum field in the IPv4 header.
const IP_CHECKSUM_OFFSET: usize = 10;

/// RFC 1071 internet checksum of `bytes`.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Length of the IPv4 header at the start of `data`.
pub fn ip_header_len(data: &[u8]) -> Result<usize, PacketError> {
    if data.len() < IP_MIN_HEADER_LEN {
        return Err(PacketError::TooShort {
            needed: IP_MIN_HEADER_LEN,
            len: data.len(),
        });
    }
    if data[0] >> 4 != 4 {
        return Err(PacketError::Malformed(format!("IP version {}", data[0] >> 4)));
    }
    let hlen = usize::from(data[0] & 0x0f) * 4;
    if hlen < IP_MIN_HEADER_LEN {
        return Err(PacketError::Malformed(format!("header length {hlen}")));
    }
    if hlen > data.len() {
        return Err(PacketError::TooShort {
            needed: hlen,
            len: data.len(),
        });
    }
    Ok(hlen)
}

/// Recomputes the checksum of an IPv4 header at the start of each packet.
///
/// Writing the checksum unshares the packet buffer if needed. Packets that
/// do not start with a valid IPv4 header are dropped.
#[derive(Debug, Default)]
pub struct SetIPChecksum {
    drops: u64,
}

impl SetIPChecksum {
    pub fn drops(&self) -> u64 {
        self.drops
    }
}

impl Element for SetIPChecksum {
    fn class_name(&self) -> &'static str {
        "SetIPChecksum"
    }

    fn simple_action(&mut self, ctx: &mut ElementContext<'_>, mut packet: Packet) -> Option<Packet> {
        let hlen = match ip_header_len(packet.data()) {
            Ok(hlen) => hlen,
            Err(e) => {
                self.drops += 1;
                tracing::warn!("{}: dropping packet: {}", ctx.name(), e);
                return None;
            }
        };

        let header = &mut packet.data_mut()[..hlen];
        header[IP_CHECKSUM_OFFSET..IP_CHECKSUM_OFFSET + 2].fill(0);
        let sum = internet_checksum(header);
        header[IP_CHECKSUM_OFFSET..IP_CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
        Some(packet)
    }

    fn handlers(&self) -> &'static [HandlerSpec] {
        const HANDLERS: &[HandlerSpec] = &[HandlerSpec::read("drops")];
        HANDLERS
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "drops" => Some(self.drops.to_string()),
            _ => None,
        }
    }
}
