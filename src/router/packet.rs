//! Shared, copy-on-write packet buffers.
//!
//! A `Packet` is a window (`data_start..data_start + len`) into a
//! reference-counted byte buffer. Cloning a packet shares the buffer; any
//! operation that writes bytes first makes the buffer exclusive, copying it
//! only when another holder still references it. Space before the window
//! (headroom) lets elements prepend headers without moving the payload.

use crate::router::error::PacketError;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Headroom reserved in front of freshly created packets.
pub const DEFAULT_HEADROOM: usize = 32;

/// Spare bytes reserved after freshly created packets.
pub const DEFAULT_TAILROOM: usize = 0;

/// Size of the free-form user annotation area.
pub const USER_ANNO_SIZE: usize = 16;

/// How the packet reached (or will leave) this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketType {
    #[default]
    Host,
    Broadcast,
    Multicast,
    OtherHost,
    Outgoing,
    Loopback,
}

/// Side-channel metadata carried with a packet, never part of its bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotations {
    /// Forward traffic rate, as stamped by a rate monitor.
    pub fwd_rate: i32,
    /// Reverse traffic rate, as stamped by a rate monitor.
    pub rev_rate: i32,
    pub dst_ip: Option<Ipv4Addr>,
    pub packet_type: PacketType,
    /// Time since router start when the packet was created or received.
    pub timestamp: Option<Duration>,
    user: [u8; USER_ANNO_SIZE],
}

impl Annotations {
    /// Reset every slot to its default.
    pub fn clear(&mut self) {
        *self = Annotations::default();
    }

    pub fn user(&self) -> &[u8; USER_ANNO_SIZE] {
        &self.user
    }

    pub fn user_u8(&self, offset: usize) -> Result<u8, PacketError> {
        Ok(self.user_slice(offset, 1)?[0])
    }

    pub fn set_user_u8(&mut self, offset: usize, value: u8) -> Result<(), PacketError> {
        self.user_slice_mut(offset, 1)?[0] = value;
        Ok(())
    }

    pub fn user_u16(&self, offset: usize) -> Result<u16, PacketError> {
        let s = self.user_slice(offset, 2)?;
        Ok(u16::from_ne_bytes([s[0], s[1]]))
    }

    pub fn set_user_u16(&mut self, offset: usize, value: u16) -> Result<(), PacketError> {
        self.user_slice_mut(offset, 2)?
            .copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn user_u32(&self, offset: usize) -> Result<u32, PacketError> {
        let s = self.user_slice(offset, 4)?;
        Ok(u32::from_ne_bytes([s[0], s[1], s[2], s[3]]))
    }

    pub fn set_user_u32(&mut self, offset: usize, value: u32) -> Result<(), PacketError> {
        self.user_slice_mut(offset, 4)?
            .copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    fn user_range(offset: usize, width: usize) -> Result<std::ops::Range<usize>, PacketError> {
        match offset.checked_add(width) {
            Some(end) if end <= USER_ANNO_SIZE => Ok(offset..end),
            _ => Err(PacketError::AnnotationOutOfRange { offset, width }),
        }
    }

    fn user_slice(&self, offset: usize, width: usize) -> Result<&[u8], PacketError> {
        Ok(&self.user[Self::user_range(offset, width)?])
    }

    fn user_slice_mut(&mut self, offset: usize, width: usize) -> Result<&mut [u8], PacketError> {
        Ok(&mut self.user[Self::user_range(offset, width)?])
    }
}

/// A network packet: shared bytes plus per-holder annotations.
#[derive(Clone)]
pub struct Packet {
    buffer: Arc<Vec<u8>>,
    data_start: usize,
    len: usize,
    anno: Annotations,
}

impl Packet {
    /// Create a packet holding a copy of `data` with default headroom.
    pub fn new(data: &[u8]) -> Self {
        Self::with_headroom(DEFAULT_HEADROOM, data)
    }

    /// Create a packet holding a copy of `data` after `headroom` spare bytes.
    pub fn with_headroom(headroom: usize, data: &[u8]) -> Self {
        let mut buffer = vec![0u8; headroom + data.len() + DEFAULT_TAILROOM];
        buffer[headroom..headroom + data.len()].copy_from_slice(data);
        Self {
            buffer: Arc::new(buffer),
            data_start: headroom,
            len: data.len(),
            anno: Annotations::default(),
        }
    }

    /// Take ownership of `bytes` as the packet data, with no headroom.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            buffer: Arc::new(bytes),
            data_start: 0,
            len,
            anno: Annotations::default(),
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.data_start..self.data_start + self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.data_start
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buffer.len() - self.data_start - self.len
    }

    /// Total size of the underlying buffer, including head and tail room.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether another packet currently references the same buffer.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.buffer) > 1
    }

    pub fn shares_buffer_with(&self, other: &Packet) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Ensure this packet is the only holder of its buffer.
    ///
    /// Returns `true` if a copy was made.
    pub fn make_exclusive(&mut self) -> bool {
        let shared = self.is_shared();
        if shared {
            tracing::trace!(len = self.len, "copying shared packet buffer");
        }
        Arc::make_mut(&mut self.buffer);
        shared
    }

    /// Writable view of the packet data. Copies the buffer if it is shared.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.make_exclusive();
        let range = self.data_start..self.data_start + self.len;
        &mut Arc::make_mut(&mut self.buffer)[range]
    }

    /// Prepend `n` bytes and return them for writing.
    ///
    /// Uses existing headroom when there is enough; otherwise the data is
    /// moved into a new buffer with fresh headroom.
    pub fn push_header(&mut self, n: usize) -> &mut [u8] {
        if n <= self.data_start {
            self.make_exclusive();
            self.data_start -= n;
            self.len += n;
        } else {
            self.reallocate(DEFAULT_HEADROOM + n, self.tailroom());
            self.data_start -= n;
            self.len += n;
        }
        let start = self.data_start;
        &mut Arc::make_mut(&mut self.buffer)[start..start + n]
    }

    /// Strip `n` leading bytes. The bytes stay in the buffer as headroom.
    pub fn pull_header(&mut self, n: usize) -> Result<(), PacketError> {
        if n > self.len {
            return Err(PacketError::TooShort {
                needed: n,
                len: self.len,
            });
        }
        self.data_start += n;
        self.len -= n;
        Ok(())
    }

    /// Append `n` zeroed bytes and return them for writing.
    pub fn put(&mut self, n: usize) -> &mut [u8] {
        if n <= self.tailroom() {
            self.make_exclusive();
        } else {
            self.reallocate(self.data_start, n);
        }
        let start = self.data_start + self.len;
        self.len += n;
        let tail = &mut Arc::make_mut(&mut self.buffer)[start..start + n];
        tail.fill(0);
        tail
    }

    /// Drop `n` trailing bytes.
    pub fn take(&mut self, n: usize) -> Result<(), PacketError> {
        if n > self.len {
            return Err(PacketError::TooShort {
                needed: n,
                len: self.len,
            });
        }
        self.len -= n;
        Ok(())
    }

    #[inline]
    pub fn anno(&self) -> &Annotations {
        &self.anno
    }

    #[inline]
    pub fn anno_mut(&mut self) -> &mut Annotations {
        &mut self.anno
    }

    fn reallocate(&mut self, headroom: usize, tailroom: usize) {
        let mut buffer = vec![0u8; headroom + self.len + tailroom];
        buffer[headroom..headroom + self.len].copy_from_slice(self.data());
        self.buffer = Arc::new(buffer);
        self.data_start = headroom;
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.len)
            .field("headroom", &self.headroom())
            .field("tailroom", &self.tailroom())
            .field("shared", &self.is_shared())
            .finish()
    }
}
