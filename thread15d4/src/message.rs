//! Fixed-size message buffer pool.
//!
//! The pool owns `N` buffers of [`BUFFER_SIZE`] bytes linked through an
//! index table. A [`Message`] is a chain of buffers plus metadata. Messages
//! are not `Clone`: a message has exactly one owner and returns its buffers
//! to the pool through [`MessagePool::free`].

use crate::frame::Address;
use crate::{Error, Result};

/// Size of one pool buffer.
pub const BUFFER_SIZE: usize = 128;

const NONE: u16 = u16::MAX;

/// Transmission priority of a message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Metadata attached to a message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub priority: Priority,
    /// Apply MAC layer security when sending.
    pub link_security: bool,
    /// MAC destination (next hop).
    pub peer: Address,
}

/// A chain of pool buffers.
#[derive(Debug)]
pub struct Message {
    head: u16,
    length: u16,
    offset: u16,
    pub info: MessageInfo,
}

impl Message {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Move the read offset. The offset never exceeds the length.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.len() {
            return Err(Error::InvalidArgs);
        }
        self.offset = offset as u16;
        Ok(())
    }
}

/// Usage counters of a [`MessagePool`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolInfo {
    pub total_buffers: usize,
    pub free_buffers: usize,
    pub messages: usize,
}

/// A fixed number of fixed-size buffers on a free list.
pub struct MessagePool<const N: usize> {
    buffers: [[u8; BUFFER_SIZE]; N],
    next: [u16; N],
    free_head: u16,
    free: usize,
    messages: usize,
}

impl<const N: usize> Default for MessagePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MessagePool<N> {
    pub fn new() -> Self {
        let mut next = [NONE; N];
        for (i, n) in next.iter_mut().enumerate() {
            *n = if i + 1 < N { (i + 1) as u16 } else { NONE };
        }

        Self {
            buffers: [[0; BUFFER_SIZE]; N],
            next,
            free_head: if N > 0 { 0 } else { NONE },
            free: N,
            messages: 0,
        }
    }

    fn take_buffer(&mut self) -> Result<u16> {
        if self.free_head == NONE {
            return Err(Error::NoBufs);
        }
        let index = self.free_head;
        self.free_head = self.next[index as usize];
        self.next[index as usize] = NONE;
        self.free -= 1;
        Ok(index)
    }

    fn release_chain(&mut self, mut index: u16) {
        while index != NONE {
            let next = self.next[index as usize];
            self.next[index as usize] = self.free_head;
            self.free_head = index;
            self.free += 1;
            index = next;
        }
    }

    fn buffers_for(len: usize) -> usize {
        len.div_ceil(BUFFER_SIZE).max(1)
    }

    /// Allocate an empty message.
    pub fn allocate(&mut self, info: MessageInfo) -> Result<Message> {
        let head = self.take_buffer()?;
        self.messages += 1;
        Ok(Message {
            head,
            length: 0,
            offset: 0,
            info,
        })
    }

    /// Return the buffers of `message` to the pool.
    pub fn free(&mut self, message: Message) {
        self.release_chain(message.head);
        self.messages -= 1;
    }

    /// Resize the message, growing or shrinking its chain. On `NoBufs` the
    /// message is unchanged.
    pub fn set_length(&mut self, message: &mut Message, length: usize) -> Result<()> {
        if length > u16::MAX as usize {
            return Err(Error::InvalidArgs);
        }

        let have = Self::buffers_for(message.len());
        let want = Self::buffers_for(length);

        if want > have {
            if want - have > self.free {
                return Err(Error::NoBufs);
            }
            let mut tail = self.nth_buffer(message.head, have - 1);
            for _ in have..want {
                let index = self.take_buffer()?;
                self.next[tail as usize] = index;
                tail = index;
            }
        } else if want < have {
            let tail = self.nth_buffer(message.head, want - 1);
            let rest = self.next[tail as usize];
            self.next[tail as usize] = NONE;
            self.release_chain(rest);
        }

        message.length = length as u16;
        if message.offset > message.length {
            message.offset = message.length;
        }
        Ok(())
    }

    /// Append bytes at the end of the message.
    pub fn append(&mut self, message: &mut Message, data: &[u8]) -> Result<()> {
        let start = message.len();
        self.set_length(message, start + data.len())?;
        self.write(message, start, data)
    }

    /// Overwrite bytes inside the message.
    pub fn write(&mut self, message: &Message, offset: usize, data: &[u8]) -> Result<()> {
        if offset + data.len() > message.len() {
            return Err(Error::InvalidArgs);
        }

        let mut index = self.nth_buffer(message.head, offset / BUFFER_SIZE);
        let mut pos = offset % BUFFER_SIZE;
        let mut data = data;
        while !data.is_empty() {
            let n = data.len().min(BUFFER_SIZE - pos);
            self.buffers[index as usize][pos..pos + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            pos = 0;
            index = self.next[index as usize];
        }
        Ok(())
    }

    /// Copy bytes starting at `offset` into `buf`. Returns the number of
    /// bytes copied.
    pub fn read(&self, message: &Message, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= message.len() {
            return 0;
        }

        let count = buf.len().min(message.len() - offset);
        let mut index = self.nth_buffer(message.head, offset / BUFFER_SIZE);
        let mut pos = offset % BUFFER_SIZE;
        let mut done = 0;
        while done < count {
            let n = (count - done).min(BUFFER_SIZE - pos);
            buf[done..done + n].copy_from_slice(&self.buffers[index as usize][pos..pos + n]);
            done += n;
            pos = 0;
            index = self.next[index as usize];
        }
        count
    }

    fn nth_buffer(&self, head: u16, n: usize) -> u16 {
        let mut index = head;
        for _ in 0..n {
            index = self.next[index as usize];
        }
        index
    }

    /// Return the number of free buffers.
    pub fn free_buffers(&self) -> usize {
        self.free
    }

    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            total_buffers: N,
            free_buffers: self.free,
            messages: self.messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_free() {
        let mut pool = MessagePool::<4>::new();
        let a = pool.allocate(MessageInfo::default()).unwrap();
        let b = pool.allocate(MessageInfo::default()).unwrap();
        assert_eq!(pool.info().messages, 2);
        assert_eq!(pool.free_buffers(), 2);

        pool.free(a);
        pool.free(b);
        assert_eq!(pool.info(), PoolInfo {
            total_buffers: 4,
            free_buffers: 4,
            messages: 0
        });
    }

    #[test]
    fn chained_append_and_read() {
        let mut pool = MessagePool::<4>::new();
        let mut msg = pool.allocate(MessageInfo::default()).unwrap();
        let data: std::vec::Vec<u8> = (0..300u16).map(|i| i as u8).collect();
        pool.append(&mut msg, &data).unwrap();
        assert_eq!(msg.len(), 300);
        assert_eq!(pool.free_buffers(), 1);

        let mut out = [0u8; 300];
        assert_eq!(pool.read(&msg, 0, &mut out), 300);
        assert_eq!(&out[..], &data[..]);

        let mut out = [0u8; 10];
        assert_eq!(pool.read(&msg, 125, &mut out), 10);
        assert_eq!(out, [125, 126, 127, 128, 129, 130, 131, 132, 133, 134]);
        assert_eq!(pool.read(&msg, 295, &mut out), 5);

        pool.write(&msg, 126, &[0xaa, 0xbb, 0xcc]).unwrap();
        let mut out = [0u8; 3];
        pool.read(&msg, 126, &mut out);
        assert_eq!(out, [0xaa, 0xbb, 0xcc]);
        assert_eq!(pool.write(&msg, 299, &[1, 2]), Err(Error::InvalidArgs));

        pool.free(msg);
        assert_eq!(pool.free_buffers(), 4);
    }

    #[test]
    fn no_bufs_keeps_message_intact() {
        let mut pool = MessagePool::<2>::new();
        let mut msg = pool.allocate(MessageInfo::default()).unwrap();
        pool.append(&mut msg, &[1, 2, 3]).unwrap();

        assert_eq!(pool.append(&mut msg, &[0u8; 400]), Err(Error::NoBufs));
        assert_eq!(msg.len(), 3);
        assert_eq!(pool.free_buffers(), 1);

        assert_eq!(pool.allocate(MessageInfo::default()).map(|m| m.len()), Ok(0));
        assert_eq!(pool.allocate(MessageInfo::default()).err(), Some(Error::NoBufs));
    }

    #[test]
    fn shrink_and_offset() {
        let mut pool = MessagePool::<3>::new();
        let mut msg = pool.allocate(MessageInfo::default()).unwrap();
        pool.set_length(&mut msg, 256).unwrap();
        assert_eq!(pool.free_buffers(), 1);
        msg.set_offset(200).unwrap();

        pool.set_length(&mut msg, 100).unwrap();
        assert_eq!(pool.free_buffers(), 2);
        assert_eq!(msg.offset(), 100);
        assert_eq!(msg.set_offset(101), Err(Error::InvalidArgs));
        pool.free(msg);
    }
}
