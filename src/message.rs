use std::mem::size_of;

use bytemuck::Pod;

use crate::error::DecodeErr;

/// Identifies a model instance within a model host.
pub type ModelId = u32;

/// Identifies a worker attached to a model instance.
pub type WorkerId = u32;

/// A worker's logical round counter.
pub type Clock = u64;

/// A parameter key.
pub type Key = u64;

/// A parameter value.
pub type Val = f32;

/// The operation tag of a `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Advance,
    Write,
    Read,
    InitRead,
    Reset,
    ReadReply,
    ResetAck,
    Err,
    Exit,
}

/// The routing header of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub model_id: ModelId,
    pub sender: WorkerId,
    pub recver: WorkerId,
    pub flag: Flag,
}

/// An operation or reply travelling through the work and reply queues.
///
/// The payload is a sequence of opaque byte blocks, its layout depends on `meta.flag`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub meta: Meta,
    pub data: Vec<Vec<u8>>,
}

impl Message {
    /// Creates a new `Message` without payload.
    ///
    /// # Arguments
    /// * `model_id` - The addressed model.
    /// * `sender` - The originating worker.
    /// * `recver` - The receiving end, usually the server id.
    /// * `flag` - The operation tag.
    pub fn new(model_id: ModelId, sender: WorkerId, recver: WorkerId, flag: Flag) -> Self {
        Self {
            meta: Meta {
                model_id,
                sender,
                recver,
                flag,
            },
            data: Vec::new(),
        }
    }

    /// A clock advance from `sender`.
    pub fn advance(model_id: ModelId, sender: WorkerId) -> Self {
        Self::new(model_id, sender, 0, Flag::Advance)
    }

    /// A write of `vals` into `keys` from `sender`.
    pub fn write(model_id: ModelId, sender: WorkerId, keys: &[Key], vals: &[Val]) -> Self {
        let mut msg = Self::new(model_id, sender, 0, Flag::Write);
        msg.data = vec![encode(keys), encode(vals)];
        msg
    }

    /// A read of `keys` from `sender`.
    pub fn read(model_id: ModelId, sender: WorkerId, keys: &[Key]) -> Self {
        let mut msg = Self::new(model_id, sender, 0, Flag::Read);
        msg.data = vec![encode(keys)];
        msg
    }

    /// An initial read of `keys` from `sender`, answered regardless of its progress.
    pub fn init_read(model_id: ModelId, sender: WorkerId, keys: &[Key]) -> Self {
        let mut msg = Self::new(model_id, sender, 0, Flag::InitRead);
        msg.data = vec![encode(keys)];
        msg
    }

    /// A membership reset requested by `sender`.
    pub fn reset(model_id: ModelId, sender: WorkerId, workers: &[WorkerId]) -> Self {
        let mut msg = Self::new(model_id, sender, 0, Flag::Reset);
        msg.data = vec![encode(workers)];
        msg
    }

    /// The sentinel that stops a `ServerThread`.
    pub fn exit() -> Self {
        Self::new(0, 0, 0, Flag::Exit)
    }

    /// Creates a reply to the originator of `meta`, swapping both ends.
    ///
    /// # Arguments
    /// * `meta` - The header of the request being answered.
    /// * `flag` - The reply tag.
    /// * `data` - The reply payload.
    pub fn reply_to(meta: &Meta, flag: Flag, data: Vec<Vec<u8>>) -> Self {
        Self {
            meta: Meta {
                model_id: meta.model_id,
                sender: meta.recver,
                recver: meta.sender,
                flag,
            },
            data,
        }
    }

    /// Decodes the `[WorkerId]` block of a reset request.
    pub fn worker_ids(&self) -> Result<Vec<WorkerId>, DecodeErr> {
        self.expect_blocks(1)?;
        decode(&self.data[0], "worker ids")
    }

    /// Decodes the key block of a read request.
    pub fn keys(&self) -> Result<Vec<Key>, DecodeErr> {
        self.expect_blocks(1)?;
        decode(&self.data[0], "keys")
    }

    /// Decodes the key and value blocks of a write request or read reply.
    pub fn kv_pairs(&self) -> Result<KvPairs, DecodeErr> {
        self.expect_blocks(2)?;
        let keys = decode(&self.data[0], "keys")?;
        let vals = decode(&self.data[1], "values")?;

        if keys.len() != vals.len() {
            return Err(DecodeErr::LengthMismatch {
                keys: keys.len(),
                vals: vals.len(),
            });
        }

        Ok(KvPairs { keys, vals })
    }

    /// Decodes the text block of an error reply.
    pub fn err_text(&self) -> Result<String, DecodeErr> {
        self.expect_blocks(1)?;
        String::from_utf8(self.data[0].clone()).map_err(|_| DecodeErr::NotUtf8)
    }

    fn expect_blocks(&self, expected: usize) -> Result<(), DecodeErr> {
        if self.data.len() != expected {
            return Err(DecodeErr::BlockCount {
                flag: self.meta.flag,
                expected,
                got: self.data.len(),
            });
        }

        Ok(())
    }
}

/// A decoded write payload or read answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KvPairs {
    pub keys: Vec<Key>,
    pub vals: Vec<Val>,
}

impl KvPairs {
    /// Encodes these pairs as a key block and a value block.
    pub fn into_blocks(self) -> Vec<Vec<u8>> {
        vec![encode(&self.keys), encode(&self.vals)]
    }
}

/// Flattens a slice of plain values into a byte block.
pub fn encode<T: Pod>(items: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(items).to_vec()
}

/// Reads a byte block back into plain values.
///
/// Blocks are not required to be aligned for `T`, every element is read unaligned.
fn decode<T: Pod>(block: &[u8], what: &'static str) -> Result<Vec<T>, DecodeErr> {
    let elem = size_of::<T>();
    if block.len() % elem != 0 {
        return Err(DecodeErr::Ragged {
            what,
            len: block.len(),
            elem,
        });
    }

    Ok(block
        .chunks_exact(elem)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_message_decodes_pairs() {
        let msg = Message::write(3, 7, &[1, 5, 9], &[0.5, -1.0, 2.0]);
        let kvs = msg.kv_pairs().unwrap();

        assert_eq!(msg.meta.model_id, 3);
        assert_eq!(msg.meta.sender, 7);
        assert_eq!(kvs.keys, [1, 5, 9]);
        assert_eq!(kvs.vals, [0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_decode_from_unaligned_block() {
        let mut block = vec![0u8];
        block.extend(encode::<Key>(&[42, 43]));

        let keys: Vec<Key> = decode(&block[1..], "keys").unwrap();
        assert_eq!(keys, [42, 43]);
    }

    #[test]
    fn test_reset_with_ragged_block_fails() {
        let mut msg = Message::new(0, 1, 0, Flag::Reset);
        msg.data = vec![vec![1, 0, 0]];

        assert!(matches!(
            msg.worker_ids(),
            Err(DecodeErr::Ragged { elem: 4, len: 3, .. })
        ));
    }

    #[test]
    fn test_reset_with_two_blocks_fails() {
        let mut msg = Message::reset(0, 1, &[1, 2]);
        msg.data.push(Vec::new());

        assert!(matches!(
            msg.worker_ids(),
            Err(DecodeErr::BlockCount {
                expected: 1,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_write_with_mismatched_lengths_fails() {
        let mut msg = Message::new(0, 1, 0, Flag::Write);
        msg.data = vec![encode::<Key>(&[1, 2]), encode::<Val>(&[1.0])];

        assert!(matches!(
            msg.kv_pairs(),
            Err(DecodeErr::LengthMismatch { keys: 2, vals: 1 })
        ));
    }

    #[test]
    fn test_reply_swaps_ends() {
        let req = Message::new(4, 11, 2, Flag::Read);
        let reply = Message::reply_to(&req.meta, Flag::ReadReply, Vec::new());

        assert_eq!(reply.meta.model_id, 4);
        assert_eq!(reply.meta.sender, 2);
        assert_eq!(reply.meta.recver, 11);
        assert_eq!(reply.meta.flag, Flag::ReadReply);
    }
}
