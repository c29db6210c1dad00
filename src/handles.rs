//! Opaque handle registry.
//!
//! A handle handed to the client is an 8-byte wire value encoding
//! `(slot_index: u32, generation_tag: u32)`. Closing a handle frees its
//! slot for reuse but bumps the generation, so a stale handle value
//! presented after `CLOSE` resolves to nothing rather than silently
//! aliasing whatever the slot holds next.
//!
//! Each live slot wraps its resource in its own `tokio::sync::Mutex`,
//! which doubles as the per-handle serialization gate described in the
//! concurrency model: operations on distinct handles never contend, and an
//! operation that must not interleave with another on the same handle
//! (text-mode I/O, positional `READ`/`WRITE`, `FSTAT`/`FSETSTAT`) acquires
//! the slot's lock for the duration of the host syscall.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::attrs::FileAttrs;
use crate::error::{Error, Result};

/// What a slot currently holds.
pub enum SlotState {
    File {
        file: tokio::fs::File,
        path: PathBuf,
        text: bool,
        /// Byte offset of the text-mode cursor, used by the v6 `text-seek`
        /// extension; unused for binary handles.
        text_cursor: u64,
    },
    Dir {
        path: PathBuf,
        entries: Vec<(String, FileAttrs)>,
        index: usize,
    },
}

struct Slot {
    generation: u32,
    state: Option<Arc<Mutex<SlotState>>>,
}

/// Per-session table of open file/directory handles.
#[derive(Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

fn encode_handle(slot: u32, generation: u32) -> Vec<u8> {
    let mut v = Vec::with_capacity(8);
    v.extend_from_slice(&slot.to_be_bytes());
    v.extend_from_slice(&generation.to_be_bytes());
    v
}

fn decode_handle(handle: &[u8]) -> Result<(u32, u32)> {
    if handle.len() != 8 {
        return Err(Error::invalid_handle("malformed handle"));
    }
    let slot = u32::from_be_bytes([handle[0], handle[1], handle[2], handle[3]]);
    let generation = u32::from_be_bytes([handle[4], handle[5], handle[6], handle[7]]);
    Ok((slot, generation))
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn alloc(&mut self, state: SlotState) -> Vec<u8> {
        let arc = Arc::new(Mutex::new(state));
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx];
            slot.state = Some(arc);
            encode_handle(idx as u32, slot.generation)
        } else {
            let idx = self.slots.len();
            self.slots.push(Slot { generation: 0, state: Some(arc) });
            encode_handle(idx as u32, 0)
        }
    }

    pub fn open_file(&mut self, path: PathBuf, file: tokio::fs::File, text: bool) -> Vec<u8> {
        self.alloc(SlotState::File { file, path, text, text_cursor: 0 })
    }

    pub fn open_dir(&mut self, path: PathBuf, entries: Vec<(String, FileAttrs)>) -> Vec<u8> {
        self.alloc(SlotState::Dir { path, entries, index: 0 })
    }

    fn resolve(&self, handle: &[u8]) -> Result<Arc<Mutex<SlotState>>> {
        let (slot, generation) = decode_handle(handle)?;
        let entry = self
            .slots
            .get(slot as usize)
            .ok_or_else(|| Error::invalid_handle("handle does not exist"))?;
        if entry.generation != generation {
            return Err(Error::invalid_handle("stale handle"));
        }
        entry
            .state
            .clone()
            .ok_or_else(|| Error::invalid_handle("handle has been closed"))
    }

    /// Resolve a handle and acquire its per-slot lock by taking ownership of
    /// the underlying `Arc`, so the returned guard does not borrow from
    /// `&self` and can be held across further `.await` points inside a
    /// handler without holding the registry itself.
    pub async fn lock_owned(&self, handle: &[u8]) -> Result<tokio::sync::OwnedMutexGuard<SlotState>> {
        let arc = self.resolve(handle)?;
        Ok(arc.lock_owned().await)
    }

    pub fn close(&mut self, handle: &[u8]) -> Result<()> {
        let (slot, generation) = decode_handle(handle)?;
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or_else(|| Error::invalid_handle("handle does not exist"))?;
        if entry.generation != generation || entry.state.is_none() {
            return Err(Error::invalid_handle("handle does not exist or already closed"));
        }
        entry.state = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(slot as usize);
        Ok(())
    }

    /// Release every open handle, used when a session ends.
    pub fn close_all(&mut self) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.state.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(idx);
            }
        }
    }
}
