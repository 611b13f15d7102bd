//! Ref-counted parcel handle handed to and from the public API (§4.8).
//!
//! A `Message` starts in write mode so the caller can build up a payload
//! with `write`, then `finish()` to freeze it before handing it to
//! [`crate::api::channel::Channel::send`]. On the receive side a frozen
//! `Message` is handed back and only `read`/`body` make sense. The two
//! modes are exclusive: writing after `finish()` or reading before it is a
//! programmer error, not a recoverable one, since nothing on the wire can
//! trigger it.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

enum State {
    Writing(Vec<u8>),
    Reading { data: Rc<Vec<u8>>, cursor: usize },
}

/// All API calls run on one cooperative main loop (§5), so reference
/// counting here is `Rc`, not `Arc`: a message fanned out to N broadcast
/// recipients shares one buffer without cloning it N times.
pub struct Message {
    state: RefCell<State>,
}

impl Message {
    pub fn new() -> Message {
        Message { state: RefCell::new(State::Writing(Vec::new())) }
    }

    pub fn from_bytes(data: Vec<u8>) -> Message {
        Message { state: RefCell::new(State::Reading { data: Rc::new(data), cursor: 0 }) }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        match &mut *self.state.borrow_mut() {
            State::Writing(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            State::Reading { .. } => Err(Error::IllegalState("message: write after finish")),
        }
    }

    /// Freezes the message, making it shareable and readable. Cheap: the
    /// accumulated buffer moves into the `Rc` without copying.
    pub fn finish(&self) {
        let mut state = self.state.borrow_mut();
        if let State::Writing(buf) = &mut *state {
            let data = std::mem::take(buf);
            *state = State::Reading { data: Rc::new(data), cursor: 0 };
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(&*self.state.borrow(), State::Reading { .. })
    }

    /// Full body, regardless of the read cursor's position.
    pub fn body(&self) -> Result<Rc<Vec<u8>>> {
        match &*self.state.borrow() {
            State::Reading { data, .. } => Ok(Rc::clone(data)),
            State::Writing(_) => Err(Error::IllegalState("message: read before finish")),
        }
    }

    /// Reads up to `buf.len()` bytes starting at the cursor, advancing it.
    /// Returns the number of bytes copied.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match &mut *self.state.borrow_mut() {
            State::Reading { data, cursor } => {
                let remaining = &data[*cursor..];
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                *cursor += n;
                Ok(n)
            }
            State::Writing(_) => Err(Error::IllegalState("message: read before finish")),
        }
    }

    pub fn len(&self) -> usize {
        match &*self.state.borrow() {
            State::Writing(buf) => buf.len(),
            State::Reading { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Message {
    fn default() -> Message {
        Message::new()
    }
}
