//! Default adapter: a non-blocking UDP socket polled through `mio` (§4.4).

use super::{Adapter, AdapterCapabilities, AdapterEvents};
use crate::error::{Error, Result};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use std::net::SocketAddr;

const SOCKET_TOKEN: Token = Token(0);
/// Matches the delivery engine's default fragment sizing (`DEFAULT_MTU`);
/// oversized datagrams are truncated by the kernel before we'd ever see them
/// here, so this is generous headroom rather than a hard protocol limit.
const RECV_BUFFER_SIZE: usize = 2048;

pub struct UdpAdapter {
    socket: UdpSocket,
    poll: Poll,
    events: Events,
    recv_buf: [u8; RECV_BUFFER_SIZE],
}

impl UdpAdapter {
    pub fn bind(addr: SocketAddr) -> Result<UdpAdapter> {
        let mut socket = UdpSocket::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry().register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;

        Ok(UdpAdapter {
            socket,
            poll,
            events: Events::with_capacity(128),
            recv_buf: [0u8; RECV_BUFFER_SIZE],
        })
    }

    pub fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        self.socket.connect(addr)?;
        Ok(())
    }
}

impl Adapter for UdpAdapter {
    fn capabilities(&self) -> AdapterCapabilities {
        // Plain UDP forwards bytes straight to the platform socket; it
        // carries AEAD-sealed traffic in both directions and nothing else.
        AdapterCapabilities {
            client_encrypted: true,
            server_encrypted: true,
            client_unencrypted: false,
            server_unencrypted: false,
        }
    }

    fn send(&mut self, to: SocketAddr, data: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(data, to)?;
        if sent != data.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "datagram truncated on send",
            )));
        }
        Ok(())
    }

    fn poll(&mut self, events_sink: &mut dyn AdapterEvents) -> Result<()> {
        self.poll.poll(&mut self.events, Some(std::time::Duration::from_millis(0)))?;

        if self.events.iter().any(|event| event.token() == SOCKET_TOKEN) {
            loop {
                match self.socket.recv_from(&mut self.recv_buf) {
                    Ok((len, from)) => events_sink.on_recv(from, &self.recv_buf[..len]),
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err.into()),
                }
            }
        }

        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
