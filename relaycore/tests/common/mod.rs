//! In-process adapter shared by the integration tests: datagrams are handed
//! off through a `HashMap`-backed switchboard instead of a real socket, with
//! an optional per-adapter drop filter so a test can script loss
//! deterministically instead of depending on an RNG.

use relaycore::adapter::{Adapter, AdapterCapabilities, AdapterEvents};
use relaycore::error::Result;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;

type Datagram = (SocketAddr, Vec<u8>);

#[derive(Default)]
pub struct Network {
    queues: RefCell<HashMap<SocketAddr, VecDeque<Datagram>>>,
}

impl Network {
    pub fn new() -> Rc<Network> {
        Rc::new(Network::default())
    }
}

pub struct LoopbackAdapter {
    addr: SocketAddr,
    network: Rc<Network>,
    drop_filter: Option<Box<dyn FnMut(&[u8]) -> bool>>,
}

impl LoopbackAdapter {
    pub fn new(addr: SocketAddr, network: Rc<Network>) -> LoopbackAdapter {
        network.queues.borrow_mut().entry(addr).or_default();
        LoopbackAdapter { addr, network, drop_filter: None }
    }

    /// Every outbound datagram for which `filter` returns `true` is dropped
    /// before it reaches the switchboard.
    pub fn set_drop_filter<F>(&mut self, filter: F)
    where
        F: FnMut(&[u8]) -> bool + 'static,
    {
        self.drop_filter = Some(Box::new(filter));
    }
}

impl Adapter for LoopbackAdapter {
    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            client_encrypted: true,
            server_encrypted: true,
            client_unencrypted: false,
            server_unencrypted: false,
        }
    }

    fn send(&mut self, to: SocketAddr, data: &[u8]) -> Result<()> {
        if let Some(filter) = &mut self.drop_filter {
            if filter(data) {
                return Ok(());
            }
        }
        self.network.queues.borrow_mut().entry(to).or_default().push_back((self.addr, data.to_vec()));
        Ok(())
    }

    fn poll(&mut self, events: &mut dyn AdapterEvents) -> Result<()> {
        let mut queues = self.network.queues.borrow_mut();
        if let Some(queue) = queues.get_mut(&self.addr) {
            while let Some((from, data)) = queue.pop_front() {
                events.on_recv(from, &data);
            }
        }
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }
}
