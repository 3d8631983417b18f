//! Test doubles and a harness that wires a real engine to them.
//!
//! The store and renderer are the real ones; interfaces and the broadcaster
//! are replaced so cycles can be observed without touching the network.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use udpt::config::{Seeds, VarNames};
use udpt::cycle::BroadcastCycle;
use udpt::dispatcher::{Engine, Handles};
use udpt::error::NetworkError;
use udpt::event::{self, EventReceiver};
use udpt::interfaces::{InterfaceSource, NetworkInterface};
use udpt::network::Broadcaster;
use udpt::store::{ConfigStore, MemoryStore, Store};
use udpt::template::TemplateRenderer;
use udpt::timer::TimerManager;

/// Interface source returning a fixed list.
pub struct StaticInterfaces(pub Vec<NetworkInterface>);

impl InterfaceSource for StaticInterfaces {
    fn list(&self) -> Vec<NetworkInterface> {
        self.0.clone()
    }
}

/// Broadcaster that records every datagram and fails for chosen destinations.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    sent: Arc<Mutex<Vec<(SocketAddr, Vec<u8>)>>>,
    failing: Arc<Mutex<Vec<SocketAddr>>>,
}

impl RecordingBroadcaster {
    pub fn fail_for(&self, destination: SocketAddr) {
        self.failing.lock().push(destination);
    }

    pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn send(&self, destination: SocketAddr, payload: &[u8]) -> Result<usize, NetworkError> {
        if self.failing.lock().contains(&destination) {
            return Err(NetworkError::Send {
                destination,
                source: io::Error::new(io::ErrorKind::Other, "network unreachable"),
            });
        }
        self.sent.lock().push((destination, payload.to_vec()));
        Ok(payload.len())
    }
}

/// An IPv4 /24 interface entry.
pub fn iface(name: &str, index: u32, a: u8, b: u8, c: u8, d: u8) -> NetworkInterface {
    NetworkInterface::ipv4(name, index, Ipv4Addr::new(a, b, c, d), 24)
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub events: EventReceiver,
    pub broadcaster: RecordingBroadcaster,
    pub names: VarNames,
    pub template: PathBuf,
    _dir: TempDir,
}

/// Builds an engine over `interfaces`.
///
/// With `template = None` the template path points at a file that does not exist.
pub fn harness(template: Option<&str>, interfaces: Vec<NetworkInterface>, seeds: Seeds) -> Harness {
    harness_with(template, interfaces, seeds, |_| {})
}

/// Like [`harness`], but `prepare` runs against the store before the engine
/// registers its variables, as another process would have.
pub fn harness_with(
    template: Option<&str>,
    interfaces: Vec<NetworkInterface>,
    seeds: Seeds,
    prepare: impl FnOnce(&MemoryStore),
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("udpt.tmpl");
    if let Some(body) = template {
        std::fs::write(&path, body).expect("write template");
    }

    let (tx, events) = event::channel();
    let store = Arc::new(MemoryStore::open(tx.clone()).expect("open store"));
    prepare(&store);
    let shared: Arc<dyn Store> = store.clone();
    let broadcaster = RecordingBroadcaster::default();

    let cycle = BroadcastCycle::new(
        Box::new(TemplateRenderer::new(Arc::clone(&shared))),
        Box::new(StaticInterfaces(interfaces)),
        Box::new(broadcaster.clone()),
    )
    .expect("render buffer");

    let names = VarNames::default();
    let mut config_store = ConfigStore::new(shared);
    let handles = Handles::register(&mut config_store, &names, &seeds).expect("register");
    let engine = Engine::new(config_store, handles, path.clone(), TimerManager::new(tx), cycle);

    Harness {
        engine,
        store,
        events,
        broadcaster,
        names,
        template: path,
        _dir: dir,
    }
}

/// Seeds for an enabled engine without a periodic timer.
pub fn enabled(port: u16) -> Seeds {
    Seeds {
        enable: true,
        port,
        ..Seeds::default()
    }
}

impl Harness {
    /// Handles every event queued so far, in order. Returns how many there were.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.engine.handle(event).await;
            handled += 1;
        }
        handled
    }

    /// Writes a variable the way another process would.
    pub fn write(&self, name: &str, text: &str) {
        self.store.set_text(name, text).expect("set variable");
    }

    pub fn trigger(&self) {
        let name = self.names.trigger.clone();
        self.write(&name, "1");
    }
}
