use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};
use rosc::{OscPacket, OscType};
use uniforms::{SetOptions, UniformStore};

const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// UDP listener mapping `/<prefix>/<name> f [f f f]` onto uniform edits.
pub struct OscListener {
    local_addr: SocketAddr,
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl OscListener {
    pub fn spawn(bind: &str, prefix: &str, store: Arc<UniformStore>) -> Result<Self> {
        let socket = UdpSocket::bind(bind)
            .with_context(|| format!("failed to bind OSC socket on {bind}"))?;
        socket
            .set_nonblocking(true)
            .context("failed to make OSC socket non-blocking")?;
        let local_addr = socket.local_addr().context("OSC socket has no address")?;
        let prefix = normalise_prefix(prefix);
        tracing::info!(addr = %local_addr, prefix = %prefix, "listening for OSC");

        let (stop, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("osc".into())
            .spawn(move || {
                let mut buf = [0u8; 2048];
                loop {
                    if stop_rx.try_recv().is_ok() {
                        break;
                    }
                    match socket.recv_from(&mut buf) {
                        Ok((size, from)) => match rosc::decoder::decode_udp(&buf[..size]) {
                            Ok((_rest, packet)) => handle_packet(packet, &prefix, &store),
                            Err(err) => {
                                tracing::debug!(%from, error = ?err, "dropping malformed OSC packet");
                            }
                        },
                        Err(_) => thread::sleep(IDLE_SLEEP),
                    }
                }
                tracing::debug!("OSC listener stopped");
            })
            .context("failed to spawn OSC thread")?;

        Ok(Self {
            local_addr,
            stop,
            join: Some(join),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for OscListener {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn handle_packet(packet: OscPacket, prefix: &str, store: &UniformStore) {
    match packet {
        OscPacket::Message(message) => {
            let Some(name) = uniform_name(prefix, &message.addr) else {
                tracing::debug!(addr = %message.addr, "ignoring OSC address outside prefix");
                return;
            };
            let values = float_args(&message.args);
            if values.is_empty() {
                tracing::debug!(addr = %message.addr, "OSC message carries no numeric arguments");
                return;
            }
            if store.set_values(name, &values, SetOptions::INTERACTIVE) {
                tracing::trace!(name, ?values, "OSC uniform update");
            }
        }
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                handle_packet(packet, prefix, store);
            }
        }
    }
}

/// `/uniform/` style prefix with exactly one leading and trailing slash.
fn normalise_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn uniform_name<'a>(prefix: &str, addr: &'a str) -> Option<&'a str> {
    let name = addr.strip_prefix(prefix)?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name)
}

fn float_args(args: &[OscType]) -> Vec<f32> {
    args.iter()
        .filter_map(|arg| match arg {
            OscType::Float(value) => Some(*value),
            OscType::Double(value) => Some(*value as f32),
            OscType::Int(value) => Some(*value as f32),
            OscType::Long(value) => Some(*value as f32),
            OscType::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            _ => None,
        })
        .collect()
}
