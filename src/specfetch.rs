//! Spec-fetch subsystem (§4.5): forks a helper child that brings up a
//! minimal two-translator graph (a placeholder `top` over a
//! `protocol/client`), issues one `getspec` management call, and writes the
//! reply to a temp file the parent then rewinds and reads.
//!
//! The fork boundary is load-bearing (design note, §9): it keeps the
//! client's state from leaking into the main process, so it is kept as a
//! real `fork()` via `nix` rather than a spawned helper binary.

use std::io::{Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;
use std::sync::Arc;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};

use crate::context::Context;
use crate::dict::Dict;
use crate::frame::Frame;
use crate::types::errors::{FuseResult, PosixError};
use crate::xlator::{Translator, Xlator};

const GETSPEC_OP: u8 = 1;

/// Configuration needed to reach a remote spec server, mirrored from the
/// `--specfile-server*` CLI flags (§6).
#[derive(Debug, Clone)]
pub struct SpecServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: String,
}

/// The `protocol/client` translator. Only `getspec` is implemented: this
/// leaf exists solely to carry the spec-fetch handshake (§4.5), not to
/// front a general RPC channel.
pub struct ClientTranslator {
    remote_host: String,
    remote_port: u16,
}

impl ClientTranslator {
    pub fn new(options: &Dict) -> Self {
        ClientTranslator {
            remote_host: options.get_str("remote-host").unwrap_or_default(),
            remote_port: options.get_str("remote-port").and_then(|s| s.parse().ok()).unwrap_or(24007),
        }
    }

    fn getspec_over_wire(&self) -> FuseResult<Vec<u8>> {
        let mut stream = TcpStream::connect((self.remote_host.as_str(), self.remote_port))
            .map_err(|e| PosixError::new(libc::ECONNREFUSED, e.to_string()))?;

        let mut request = Vec::with_capacity(5);
        request.push(GETSPEC_OP);
        request.extend_from_slice(&0u32.to_be_bytes());
        stream.write_all(&request).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;

        let mut status_buf = [0u8; 4];
        stream.read_exact(&mut status_buf).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
        let status = i32::from_be_bytes(status_buf);
        if status != 0 {
            return Err(PosixError::new(status, "remote getspec returned non-zero status"));
        }

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
        Ok(payload)
    }
}

impl Xlator for ClientTranslator {
    fn type_name(&self) -> &'static str {
        "protocol/client"
    }

    fn getspec(&self, _node: &Translator, _frame: &Arc<Frame>, _key: &Dict) -> FuseResult<Vec<u8>> {
        self.getspec_over_wire()
    }
}

/// A placeholder root translator for the bootstrap graph: it has no ops of
/// its own and simply forwards `getspec` (and every other call) to its sole
/// child, the `protocol/client`.
pub struct TopTranslator;

impl Xlator for TopTranslator {
    fn type_name(&self) -> &'static str {
        "spec-fetch/top"
    }

    fn getspec(&self, node: &Translator, frame: &Arc<Frame>, key: &Dict) -> FuseResult<Vec<u8>> {
        node.sole_child()?.getspec(frame, key)
    }
}

/// Builds the minimal `top`/`trans` graph described in §4.5: a placeholder
/// top over a `protocol/client` configured with the remote host/port, a
/// `transport-type` derived from the configured transport, the
/// required-but-unused `remote-subvolume = "brick"` (§10.5, `fetch-spec.c`),
/// and handshaking disabled.
pub fn build_fetch_graph(cfg: &SpecServerConfig) -> Arc<Translator> {
    let transport_prefix = cfg.transport.split(':').next().unwrap_or("tcp");
    let client_opts = Dict::new();
    client_opts.set("remote-host", cfg.host.clone());
    client_opts.set("remote-port", cfg.port.to_string());
    client_opts.set("transport-type", format!("{}/client", transport_prefix));
    client_opts.set("remote-subvolume", "brick");
    client_opts.set("disable-handshake", "on");

    let client = Translator::new("trans", "protocol/client", client_opts.clone(), Arc::new(ClientTranslator::new(&client_opts)));
    let top = Translator::new("top", "spec-fetch/top", Dict::new(), Arc::new(TopTranslator));
    top.add_child(client);
    top
}

/// Runs the fork/getspec/tempfile protocol of §4.5 end to end: forks,
/// builds the graph and issues getspec in the child, and on success rewinds
/// the returned temp file in the parent.
pub fn fetch_spec(cfg: &SpecServerConfig) -> FuseResult<std::fs::File> {
    let mut tmp = tempfile::tempfile().map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
    let tmp_fd = tmp.as_raw_fd();

    // Safety: the child immediately performs only async-signal-safe-ish
    // work (network I/O via std, then an explicit exit) and never returns
    // into the parent's Rust call stack.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let code = run_fetch_child(cfg, tmp_fd);
            std::process::exit(match code {
                ExitCode::SUCCESS => 0,
                _ => 1,
            });
        }
        Ok(ForkResult::Parent { child }) => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => {
                tmp.seek(SeekFrom::Start(0)).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
                Ok(tmp)
            }
            Ok(_) | Err(_) => Err(PosixError::new(libc::EIO, "spec-fetch child did not exit cleanly")),
        },
        Err(e) => Err(PosixError::new(libc::EAGAIN, format!("fork failed: {e}"))),
    }
}

fn run_fetch_child(cfg: &SpecServerConfig, tmp_fd: std::os::unix::io::RawFd) -> ExitCode {
    let top = build_fetch_graph(cfg);
    let ctx = Context::new(vec![], None);
    for node in [top.children()[0].clone(), top.clone()] {
        if let Err(e) = node.impl_.init(&node, &ctx) {
            log::error!("spec-fetch child init failed: {e}");
            return ExitCode::FAILURE;
        }
    }

    let pool = crate::frame::FramePool::new();
    let root = crate::frame::FrameRoot::new(0, 0, 0, 1);
    let frame = pool.new_root(top.clone(), root);
    match top.getspec(&frame, &Dict::new()) {
        Ok(payload) => {
            // Write via the raw fd directly rather than reconstructing an
            // owning `File`, since the fd is owned by the parent's `tmp`
            // (inherited, not duplicated, across this `fork()`).
            let mut written = 0usize;
            while written < payload.len() {
                let n = unsafe {
                    libc::write(
                        tmp_fd,
                        payload[written..].as_ptr() as *const libc::c_void,
                        payload.len() - written,
                    )
                };
                if n < 0 {
                    return ExitCode::FAILURE;
                }
                written += n as usize;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("getspec failed: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn build_fetch_graph_sets_required_but_unused_subvolume_option() {
        let cfg = SpecServerConfig {
            host: "localhost".into(),
            port: 24007,
            transport: "tcp".into(),
        };
        let top = build_fetch_graph(&cfg);
        let client = top.children().into_iter().next().unwrap();
        assert_eq!(client.options.get_str("remote-subvolume").as_deref(), Some("brick"));
        assert_eq!(client.options.get_str("transport-type").as_deref(), Some("tcp/client"));
    }

    #[test]
    fn getspec_over_wire_reads_length_prefixed_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut op = [0u8; 1];
            stream.read_exact(&mut op).unwrap();
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).unwrap();
            stream.write_all(&0i32.to_be_bytes()).unwrap();
            let payload = b"volume leaf type storage/kv end-volume";
            stream.write_all(&(payload.len() as u32).to_be_bytes()).unwrap();
            stream.write_all(payload).unwrap();
        });

        let client = ClientTranslator {
            remote_host: "127.0.0.1".into(),
            remote_port: port,
        };
        let payload = client.getspec_over_wire().unwrap();
        assert_eq!(&payload, b"volume leaf type storage/kv end-volume");
        server.join().unwrap();
    }
}
