pub mod client_commands;
pub mod framing;
pub mod server_commands;

use std::{
    io::{self, ErrorKind, Read, Write},
    net::TcpStream,
    sync::mpsc,
    thread::JoinHandle,
    time::Duration,
};

use client_commands::ClientCommand;
use framing::FrameReader;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum NetworkCommand {
    Send(Vec<u8>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Status(String),
    /// One complete frame payload, without the length prefix.
    Frame(Vec<u8>),
    Error(String),
    Closed,
}

/// Owns the connection thread. Frames arrive as [`NetworkEvent`]s; commands
/// are queued and written by the same thread.
pub struct NetworkRuntime {
    command_tx: mpsc::Sender<NetworkCommand>,
    event_rx: mpsc::Receiver<NetworkEvent>,
    task: Option<JoinHandle<()>>,
}

impl NetworkRuntime {
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let addr = format!("{host}:{port}");
        log::info!("Connecting to {addr}");
        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        let (command_tx, command_rx) = mpsc::channel::<NetworkCommand>();
        let (event_tx, event_rx) = mpsc::channel::<NetworkEvent>();

        let task = std::thread::Builder::new()
            .name("cf-network".to_string())
            .spawn(move || run_connection(stream, command_rx, event_tx))?;

        Ok(Self {
            command_tx,
            event_rx,
            task: Some(task),
        })
    }

    pub fn send(&self, command: &ClientCommand) {
        log::trace!("Queueing {:?}", command.header());
        let _ = self.command_tx.send(NetworkCommand::Send(command.to_frame()));
    }

    pub fn try_recv(&self) -> Option<NetworkEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<NetworkEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(NetworkCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if task.join().is_err() {
                log::error!("network thread panicked");
            }
        }
    }
}

impl Drop for NetworkRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_connection(
    mut stream: TcpStream,
    command_rx: mpsc::Receiver<NetworkCommand>,
    event_tx: mpsc::Sender<NetworkEvent>,
) {
    log::debug!("Network thread started");
    let _ = event_tx.send(NetworkEvent::Status("Connected".to_string()));

    let mut reader = FrameReader::new();
    let mut buf = [0u8; 8192];

    loop {
        while let Ok(cmd) = command_rx.try_recv() {
            match cmd {
                NetworkCommand::Send(bytes) => {
                    if let Err(e) = stream.write_all(&bytes) {
                        let _ = event_tx.send(NetworkEvent::Error(format!("Send failed: {e}")));
                        return;
                    }
                }
                NetworkCommand::Shutdown => {
                    log::debug!("Network thread shutting down");
                    let _ = event_tx.send(NetworkEvent::Closed);
                    return;
                }
            }
        }

        match stream.read(&mut buf) {
            Ok(0) => {
                if reader.pending() > 0 {
                    log::warn!("Connection closed with {} bytes of a partial frame", reader.pending());
                }
                let _ = event_tx.send(NetworkEvent::Closed);
                return;
            }
            Ok(n) => {
                reader.push(&buf[..n]);
                while let Some(frame) = reader.next_frame() {
                    if event_tx.send(NetworkEvent::Frame(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = event_tx.send(NetworkEvent::Error(format!("Read failed: {e}")));
                return;
            }
        }
    }
}
