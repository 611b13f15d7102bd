//! Minimal request/echo demo reinstating `original_source/example/*.c`
//! (SPEC_FULL §11): a `server` subcommand listens and echoes every parcel
//! it receives back on the same channel; a `client` subcommand mints its
//! own connect token (there is no HTTP token-distribution service in this
//! crate's scope), connects, sends one byte, and waits for the echo.

use clap::{Parser, Subcommand};
use relaycore::adapter::udp::UdpAdapter;
use relaycore::codec::token::USER_DATA_SIZE;
use relaycore::delivery::Mode;
use relaycore::{ConnectToken, Socket};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const ECHO_CHANNEL: usize = 0;
const PROTOCOL_ID: u64 = relaycore::config::DEFAULT_PROTOCOL_ID;
const DEMO_SERVER_KEY: [u8; relaycore::crypto::KEY_SIZE] = [0x42; relaycore::crypto::KEY_SIZE];

#[derive(Parser)]
#[command(name = "relaydemo", about = "Handshake-and-echo demo over relaycore")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for connections and echo every received parcel back.
    Server {
        #[arg(long, default_value = "127.0.0.1:8888")]
        bind: SocketAddr,
        #[arg(long, default_value_t = 16)]
        max_clients: usize,
    },
    /// Connect to a server, send one byte, wait for the echo, disconnect.
    Client {
        #[arg(long, default_value = "127.0.0.1:8888")]
        server: SocketAddr,
        #[arg(long, default_value = "127.0.0.1:0")]
        bind: SocketAddr,
        #[arg(long, default_value_t = 125)]
        client_id: i64,
    },
}

fn channel_modes() -> Vec<Mode> {
    vec![Mode::Reliable]
}

fn main() {
    let log = relaycore::logging::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Server { bind, max_clients } => run_server(bind, max_clients, &log),
        Command::Client { server, bind, client_id } => run_client(server, bind, client_id, &log),
    };
    if let Err(err) = result {
        slog::error!(log, "relaydemo exited with an error"; "error" => format!("{}", err));
        std::process::exit(1);
    }
}

fn run_server(bind: SocketAddr, max_clients: usize, log: &slog::Logger) -> relaycore::Result<()> {
    let adapter = UdpAdapter::bind(bind)?;
    let mut socket = Socket::create(Box::new(adapter), channel_modes());
    socket.listen(DEMO_SERVER_KEY, PROTOCOL_ID, max_clients, bind)?;
    slog::info!(log, "listening"; "addr" => %bind);

    let epoch = Instant::now();
    loop {
        let now_ms = epoch.elapsed().as_millis() as u64;
        for delivered in socket.poll(now_ms)? {
            slog::info!(log, "echoing parcel"; "bytes" => delivered.body.len());
            let reply = relaycore::Message::new();
            reply.write(&delivered.body)?;
            socket.send(delivered.channel_index, &reply, &[delivered.session], now_ms)?;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn run_client(server: SocketAddr, bind: SocketAddr, client_id: i64, log: &slog::Logger) -> relaycore::Result<()> {
    let now_ms = relaycore::platform::clock::now_ms();
    let (token, _private) = ConnectToken::generate(
        client_id,
        -1,
        vec![server],
        [0u8; USER_DATA_SIZE],
        PROTOCOL_ID,
        now_ms + 30_000,
        now_ms,
        &DEMO_SERVER_KEY,
    )?;
    let token_bytes = token.encode()?;

    let adapter = UdpAdapter::bind(bind)?;
    let mut socket = Socket::create(Box::new(adapter), channel_modes());

    let epoch = Instant::now();
    socket.connect(&token_bytes, epoch.elapsed().as_millis() as u64)?;
    slog::info!(log, "connecting"; "server" => %server);

    let message = relaycore::Message::new();
    message.write(&[12u8])?;
    let mut sent = false;

    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        let now_ms = epoch.elapsed().as_millis() as u64;
        let delivered = socket.poll(now_ms)?;

        match socket.connect_result() {
            Some(relaycore::ConnectResult::Denied) => return Err(relaycore::Error::ConnectDenied),
            Some(relaycore::ConnectResult::TimedOut) => return Err(relaycore::Error::ConnectTimedOut),
            _ => {}
        }

        if !sent {
            if let Some(session) = socket.client_session() {
                socket.send(ECHO_CHANNEL, &message, &[session], now_ms)?;
                sent = true;
                slog::info!(log, "sent one byte, awaiting echo");
            }
        }

        for parcel in delivered {
            slog::info!(log, "received echo"; "bytes" => format!("{:?}", parcel.body));
            if let Some(session) = socket.client_session() {
                socket.disconnect_session(session);
            }
            socket.poll(now_ms)?;
            return Ok(());
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    Err(relaycore::Error::ConnectTimedOut)
}
