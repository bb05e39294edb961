//! Interactive two-person chat over TCP.
//!
//! ```text
//! tcp-chat <listen-addr> [display-name] [files-dir]
//!
//!   /connect <host:port>   dial a peer
//!   /accept | /reject      answer a connection request
//!   /send <path>           send a file
//!   /cancel                cancel the file in flight
//!   /disconnect            leave the conversation
//!   /quit                  stop and exit
//!   anything else          sent as a message
//! ```

use std::path::PathBuf;

use linkchat::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum Command {
    Connect(PeerAddress),
    Accept,
    Reject,
    Send(PathBuf),
    Cancel,
    Disconnect,
    Quit,
    Say(String),
}

fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    Some(match word {
        "/connect" if !rest.is_empty() => Command::Connect(rest.into()),
        "/accept" => Command::Accept,
        "/reject" => Command::Reject,
        "/send" if !rest.is_empty() => Command::Send(PathBuf::from(rest)),
        "/cancel" => Command::Cancel,
        "/disconnect" => Command::Disconnect,
        "/quit" => Command::Quit,
        _ => Command::Say(line.to_string()),
    })
}

fn kind_of(path: &std::path::Path) -> PayloadKind {
    let image = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png" | "gif" | "webp"));
    if image { PayloadKind::Image } else { PayloadKind::File }
}

async fn run_command(
    session: &Session<TcpTransport>,
    command: Command,
) -> Result<bool, LinkChatError> {
    match command {
        Command::Connect(peer) => session.connect(peer).await?,
        Command::Accept => session.accept_connection().await?,
        Command::Reject => session.reject_connection().await?,
        Command::Send(path) => {
            let kind = kind_of(&path);
            let file = session.send_file(&path, kind).await?;
            println!("* sending {} ({} bytes)", file.name, file.size);
        }
        Command::Cancel => {
            session.cancel_file_transfer().await?;
        }
        Command::Disconnect => session.disconnect().await,
        Command::Quit => return Ok(false),
        Command::Say(text) => {
            session.send_message(text).await?;
        }
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn show(event: &SessionEvent) {
    match event {
        SessionEvent::Connection(event) => match event {
            ConnectionEvent::Connecting(peer) => println!("* connecting to {peer}"),
            ConnectionEvent::Connected(peer) => println!("* channel open with {}", peer.address),
            ConnectionEvent::ConnectedIncoming(c) => {
                println!("* {} ({}) wants to chat: /accept or /reject", c.display_name, c.peer_address);
            }
            ConnectionEvent::ConnectedOutgoing(c) => println!("* chatting with {}", c.display_name),
            ConnectionEvent::Accepted => println!("* request accepted"),
            ConnectionEvent::Rejected => println!("* request rejected"),
            ConnectionEvent::Lost => println!("* connection lost"),
            ConnectionEvent::Withdrawn => println!("* request withdrawn"),
            ConnectionEvent::Failed => println!("* could not connect"),
            ConnectionEvent::Disconnected => println!("* peer left"),
            ConnectionEvent::Destroyed => println!("* stopped"),
        },
        SessionEvent::Message(event) => match event {
            MessageEvent::Received(m) => println!("< {}", m.preview()),
            MessageEvent::Sent(m) => println!("> {}", m.preview()),
            MessageEvent::Delivered(uid) => tracing::debug!(%uid, "delivered"),
            MessageEvent::NotDelivered(uid) => println!("* message {uid} not delivered"),
            MessageEvent::Seen(uid) => tracing::debug!(%uid, "seen"),
        },
        SessionEvent::File(event) => match event {
            FileEvent::SendingStarted(_) | FileEvent::ReceivingStarted(_) => {}
            FileEvent::SendingProgress { sent: done, size, .. }
            | FileEvent::ReceivingProgress { received: done, size, .. } => {
                tracing::debug!(done, size, "file progress");
            }
            FileEvent::SendingFinished(f) => println!("* sent {}", f.name),
            FileEvent::ReceivingFinished(f) => println!("* received {}", f.local_path.display()),
            FileEvent::SendingFailed { file, reason } | FileEvent::ReceivingFailed { file, reason } => {
                println!("* {} failed: {reason}", file.name);
            }
            FileEvent::Canceled { file, by_partner } => {
                let who = if *by_partner { "peer" } else { "you" };
                println!("* {} canceled by {who}", file.name);
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), LinkChatError> {
    linkchat::init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(listen_addr) = args.next() else {
        eprintln!("usage: tcp-chat <listen-addr> [display-name] [files-dir]");
        std::process::exit(2);
    };
    let name = args.next().unwrap_or_else(|| "linkchat".to_string());
    let files = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("tcp-chat"));

    let session = LinkChat::builder()
        .display_name(name)
        .files_directory(files)
        .build(TcpTransport::new(listen_addr.clone()));

    let (tx, mut events) = mpsc::unbounded_channel();
    session.subscribe_connection(tx.clone());
    session.subscribe_messages(tx.clone());
    session.subscribe_files(tx);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            show(&event);
        }
    });

    session.start().await;
    println!("* listening on {listen_addr}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(command) = parse(&line) else {
            continue;
        };
        match run_command(&session, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("! {e}"),
        }
    }

    session.stop().await;
    Ok(())
}
