//! Interactive terminal client.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use chrono::DateTime;
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use hiroba_server::infrastructure::dto::websocket::MessageDto;

use crate::{
    command::{Command, HELP},
    config::ClientConfig,
    error::ClientError,
    history::HttpHistoryClient,
    notifier::TerminalNotifier,
    session::{ChatSession, Incoming, SessionUpdate},
    transport::{self, ReconnectPolicy, TransportEvent, websocket_url},
};

/// How often unacknowledged sends are checked
const PENDING_SWEEP: Duration = Duration::from_secs(1);

pub async fn run(config: ClientConfig) -> Result<(), ClientError> {
    let history = Arc::new(HttpHistoryClient::new(&config.url, config.token.clone())?);
    let identity = match history.fetch_me().await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Failed to resolve identity: {}", e);
            None
        }
    };
    match &identity {
        Some(user) => println!("Signed in as {} ({})", user.name, user.id),
        None => println!("Not signed in; messages can be read but not sent"),
    }

    let url = websocket_url(&config.url, config.token.as_deref())?;
    let (outgoing, mut events) = transport::spawn(url, ReconnectPolicy::default());

    let mut session = ChatSession::new(
        history,
        Box::new(outgoing),
        Box::new(TerminalNotifier),
        config.notify,
    );
    session.set_identity(identity);
    open_room(&mut session, &config.room).await;

    let mut input = spawn_input();
    let mut sweep = tokio::time::interval(PENDING_SWEEP);
    let mut reconnecting = false;

    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else { break };
                if handle_line(&mut session, &line).await.is_break() {
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                handle_transport(&mut session, event, &mut reconnecting).await;
            }
            _ = sweep.tick() => {
                for request_id in session.expire_pending(config.ack_timeout) {
                    println!("! message {} was not acknowledged", short_id(&request_id));
                }
            }
        }
    }

    Ok(())
}

/// Read lines on a dedicated thread; the channel closes on EOF or Ctrl-C.
fn spawn_input() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let result = (|| -> Result<(), ClientError> {
            let mut editor = DefaultEditor::new()?;
            loop {
                match editor.readline("> ") {
                    Ok(line) => {
                        let _ = editor.add_history_entry(line.as_str());
                        if tx.send(line).is_err() {
                            return Ok(());
                        }
                    }
                    Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
                    Err(e) => return Err(e.into()),
                }
            }
        })();
        if let Err(e) = result {
            tracing::error!("Input loop failed: {}", e);
        }
    });
    rx
}

async fn handle_line(session: &mut ChatSession, line: &str) -> ControlFlow<()> {
    match Command::parse(line) {
        Command::Join(room) => open_room(session, &room).await,
        Command::Direct(peer) => match session.select_direct(&peer).await {
            Ok(timeline) => {
                println!("--- @{peer} ---");
                timeline.iter().for_each(render);
            }
            Err(e) => println!("! {e}"),
        },
        Command::Unread => {
            if session.unread().is_empty() {
                println!("no unread messages");
            }
            for (conversation, count) in session.unread() {
                println!("{conversation}: {count}");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return ControlFlow::Break(()),
        Command::Say(text) => {
            if let Err(e) = session.send_message(&text) {
                println!("! {e}");
            }
        }
        Command::Empty => {}
        Command::Invalid(line) => println!("! unknown command '{line}'; try /help"),
    }
    ControlFlow::Continue(())
}

async fn open_room(session: &mut ChatSession, room: &str) {
    match session.select_room(room).await {
        Ok(timeline) => {
            println!("--- #{room} ---");
            timeline.iter().for_each(render);
        }
        Err(e) => println!("! {e}"),
    }
}

async fn handle_transport(
    session: &mut ChatSession,
    event: TransportEvent,
    reconnecting: &mut bool,
) {
    let event = match event {
        TransportEvent::Server(event) => event,
        TransportEvent::Disconnected { reason } => {
            session.on_disconnected();
            *reconnecting = true;
            println!("! disconnected ({reason}); reconnecting");
            return;
        }
    };

    match session.handle_event(event) {
        SessionUpdate::Connected => {
            tracing::info!("Session online");
            if std::mem::take(reconnecting) {
                resync(session).await;
            }
        }
        SessionUpdate::Joined { room, left } => {
            tracing::debug!("Joined '{}' (left {:?})", room, left);
        }
        SessionUpdate::Registered { user_id } => tracing::debug!("Registered '{}'", user_id),
        SessionUpdate::Message { message, outcome } => match outcome {
            Incoming::Rendered => render(&message),
            Incoming::Unread {
                conversation,
                count,
            } => println!("* {conversation} ({count} unread)"),
            Incoming::Duplicate | Incoming::Dropped => {}
        },
        SessionUpdate::Acked { .. } => {}
        SessionUpdate::Failed {
            request_id, reason, ..
        } => match request_id {
            Some(id) => println!("! message {} failed: {reason}", short_id(&id)),
            None => println!("! {reason}"),
        },
    }
}

/// Redraw the active conversation with whatever was missed while offline.
async fn resync(session: &mut ChatSession) {
    let title = session.conversation().map(ToString::to_string);
    match session.resync().await {
        Ok(Some(timeline)) => {
            if let Some(title) = title {
                println!("--- {title} (reconnected) ---");
            }
            timeline.iter().for_each(render);
        }
        Ok(None) => {}
        Err(e) => println!("! {e}"),
    }
}

fn render(message: &MessageDto) {
    let time = DateTime::parse_from_rfc3339(&message.created_at)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    println!("[{time}] {}: {}", message.sender.name, message.content);
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
