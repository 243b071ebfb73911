//! Line-oriented terminal front end over [`ChatController`].

use std::io::{self, Write};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::commands::{ChatController, SendOutcome, Snapshot};
use crate::notify::{LogSink, ToggleSink};
use crate::store::models::Role;

const HELP: &str = "\
commands:
  /new            start a new conversation
  /list           list conversations
  /select <n>     switch to conversation n
  /delete <n>     delete conversation n
  /search <text>  filter conversations by title or last message
  /clear          abort the reply and clear this conversation
  /retry          resend the last message
  /mute           toggle notifications
  /quit           exit
anything else is sent to the agent";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    New,
    List,
    Select(usize),
    Delete(usize),
    Search(String),
    Clear,
    Retry,
    Mute,
    Help,
    Quit,
    Send(String),
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let arg = arg.trim();
    let index = || arg.parse::<usize>().ok().filter(|n| *n > 0);
    match name {
        "new" => Command::New,
        "list" => Command::List,
        "select" => index().map_or_else(|| Command::Unknown(line.to_string()), Command::Select),
        "delete" => index().map_or_else(|| Command::Unknown(line.to_string()), Command::Delete),
        "search" => Command::Search(arg.to_string()),
        "clear" => Command::Clear,
        "retry" => Command::Retry,
        "mute" => Command::Mute,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Prints the growing tail of the trailing assistant message.
#[derive(Debug, Default)]
struct Renderer {
    conversation_id: Option<String>,
    index: usize,
    printed: String,
}

impl Renderer {
    fn render(&mut self, snapshot: &Snapshot, out: &mut impl Write) -> io::Result<()> {
        let Some(conv) = snapshot.active() else {
            return Ok(());
        };
        let Some(last) = conv.messages.last() else {
            return Ok(());
        };
        if last.role != Role::Assistant {
            return Ok(());
        }
        let index = conv.messages.len() - 1;
        let same_message =
            self.conversation_id.as_deref() == Some(conv.id.as_str()) && self.index == index;

        if same_message && last.content.starts_with(&self.printed) {
            write!(out, "{}", &last.content[self.printed.len()..])?;
        } else {
            write!(out, "\nagent> {}", last.content)?;
        }
        out.flush()?;

        self.conversation_id = Some(conv.id.clone());
        self.index = index;
        self.printed = last.content.clone();
        Ok(())
    }
}

fn spawn_renderer(mut updates: watch::Receiver<Snapshot>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = Renderer::default();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if let Err(e) = renderer.render(&snapshot, &mut io::stdout()) {
                tracing::warn!(error = %e, "failed to render reply");
                break;
            }
        }
    })
}

fn print_conversations(snapshot: &Snapshot, conversations: &[crate::store::models::Conversation]) {
    if conversations.is_empty() {
        println!("(no conversations)");
        return;
    }
    for (i, conv) in conversations.iter().enumerate() {
        let marker = if snapshot.active_conversation_id.as_deref() == Some(conv.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>2}. {} ({} messages) {}",
            marker,
            i + 1,
            conv.title,
            conv.message_count,
            conv.last_message.lines().next().unwrap_or_default()
        );
    }
}

fn report(outcome: Result<SendOutcome, crate::error::ChatError>) {
    match outcome {
        Ok(SendOutcome::Failed(kind)) => println!("\n[{}] {}", kind.kind_tag(), kind.user_message()),
        Ok(_) => println!(),
        Err(e) => println!("[{}] {}", e.kind_tag(), e),
    }
}

/// Read commands from stdin until EOF or `/quit`.
pub async fn run(controller: Arc<ChatController>, sink: Arc<ToggleSink<LogSink>>) -> io::Result<()> {
    println!("{}", HELP);
    run_with(controller, sink, BufReader::new(tokio::io::stdin())).await
}

/// Command loop over any line source. Sends run as background tasks so the
/// loop keeps reading: `/clear` or a new message can cut a reply short.
async fn run_with<R>(
    controller: Arc<ChatController>,
    sink: Arc<ToggleSink<LogSink>>,
    input: R,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let renderer = spawn_renderer(controller.subscribe());
    let mut lines = input.lines();
    let mut sends = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        while sends.try_join_next().is_some() {}
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Command::New => {
                controller.create_new_conversation();
                println!("started a new conversation");
            }
            Command::List => {
                let snapshot = controller.snapshot();
                print_conversations(&snapshot, &snapshot.conversations);
            }
            Command::Select(n) => match controller.store().list().get(n - 1) {
                Some(conv) => {
                    controller.select_conversation(&conv.id);
                    println!("switched to \"{}\"", conv.title);
                }
                None => println!("no conversation {}", n),
            },
            Command::Delete(n) => match controller.store().list().get(n - 1) {
                Some(conv) => {
                    controller.delete_conversation(&conv.id);
                    println!("deleted \"{}\"", conv.title);
                }
                None => println!("no conversation {}", n),
            },
            Command::Search(query) => {
                let snapshot = controller.snapshot();
                print_conversations(&snapshot, &controller.store().search(&query));
            }
            Command::Clear => {
                controller.clear_chat();
                println!("conversation cleared");
            }
            Command::Retry => {
                let controller = controller.clone();
                sends.spawn(async move {
                    match controller.retry_last_message().await {
                        Some(outcome) => report(outcome),
                        None => println!("nothing to retry"),
                    }
                });
            }
            Command::Mute => {
                let enabled = sink.toggle();
                println!("notifications {}", if enabled { "on" } else { "off" });
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Send(text) => {
                let controller = controller.clone();
                sends.spawn(async move { report(controller.send_message(&text).await) });
            }
            Command::Unknown(line) => println!("unknown command: {} (try /help)", line),
        }
    }

    sends.shutdown().await;
    renderer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SessionState;
    use crate::config::ChatConfig;
    use crate::store::models::{Conversation, Message};
    use axum::body::{Body, Bytes};
    use axum::routing::post;
    use axum::Router;
    use futures::StreamExt;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    const PATH: &str = "/api/agents/weatherAgent/stream";

    /// First call streams "Partial" and then stalls; later calls answer "Done".
    async fn serve_slow_then_fast() -> String {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new().route(
            PATH,
            post(move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        let head = futures::stream::iter([Ok::<_, Infallible>(
                            Bytes::from_static(b"0:\"Partial\"\n"),
                        )]);
                        let tail = futures::stream::once(async {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            Ok::<_, Infallible>(Bytes::from_static(b"0:\"late\"\n"))
                        });
                        Body::from_stream(head.chain(tail))
                    } else {
                        Body::from("0:\"Done\"\n")
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}{}", addr, PATH)
    }

    async fn start_repl() -> (
        Arc<ChatController>,
        DuplexStream,
        tokio::task::JoinHandle<io::Result<()>>,
    ) {
        let config = ChatConfig {
            endpoint: serve_slow_then_fast().await,
            ..ChatConfig::default()
        };
        let sink = Arc::new(ToggleSink::new(LogSink, true));
        let controller = Arc::new(ChatController::new(&config, sink.clone()));
        let (input, reader) = tokio::io::duplex(1024);
        let repl = tokio::spawn(run_with(controller.clone(), sink, BufReader::new(reader)));
        (controller, input, repl)
    }

    async fn wait_for(controller: &ChatController, pred: impl Fn(&Snapshot) -> bool) {
        let mut updates = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(&updates.borrow_and_update()) {
                    return;
                }
                updates.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for snapshot");
    }

    fn contents(snapshot: &Snapshot) -> Vec<String> {
        snapshot.messages().iter().map(|m| m.content.clone()).collect()
    }

    #[tokio::test]
    async fn test_clear_reaches_streaming_reply() {
        let (controller, mut input, repl) = start_repl().await;

        input.write_all(b"Hail in Bern?\n").await.unwrap();
        wait_for(&controller, |s| contents(s).last().map(String::as_str) == Some("Partial")).await;
        assert_eq!(controller.state(), SessionState::Streaming);

        input.write_all(b"/clear\n").await.unwrap();
        wait_for(&controller, |s| s.messages().is_empty() && s.state == SessionState::Idle).await;

        input.write_all(b"/quit\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), repl)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(controller.snapshot().messages().is_empty());
    }

    #[tokio::test]
    async fn test_new_message_preempts_streaming_reply() {
        let (controller, mut input, repl) = start_repl().await;

        input.write_all(b"first\n").await.unwrap();
        wait_for(&controller, |s| contents(s).last().map(String::as_str) == Some("Partial")).await;

        input.write_all(b"second\n").await.unwrap();
        wait_for(&controller, |s| {
            contents(s).last().map(String::as_str) == Some("Done") && s.state == SessionState::Idle
        })
        .await;

        input.write_all(b"/quit\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), repl)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            contents(&controller.snapshot()),
            vec!["first", "Partial", "second", "Done"]
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/new"), Command::New);
        assert_eq!(parse_command(" /select 2 "), Command::Select(2));
        assert_eq!(parse_command("/delete 0"), Command::Unknown("/delete 0".into()));
        assert_eq!(parse_command("/search  rain"), Command::Search("rain".into()));
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("Weather in Quito?"), Command::Send("Weather in Quito?".into()));
        assert_eq!(parse_command("/bogus"), Command::Unknown("/bogus".into()));
    }

    fn snapshot_with(messages: Vec<Message>) -> Snapshot {
        let conv = Conversation {
            id: "c1".into(),
            title: "t".into(),
            last_message: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
            message_count: messages.len(),
            messages,
            timestamp: chrono::Utc::now(),
        };
        Snapshot {
            conversations: vec![conv],
            active_conversation_id: Some("c1".into()),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_renderer_prints_only_new_suffix() {
        let mut renderer = Renderer::default();
        let mut out = Vec::new();
        let user = Message::user("hi");
        renderer
            .render(&snapshot_with(vec![user.clone(), Message::assistant("Hel")]), &mut out)
            .unwrap();
        renderer
            .render(&snapshot_with(vec![user, Message::assistant("Hello")]), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\nagent> Hello");
    }

    #[test]
    fn test_renderer_reprints_on_divergence() {
        let mut renderer = Renderer::default();
        let mut out = Vec::new();
        let user = Message::user("hi");
        renderer
            .render(&snapshot_with(vec![user.clone(), Message::assistant("abc")]), &mut out)
            .unwrap();
        renderer
            .render(&snapshot_with(vec![user, Message::assistant("xyz")]), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\nagent> abc\nagent> xyz");
    }

    #[test]
    fn test_renderer_skips_user_tail() {
        let mut renderer = Renderer::default();
        let mut out = Vec::new();
        renderer
            .render(&snapshot_with(vec![Message::user("hi")]), &mut out)
            .unwrap();
        assert!(out.is_empty());
    }
}
