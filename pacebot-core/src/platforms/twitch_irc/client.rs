//! src/platforms/twitch_irc/client.rs
//!
//! Minimal Twitch IRC client over TLS: PASS/NICK/CAP handshake, automatic
//! PONG, JOIN/PART/PRIVMSG. One instance is one connection's lifetime;
//! anything longer-lived (retry on drop) belongs to the caller.

use std::io;

use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_native_tls::{native_tls, TlsConnector};
use tracing::{debug, error, info};

const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
const TWITCH_IRC_PORT: u16 = 6697;

/// One inbound PRIVMSG, stripped down to what the pipeline needs.
#[derive(Debug, Clone)]
pub struct ChatLine {
    /// Channel login, without the leading `#`.
    pub channel: String,
    /// Sender's display name when tagged, else their login.
    pub login: String,
    pub user_id: String,
    pub text: String,
}

/// Drops a leading `#` and lowercases, so membership keys stay canonical.
pub fn normalize_channel(raw: &str) -> String {
    raw.trim_start_matches('#').to_lowercase()
}

pub struct TwitchIrcClient {
    outgoing: mpsc::UnboundedSender<String>,
    /// Stored as an Option so the runtime can `take()` it.
    pub incoming: Option<mpsc::UnboundedReceiver<ChatLine>>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl TwitchIrcClient {
    /// Connects over TLS, sends PASS/NICK/CAP, and spawns the read/write
    /// task pair.
    pub async fn connect(login: &str, oauth_token: &str) -> io::Result<Self> {
        let tcp = TcpStream::connect((TWITCH_IRC_HOST, TWITCH_IRC_PORT)).await?;

        let connector = native_tls::TlsConnector::new()
            .map_err(|e| io::Error::other(format!("tls connector: {e}")))?;
        let tls = TlsConnector::from(connector)
            .connect(TWITCH_IRC_HOST, tcp)
            .await
            .map_err(|e| io::Error::other(format!("tls handshake: {e}")))?;

        let (read_half, write_half) = split(tls);
        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<ChatLine>();

        let write_task = tokio::spawn(writer_loop(write_half, rx_out));

        tx_out.send(format!("PASS {oauth_token}")).ok();
        tx_out.send(format!("NICK {login}")).ok();
        tx_out
            .send("CAP REQ :twitch.tv/commands twitch.tv/tags".to_string())
            .ok();

        let read_task = tokio::spawn(reader_loop(read_half, tx_in, tx_out.clone()));

        Ok(Self {
            outgoing: tx_out,
            incoming: Some(rx_in),
            read_task,
            write_task,
        })
    }

    pub fn join_channel(&self, channel: &str) {
        self.send_raw(&format!("JOIN #{}", normalize_channel(channel)));
    }

    pub fn part_channel(&self, channel: &str) {
        self.send_raw(&format!("PART #{}", normalize_channel(channel)));
    }

    pub fn send_privmsg(&self, channel: &str, text: &str) {
        self.send_raw(&format!("PRIVMSG #{} :{}", normalize_channel(channel), text));
    }

    fn send_raw(&self, line: &str) {
        let _ = self.outgoing.send(line.to_string());
    }

    /// Aborts the read/write tasks, dropping the connection.
    pub fn shutdown(self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}

async fn reader_loop<R>(
    read_half: R,
    tx_in: mpsc::UnboundedSender<ChatLine>,
    tx_out: mpsc::UnboundedSender<String>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();

    loop {
        buf.clear();
        match reader.read_line(&mut buf).await {
            Ok(0) => {
                info!("twitch irc: server closed the connection");
                break;
            }
            Ok(_) => {
                let line = buf.trim_end();
                if line.is_empty() {
                    continue;
                }
                if let Some(rest) = line.strip_prefix("PING") {
                    let _ = tx_out.send(format!("PONG{rest}"));
                    continue;
                }
                if let Some(chat) = parse_privmsg(line) {
                    if tx_in.send(chat).is_err() {
                        break;
                    }
                } else {
                    debug!("twitch irc <= {line}");
                }
            }
            Err(e) => {
                error!("twitch irc read error: {e}");
                break;
            }
        }
    }
    info!("twitch irc reader loop ended");
}

async fn writer_loop<W>(mut write_half: W, mut rx_out: mpsc::UnboundedReceiver<String>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(&mut write_half);

    while let Some(line) = rx_out.recv().await {
        if !line.starts_with("PASS") {
            debug!("twitch irc => {line}");
        }
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if writer.write_all(b"\r\n").await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
    info!("twitch irc writer loop ended");
}

/// Parses `@tags :login!user@host PRIVMSG #chan :text`; anything else is
/// `None` and gets logged at debug by the read loop.
fn parse_privmsg(line: &str) -> Option<ChatLine> {
    let mut rest = line;

    let mut tags = "";
    if let Some(stripped) = rest.strip_prefix('@') {
        let (t, r) = stripped.split_once(' ')?;
        tags = t;
        rest = r;
    }

    let mut login = String::new();
    if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, r) = stripped.split_once(' ')?;
        login = prefix.split('!').next().unwrap_or_default().to_string();
        rest = r;
    }

    let (command, r) = rest.split_once(' ')?;
    if !command.eq_ignore_ascii_case("PRIVMSG") {
        return None;
    }
    let (target, trailing) = r.split_once(" :")?;

    let user_id = tag_value(tags, "user-id").unwrap_or_default();
    if let Some(display) = tag_value(tags, "display-name") {
        if !display.is_empty() {
            login = display;
        }
    }

    Some(ChatLine {
        channel: normalize_channel(target.trim()),
        login,
        user_id,
        text: trailing.to_string(),
    })
}

fn tag_value(tags: &str, key: &str) -> Option<String> {
    tags.split(';').find_map(|kv| {
        let (k, v) = kv.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_tagged_privmsg() {
        let line = "@badge-info=;display-name=Runner;user-id=44317 :runner!runner@runner.tmi.twitch.tv PRIVMSG #speedchat :!help me";
        let chat = parse_privmsg(line).expect("should parse");
        assert_eq!(chat.channel, "speedchat");
        assert_eq!(chat.login, "Runner");
        assert_eq!(chat.user_id, "44317");
        assert_eq!(chat.text, "!help me");
    }

    #[test]
    fn parses_an_untagged_privmsg() {
        let line = ":runner!runner@runner.tmi.twitch.tv PRIVMSG #SpeedChat :hello";
        let chat = parse_privmsg(line).expect("should parse");
        assert_eq!(chat.channel, "speedchat");
        assert_eq!(chat.login, "runner");
        assert_eq!(chat.user_id, "");
        assert_eq!(chat.text, "hello");
    }

    #[test]
    fn non_privmsg_lines_are_skipped() {
        assert!(parse_privmsg(":tmi.twitch.tv 001 bot :Welcome").is_none());
        assert!(parse_privmsg(":runner!r@r.tmi.twitch.tv JOIN #speedchat").is_none());
    }

    #[test]
    fn normalizes_channel_names() {
        assert_eq!(normalize_channel("#SpeedChat"), "speedchat");
        assert_eq!(normalize_channel("speedchat"), "speedchat");
    }
}
