//! Dokku daemon client.
//!
//! The daemon speaks a line protocol over a Unix (or TCP) socket: the client writes one
//! command per line, e.g. `apps:create my-app`, and the daemon answers each with one JSON
//! line of the form `{"ok": true, "output": "..."}`.
//!
//! A single socket carries one exchange at a time, so [`DokkuConnection`] serializes
//! exchanges behind a mutex. Each exchange runs in its own task: a caller whose deadline passes
//! (or whose request is dropped) stops waiting, but the command and its reply still go through,
//! so the reply stream stays matched to the commands sent.
//!
//! The connection is marked broken only when the stream itself can no longer be trusted: the
//! socket fails or closes, a reply cannot be decoded, or the daemon does not answer within the
//! exchange timeout. Every later call then fails with [`PlatformError::ConnectionLost`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::{oneshot, Mutex},
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, info, instrument, warn};

use super::{Platform, PlatformAddress, PlatformConnector, PlatformError, PlatformHandle, Result};

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Header line `apps:list` prints before the app names
const APPS_LIST_HEADER: &str = "=====>";

/// One reply line from the daemon
#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    output: String,
}

/// Connects to a Dokku daemon
#[derive(Debug, Clone)]
pub struct DokkuConnector {
    address: PlatformAddress,
    connect_timeout: Duration,
    exchange_timeout: Duration,
}

impl DokkuConnector {
    /// `exchange_timeout` bounds a single command/reply round trip, independent of any caller's
    /// deadline. A daemon slower than that is treated as hung.
    pub fn new(address: PlatformAddress, connect_timeout: Duration, exchange_timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout,
            exchange_timeout,
        }
    }

    async fn open(&self) -> std::io::Result<(Box<dyn AsyncRead + Send + Unpin>, BoxedWriter)> {
        match &self.address {
            PlatformAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            #[cfg(unix)]
            PlatformAddress::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            #[cfg(not(unix))]
            PlatformAddress::Unix(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }
}

#[async_trait]
impl PlatformConnector for DokkuConnector {
    #[instrument(skip(self), fields(address = %self.address), err)]
    async fn connect(&self) -> Result<PlatformHandle> {
        let connect_error = |reason: String| PlatformError::Connect {
            address: self.address.to_string(),
            reason,
        };

        let (reader, writer) = timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| connect_error(format!("timed out after {}", humantime::format_duration(self.connect_timeout))))?
            .map_err(|e| connect_error(e.to_string()))?;

        let connection = DokkuConnection::new(reader, writer, self.exchange_timeout);

        // The daemon only proves it is usable by answering a command
        let version = connection
            .version(Instant::now() + self.connect_timeout)
            .await
            .map_err(|e| PlatformError::Handshake(e.to_string()))?;

        info!(%version, "Connected to platform");
        Ok(Arc::new(connection))
    }
}

struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
}

/// A live connection to a Dokku daemon
pub struct DokkuConnection {
    transport: Arc<Mutex<Transport>>,
    broken: Arc<AtomicBool>,
    exchange_timeout: Duration,
}

impl DokkuConnection {
    pub fn new<R, W>(reader: R, writer: W, exchange_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            transport: Arc::new(Mutex::new(Transport {
                reader: BufReader::new(reader),
                writer: Box::new(writer),
            })),
            broken: Arc::new(AtomicBool::new(false)),
            exchange_timeout,
        }
    }

    /// Send one command and wait, until `deadline`, for its reply.
    ///
    /// `ok: false` replies are returned as-is; callers decide whether that is an error. A
    /// [`PlatformError::Timeout`] means the caller stopped waiting, not that the command was
    /// dropped: it may still run.
    async fn exchange(&self, command: &str, deadline: Instant) -> Result<Reply> {
        if self.broken.load(Ordering::Acquire) {
            return Err(PlatformError::ConnectionLost);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::spawn(Self::run_exchange(
            self.transport.clone(),
            self.broken.clone(),
            self.exchange_timeout,
            command.to_string(),
            reply_tx,
        ));

        match timeout_at(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            // The exchange task went away without answering, e.g. during runtime shutdown
            Ok(Err(_)) => Err(PlatformError::ConnectionLost),
            Err(_) => {
                debug!(command, "Deadline passed, platform exchange continues in the background");
                Err(PlatformError::Timeout)
            }
        }
    }

    /// One exchange, run to completion whether or not anyone is still waiting for it
    async fn run_exchange(
        transport: Arc<Mutex<Transport>>,
        broken: Arc<AtomicBool>,
        exchange_timeout: Duration,
        command: String,
        reply_tx: oneshot::Sender<Result<Reply>>,
    ) {
        let mut transport = transport.lock().await;
        if broken.load(Ordering::Acquire) {
            let _ = reply_tx.send(Err(PlatformError::ConnectionLost));
            return;
        }

        // Marks the connection broken unless the exchange completes cleanly, including when
        // this task is dropped mid-exchange.
        let poison = scopeguard::guard(&*broken, |broken| {
            warn!(command = %command, "Platform stream out of step, marking connection broken");
            broken.store(true, Ordering::Release);
        });

        let result = match timeout(exchange_timeout, Self::write_and_read(&mut transport, &command)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command = %command, timeout = %humantime::format_duration(exchange_timeout), "Platform did not answer");
                Err(PlatformError::Timeout)
            }
        };

        if result.is_ok() {
            scopeguard::ScopeGuard::into_inner(poison);
        } else {
            drop(poison);
        }
        let _ = reply_tx.send(result);
    }

    async fn write_and_read(transport: &mut Transport, command: &str) -> Result<Reply> {
        debug!(command, "Sending platform command");

        let write = async {
            transport.writer.write_all(command.as_bytes()).await?;
            transport.writer.write_all(b"\n").await?;
            transport.writer.flush().await
        };
        write.await.map_err(|e| {
            warn!(error = %e, "Failed to write to platform");
            PlatformError::ConnectionLost
        })?;

        let mut line = String::new();
        let read = transport.reader.read_line(&mut line).await.map_err(|e| {
            warn!(error = %e, "Failed to read from platform");
            PlatformError::ConnectionLost
        })?;
        if read == 0 {
            warn!("Platform closed the connection");
            return Err(PlatformError::ConnectionLost);
        }

        serde_json::from_str(line.trim_end()).map_err(|e| PlatformError::Protocol(format!("{e}: {:?}", line.trim_end())))
    }

    /// Run a command, treating `ok: false` as [`PlatformError::CommandFailed`]
    async fn run(&self, command: &str, deadline: Instant) -> Result<String> {
        let reply = self.exchange(command, deadline).await?;
        if reply.ok {
            Ok(reply.output)
        } else {
            Err(PlatformError::CommandFailed {
                command: command.to_string(),
                output: reply.output.trim().to_string(),
            })
        }
    }
}

/// Build a command line, refusing arguments that would split into several words
fn command(verb: &str, args: &[&str]) -> Result<String> {
    let mut line = verb.to_string();
    for arg in args {
        if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(PlatformError::InvalidArgument(arg.to_string()));
        }
        line.push(' ');
        line.push_str(arg);
    }
    Ok(line)
}

#[async_trait]
impl Platform for DokkuConnection {
    async fn version(&self, deadline: Instant) -> Result<String> {
        Ok(self.run("version", deadline).await?.trim().to_string())
    }

    #[instrument(skip(self, deadline), err)]
    async fn create_app(&self, name: &str, deadline: Instant) -> Result<()> {
        self.run(&command("apps:create", &[name])?, deadline).await?;
        Ok(())
    }

    #[instrument(skip(self, deadline), err)]
    async fn destroy_app(&self, name: &str, deadline: Instant) -> Result<()> {
        self.run(&command("apps:destroy", &[name, "--force"])?, deadline).await?;
        Ok(())
    }

    async fn app_exists(&self, name: &str, deadline: Instant) -> Result<bool> {
        // apps:exists reports a missing app as a failed command
        let reply = self.exchange(&command("apps:exists", &[name])?, deadline).await?;
        Ok(reply.ok)
    }

    async fn list_apps(&self, deadline: Instant) -> Result<Vec<String>> {
        let output = self.run("apps:list", deadline).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(APPS_LIST_HEADER))
            .map(str::to_string)
            .collect())
    }

    fn is_connected(&self) -> bool {
        !self.broken.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
        task::JoinHandle,
    };

    /// How the fake daemon answers a command line
    #[derive(Clone, Copy)]
    enum Answer {
        Ok,
        Fail,
        Echo,
        /// Echo, but only after [`SLOW_REPLY`]
        Slow,
        Silent,
        Close,
        Garbage,
    }

    const SLOW_REPLY: Duration = Duration::from_millis(200);

    /// Accepts one connection and answers each command according to `script`, then keeps
    /// echoing once the script runs out.
    async fn spawn_daemon(script: Vec<Answer>) -> (PlatformAddress, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let mut received = Vec::new();
            let mut script = script.into_iter();

            while let Ok(Some(line)) = lines.next_line().await {
                received.push(line.clone());
                let reply = match script.next().unwrap_or(Answer::Echo) {
                    Answer::Ok => r#"{"ok":true,"output":"dokku version 0.30.0"}"#.to_string(),
                    Answer::Fail => r#"{"ok":false,"output":" !     App does not exist"}"#.to_string(),
                    Answer::Echo => serde_json::json!({ "ok": true, "output": line }).to_string(),
                    Answer::Slow => {
                        tokio::time::sleep(SLOW_REPLY).await;
                        serde_json::json!({ "ok": true, "output": line }).to_string()
                    }
                    Answer::Silent => {
                        // Never answer, but keep the socket open
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                    Answer::Close => break,
                    Answer::Garbage => "not json".to_string(),
                };
                writer.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            }
            received
        });

        (PlatformAddress::Tcp(addr.to_string()), handle)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    async fn connect(address: PlatformAddress) -> Result<PlatformHandle> {
        DokkuConnector::new(address, Duration::from_secs(5), Duration::from_secs(5))
            .connect()
            .await
    }

    #[tokio::test]
    async fn test_connect_runs_version_handshake() {
        let (address, daemon) = spawn_daemon(vec![Answer::Ok, Answer::Ok]).await;

        let platform = connect(address).await.unwrap();
        platform.create_app("my-app", deadline()).await.unwrap();
        assert!(platform.is_connected());

        drop(platform);
        let received = daemon.await.unwrap();
        assert_eq!(received, vec!["version".to_string(), "apps:create my-app".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_handshake_fails_connect() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Fail]).await;

        let err = connect(address).await.err().unwrap();
        assert!(matches!(err, PlatformError::Handshake(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(PlatformAddress::Tcp(addr.to_string())).await.err().unwrap();
        assert!(matches!(err, PlatformError::Connect { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_closed_connection_is_reported_on_every_later_call() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok, Answer::Close]).await;
        let platform = connect(address).await.unwrap();

        let first = platform.create_app("my-app", deadline()).await.unwrap_err();
        assert!(matches!(first, PlatformError::ConnectionLost), "got {first:?}");
        assert!(!platform.is_connected());

        let second = platform.list_apps(deadline()).await.unwrap_err();
        assert!(matches!(second, PlatformError::ConnectionLost), "got {second:?}");
    }

    #[tokio::test]
    async fn test_caller_timeout_keeps_connection_in_step() {
        let (address, daemon) = spawn_daemon(vec![Answer::Ok, Answer::Slow]).await;
        let platform = connect(address).await.unwrap();

        let err = platform
            .create_app("slow-app", Instant::now() + Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Timeout), "got {err:?}");
        assert!(platform.is_connected());

        // The next caller gets its own reply, not the late one
        assert_eq!(platform.version(deadline()).await.unwrap(), "version");
        assert!(platform.is_connected());

        drop(platform);
        let received = daemon.await.unwrap();
        assert_eq!(received, vec!["version", "apps:create slow-app", "version"]);
    }

    #[tokio::test]
    async fn test_dropped_call_keeps_connection_in_step() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok, Answer::Slow]).await;
        let platform = connect(address).await.unwrap();

        let call = {
            let platform = platform.clone();
            tokio::spawn(async move { platform.create_app("dropped", deadline()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        call.abort();
        let _ = call.await;

        assert!(platform.is_connected());
        assert_eq!(platform.version(deadline()).await.unwrap(), "version");
    }

    #[tokio::test]
    async fn test_hung_backend_breaks_connection() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok, Answer::Silent]).await;
        let platform = DokkuConnector::new(address, Duration::from_secs(5), Duration::from_millis(100))
            .connect()
            .await
            .unwrap();

        let err = platform.create_app("stuck", deadline()).await.unwrap_err();
        assert!(matches!(err, PlatformError::Timeout), "got {err:?}");
        assert!(!platform.is_connected());
        assert!(matches!(platform.version(deadline()).await, Err(PlatformError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_failed_command_keeps_connection_usable() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok, Answer::Fail, Answer::Ok]).await;
        let platform = connect(address).await.unwrap();

        let err = platform.destroy_app("missing", deadline()).await.unwrap_err();
        match err {
            PlatformError::CommandFailed { command, output } => {
                assert_eq!(command, "apps:destroy missing --force");
                assert_eq!(output, "!     App does not exist");
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert!(platform.is_connected());
        assert_eq!(platform.version(deadline()).await.unwrap(), "dokku version 0.30.0");
    }

    #[tokio::test]
    async fn test_garbage_reply_is_protocol_error_then_connection_lost() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok, Answer::Garbage]).await;
        let platform = connect(address).await.unwrap();

        let err = platform.version(deadline()).await.unwrap_err();
        assert!(matches!(err, PlatformError::Protocol(_)), "got {err:?}");
        assert!(matches!(platform.version(deadline()).await, Err(PlatformError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_app_exists_maps_failed_reply_to_false() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok, Answer::Ok, Answer::Fail]).await;
        let platform = connect(address).await.unwrap();

        assert!(platform.app_exists("present", deadline()).await.unwrap());
        assert!(!platform.app_exists("absent", deadline()).await.unwrap());
        assert!(platform.is_connected());
    }

    #[tokio::test]
    async fn test_list_apps_skips_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let output = if line == "apps:list" { "=====> My Apps\nalpha\nbeta\n" } else { "0.30.0" };
                let reply = serde_json::json!({ "ok": true, "output": output }).to_string();
                writer.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            }
        });

        let platform = connect(PlatformAddress::Tcp(addr.to_string())).await.unwrap();
        assert_eq!(platform.list_apps(deadline()).await.unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_get_their_own_replies() {
        let (address, _daemon) = spawn_daemon(vec![Answer::Ok]).await;
        let connection = connect(address).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..20 {
            let connection = connection.clone();
            tasks.spawn(async move {
                let name = format!("app-{i}");
                let exists = connection.app_exists(&name, deadline()).await.unwrap();
                (i, exists)
            });
        }

        let mut seen = Vec::new();
        while let Some(result) = tasks.join_next().await {
            let (i, exists) = result.unwrap();
            assert!(exists);
            seen.push(i);
        }
        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_command_rejects_multi_word_arguments() {
        assert_eq!(command("apps:create", &["my-app"]).unwrap(), "apps:create my-app");
        assert!(matches!(
            command("apps:create", &["my app"]),
            Err(PlatformError::InvalidArgument(_))
        ));
        assert!(matches!(
            command("apps:create", &["evil\napps:destroy"]),
            Err(PlatformError::InvalidArgument(_))
        ));
        assert!(matches!(command("apps:create", &[""]), Err(PlatformError::InvalidArgument(_))));
    }
}
