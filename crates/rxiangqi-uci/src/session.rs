//! エンジンセッション（プロセス監視 + UCI 状態機械）
//!
//! `EngineSession::spawn` は現在の tokio ランタイム上に監視タスクを 1 本立てる。
//! 監視タスクはエンジンの stdin と行バッファを専有し、プロセスごとの駆動タスクが
//! `Child` と stdout を持つ。駆動タスクは stdout のチャンクと終了ステータスを
//! 同じ内部チャネルに流すため、終了前に読めた行は必ず `Crashed` / `Quit` より先に
//! 処理される。
//!
//! 状態遷移: `Stopped → Starting → Ready ⇄ Busy`、終了・クラッシュで `Stopped`。
//! 予期しない終了の後は `restart_delay` 後に自動で再起動する（`quit` 後は除く）。

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::line_buffer::LineBuffer;
use crate::protocol::{parse_line, BestMove, EngineInfo, EngineMessage, GoLimit, UciCommand};

/// 既定のエンジンパス
pub const DEFAULT_ENGINE_PATH: &str = "engine/pikafish";
/// 予期しない終了から再起動までの待ち時間
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(3);
/// `quit` 送信後、強制終了するまでの猶予
pub const DEFAULT_QUIT_GRACE: Duration = Duration::from_millis(500);

/// プロセス終了後に stdout の残りを読み切るまでの上限
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 4096;

/// エンジンプロセス起動時の設定
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// 作業ディレクトリ（`None` なら呼び出し元と同じ）
    pub working_dir: Option<PathBuf>,
    pub restart_delay: Duration,
    pub quit_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ENGINE_PATH),
            args: Vec::new(),
            working_dir: None,
            restart_delay: DEFAULT_RESTART_DELAY,
            quit_grace: DEFAULT_QUIT_GRACE,
        }
    }
}

/// 探索要求に付ける番号。古い `bestmove` を見分けるのに使う
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// プロセスなし
    Stopped,
    /// 起動済み、`uciok` 待ち
    Starting,
    /// 待機中
    Ready,
    /// 探索中（`bestmove` 待ち）
    Busy,
}

/// セッションから通知されるイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// `uciok` を受信した
    Ready { pid: u32 },
    ReadyOk,
    Info(EngineInfo),
    /// `request` は `go` に付けた番号（番号なしで送った `go` なら `None`）
    BestMove { request: Option<RequestId>, best: BestMove, ponder: Option<String> },
    /// 予期しない終了。`restart_delay` 後に再起動する
    Crashed { code: Option<i32> },
    /// `quit` による終了が完了した
    Quit,
    /// 起動失敗など。自動再試行はしない
    Error { message: String },
}

/// ハンドル操作のエラー
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("engine session is closed")]
    Closed,
    #[error("failed to spawn engine at {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine process has no {0} pipe")]
    MissingPipe(&'static str),
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

enum Control {
    Start,
    Send(UciCommand),
    Go { request: RequestId, limit: GoLimit },
    Quit,
    Shutdown,
}

/// 駆動タスク → 監視タスク
enum ProcessSignal {
    Chunk { generation: u64, bytes: Vec<u8> },
    Exited { generation: u64, code: Option<i32> },
}

/// セッションへの操作ハンドル。複製して複数箇所から使える
#[derive(Clone)]
pub struct EngineHandle {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<SessionState>,
}

impl EngineHandle {
    fn request(&self, msg: Control) -> Result<(), SessionError> {
        self.control.send(msg).map_err(|_| SessionError::Closed)
    }

    /// エンジンを起動する。起動済みなら何もしない
    pub fn start(&self) -> Result<(), SessionError> {
        self.request(Control::Start)
    }

    /// コマンドを 1 行送る。プロセスがなければ捨てられる
    pub fn send(&self, cmd: UciCommand) -> Result<(), SessionError> {
        self.request(Control::Send(cmd))
    }

    /// 番号付きで探索を開始する
    pub fn go(&self, request: RequestId, limit: GoLimit) -> Result<(), SessionError> {
        self.request(Control::Go { request, limit })
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(UciCommand::Stop)
    }

    /// `quit` を送り、猶予内に終了しなければ強制終了する。自動再起動はしない
    pub fn quit(&self) -> Result<(), SessionError> {
        self.request(Control::Quit)
    }

    /// `quit` した上で監視タスクを終える
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.request(Control::Shutdown)
    }

    /// 現在の状態
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// 状態変化の購読
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

struct LiveProcess {
    generation: u64,
    pid: u32,
    stdin: ChildStdin,
    kill: Option<oneshot::Sender<()>>,
}

/// 監視タスク本体
pub struct EngineSession {
    config: SessionConfig,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: watch::Sender<SessionState>,
    signals_tx: mpsc::UnboundedSender<ProcessSignal>,
    live: Option<LiveProcess>,
    generation: u64,
    lines: LineBuffer,
    /// 送った `go` のうち `bestmove` が返っていないもの（送信順）
    outstanding: VecDeque<Option<RequestId>>,
    restart_at: Option<Instant>,
    quit_deadline: Option<Instant>,
    /// `quit` による終了中または終了済み
    quitting: bool,
    shutting_down: bool,
}

impl EngineSession {
    /// 監視タスクを起動し、操作ハンドルとイベント受信側を返す
    ///
    /// tokio ランタイム上で呼ぶこと。エンジンは `start()` まで起動しない。
    pub fn spawn(config: SessionConfig) -> (EngineHandle, EventReceiver) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Stopped);

        let session = EngineSession {
            config,
            events: events_tx,
            state: state_tx,
            signals_tx,
            live: None,
            generation: 0,
            lines: LineBuffer::new(),
            outstanding: VecDeque::new(),
            restart_at: None,
            quit_deadline: None,
            quitting: false,
            shutting_down: false,
        };
        tokio::spawn(session.run(control_rx, signals_rx));

        (EngineHandle { control: control_tx, state: state_rx }, events_rx)
    }

    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
    ) {
        loop {
            tokio::select! {
                msg = control.recv(), if !self.shutting_down => match msg {
                    Some(msg) => self.handle_control(msg).await,
                    // ハンドルがすべて破棄された
                    None => {
                        self.shutting_down = true;
                        self.quit().await;
                    }
                },
                Some(signal) = signals.recv() => self.handle_signal(signal),
                _ = wait_until(self.restart_at) => {
                    self.restart_at = None;
                    info!("restarting engine after crash");
                    self.start().await;
                }
                _ = wait_until(self.quit_deadline) => {
                    self.quit_deadline = None;
                    self.kill_live();
                }
            }
            if self.shutting_down && self.live.is_none() {
                break;
            }
        }
        debug!("engine session supervisor finished");
    }

    async fn handle_control(&mut self, msg: Control) {
        match msg {
            Control::Start => self.start().await,
            Control::Send(UciCommand::Go(limit)) => self.go(None, limit).await,
            Control::Send(cmd) => self.write(&cmd).await,
            Control::Go { request, limit } => self.go(Some(request), limit).await,
            Control::Quit => self.quit().await,
            Control::Shutdown => {
                self.shutting_down = true;
                self.quit().await;
            }
        }
    }

    async fn start(&mut self) {
        self.restart_at = None;
        if self.live.is_some() {
            debug!("start ignored: engine already running");
            return;
        }
        self.quitting = false;
        self.set_state(SessionState::Starting);
        match self.spawn_process() {
            Ok(live) => {
                info!("engine started: {} (pid {})", self.config.path.display(), live.pid);
                self.live = Some(live);
                self.lines.clear();
                self.outstanding.clear();
                self.write(&UciCommand::Uci).await;
            }
            Err(e) => {
                error!("{e}");
                self.set_state(SessionState::Stopped);
                self.emit(EngineEvent::Error { message: e.to_string() });
            }
        }
    }

    fn spawn_process(&mut self) -> Result<LiveProcess, SessionError> {
        let mut cmd = Command::new(&self.config.path);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd
            .spawn()
            .map_err(|source| SessionError::Spawn { path: self.config.path.clone(), source })?;
        let stdin = child.stdin.take().ok_or(SessionError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(SessionError::MissingPipe("stdout"))?;
        let pid = child.id().unwrap_or_default();

        self.generation += 1;
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(drive_process(
            self.generation,
            child,
            stdout,
            kill_rx,
            self.signals_tx.clone(),
        ));

        Ok(LiveProcess { generation: self.generation, pid, stdin, kill: Some(kill_tx) })
    }

    async fn go(&mut self, request: Option<RequestId>, limit: GoLimit) {
        if self.live.is_none() {
            debug!("go dropped: engine not running");
            return;
        }
        self.outstanding.push_back(request);
        self.set_state(SessionState::Busy);
        self.write(&UciCommand::Go(limit)).await;
    }

    async fn quit(&mut self) {
        self.restart_at = None;
        self.quitting = true;
        if self.live.is_none() {
            self.set_state(SessionState::Stopped);
            self.emit(EngineEvent::Quit);
            return;
        }
        if self.quit_deadline.is_some() {
            return;
        }
        self.write(&UciCommand::Quit).await;
        self.quit_deadline = Some(Instant::now() + self.config.quit_grace);
    }

    fn kill_live(&mut self) {
        if let Some(kill) = self.live.as_mut().and_then(|p| p.kill.take()) {
            warn!("engine did not exit within {:?}; killing", self.config.quit_grace);
            let _ = kill.send(());
        }
    }

    async fn write(&mut self, cmd: &UciCommand) {
        let Some(live) = self.live.as_mut() else {
            debug!("engine not running, dropped: {cmd}");
            return;
        };
        debug!("> {cmd}");
        let line = format!("{cmd}\n");
        let result = async {
            live.stdin.write_all(line.as_bytes()).await?;
            live.stdin.flush().await
        }
        .await;
        if let Err(e) = result {
            // 書き込み失敗はプロセス終了の前兆。終了は駆動タスクが通知する
            warn!("failed to write to engine: {e}");
        }
    }

    fn handle_signal(&mut self, signal: ProcessSignal) {
        match signal {
            ProcessSignal::Chunk { generation, bytes } => {
                if !self.is_current(generation) {
                    trace!("dropping output of stale engine generation {generation}");
                    return;
                }
                for line in self.lines.push(&bytes) {
                    self.dispatch_line(&line);
                }
            }
            ProcessSignal::Exited { generation, code } => {
                if !self.is_current(generation) {
                    return;
                }
                if let Some(line) = self.lines.flush() {
                    self.dispatch_line(&line);
                }
                self.live = None;
                self.quit_deadline = None;
                self.outstanding.clear();
                self.set_state(SessionState::Stopped);

                if self.quitting {
                    info!("engine exited");
                    self.emit(EngineEvent::Quit);
                } else {
                    warn!(
                        "engine exited unexpectedly (code {code:?}); restarting in {:?}",
                        self.config.restart_delay
                    );
                    self.emit(EngineEvent::Crashed { code });
                    self.restart_at = Some(Instant::now() + self.config.restart_delay);
                }
            }
        }
    }

    fn dispatch_line(&mut self, line: &str) {
        trace!("< {line}");
        match parse_line(line) {
            Some(EngineMessage::UciOk) => {
                let Some(pid) = self.live.as_ref().map(|p| p.pid) else {
                    return;
                };
                if *self.state.borrow() == SessionState::Starting {
                    self.set_state(SessionState::Ready);
                }
                self.emit(EngineEvent::Ready { pid });
            }
            Some(EngineMessage::ReadyOk) => self.emit(EngineEvent::ReadyOk),
            Some(EngineMessage::Info(info)) => self.emit(EngineEvent::Info(info)),
            Some(EngineMessage::BestMove { best, ponder }) => {
                let request = self.outstanding.pop_front().flatten();
                if self.outstanding.is_empty() && *self.state.borrow() == SessionState::Busy {
                    self.set_state(SessionState::Ready);
                }
                self.emit(EngineEvent::BestMove { request, best, ponder });
            }
            None => {}
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.live.as_ref().is_some_and(|p| p.generation == generation)
    }

    fn set_state(&self, state: SessionState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            debug!("engine session: {prev:?} -> {state:?}");
        }
    }

    fn emit(&self, event: EngineEvent) {
        // 受信側が破棄されていても監視は続ける
        let _ = self.events.send(event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// プロセス 1 本分の駆動タスク
///
/// stdout のチャンクを順に転送し、終了後は残りを読み切ってから終了ステータスを送る。
async fn drive_process(
    generation: u64,
    mut child: Child,
    mut stdout: ChildStdout,
    mut kill: oneshot::Receiver<()>,
    signals: mpsc::UnboundedSender<ProcessSignal>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut stdout_open = true;
    let mut kill_armed = true;

    let status = loop {
        tokio::select! {
            read = stdout.read(&mut buf), if stdout_open => match read {
                Ok(0) | Err(_) => stdout_open = false,
                Ok(n) => {
                    let _ = signals.send(ProcessSignal::Chunk { generation, bytes: buf[..n].to_vec() });
                }
            },
            status = child.wait() => break status,
            res = &mut kill, if kill_armed => {
                kill_armed = false;
                if res.is_ok() {
                    if let Err(e) = child.start_kill() {
                        warn!("failed to kill engine: {e}");
                    }
                }
            }
        }
    };

    while stdout_open {
        match tokio::time::timeout(DRAIN_TIMEOUT, stdout.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {
                let _ = signals.send(ProcessSignal::Chunk { generation, bytes: buf[..n].to_vec() });
            }
            _ => stdout_open = false,
        }
    }

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!("failed to wait for engine: {e}");
            None
        }
    };
    let _ = signals.send(ProcessSignal::Exited { generation, code });
}

/// 終了コード。シグナルで落ちた場合はシェルと同じく 128 + シグナル番号
#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;

    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    status.code()
}
