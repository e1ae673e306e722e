use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rxiangqi_assist::command::HELP;
use rxiangqi_assist::{
    parse_command, AiSide, AssistConfig, BoardRecognizer, Command, ControllerEvent, GameController,
    GameError, RecognizeError, TextRecognizer,
};
use rxiangqi_core::{validate_position, Position};
use rxiangqi_uci::{EngineHandle, EngineSession, EventReceiver};
use tokio::sync::mpsc;

/// ウォッチドッグの確認間隔
const WATCHDOG_TICK: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about = "Xiangqi assistant backed by a UCI engine")]
struct Cli {
    /// 設定ファイル（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// エンジン実行ファイル
    #[arg(long)]
    engine: Option<PathBuf>,

    /// NNUE 重みファイル
    #[arg(long)]
    weights: Option<PathBuf>,

    /// AI の担当（red / black / none）
    #[arg(long)]
    ai_side: Option<AiSide>,

    /// AI の思考時間（ミリ秒）
    #[arg(long)]
    movetime: Option<u64>,

    /// 開始局面
    #[arg(long)]
    fen: Option<String>,

    /// エンジンを起動せず、ルールチェックのみで指す
    #[arg(long, default_value_t = false)]
    no_engine: bool,
}

impl Cli {
    fn load_config(&self) -> Result<AssistConfig> {
        let mut config = match &self.config {
            Some(path) => AssistConfig::load(path)?,
            None => AssistConfig::default(),
        };
        if let Some(engine) = &self.engine {
            config.engine.path = engine.clone();
        }
        if let Some(weights) = &self.weights {
            config.engine.weights = weights.clone();
        }
        if let Some(side) = self.ai_side {
            config.game.ai_side = side;
        }
        if let Some(ms) = self.movetime {
            if ms == 0 {
                bail!("--movetime must be >= 1");
            }
            config.game.movetime_ms = ms;
        }
        Ok(config)
    }

    fn start_position(&self) -> Result<Position> {
        let Some(fen) = &self.fen else {
            return Ok(Position::startpos());
        };
        let position = Position::from_fen(fen).with_context(|| format!("invalid --fen '{fen}'"))?;
        validate_position(&position).map_err(|v| anyhow!("invalid --fen '{fen}': {v}"))?;
        Ok(position)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let mut config = cli.load_config()?;
    let start = cli.start_position()?;

    let use_engine = !cli.no_engine;
    if !use_engine {
        config.game.ai_side = AiSide::None;
    }
    if use_engine && !config.engine.weights.is_file() {
        bail!(
            "network weights not found at {} (use --weights or --no-engine)",
            config.engine.weights.display()
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(config, start, use_engine))
}

async fn run(config: AssistConfig, start: Position, use_engine: bool) -> Result<()> {
    let (handle, mut events) = EngineSession::spawn(config.engine.session_config());
    let mut controller = GameController::new(handle.clone(), config.game.settings(), start)
        .with_setup_commands(config.engine.setup_commands());
    let recognizer = TextRecognizer;

    if use_engine {
        handle.start().context("engine session closed before start")?;
    } else {
        println!("engine disabled; moves are checked by the rules engine only");
    }
    print_board(&controller);
    println!("type 'help' for commands");

    let mut input = spawn_stdin_reader();
    let mut watchdog = tokio::time::interval(WATCHDOG_TICK);

    loop {
        tokio::select! {
            line = input.recv() => {
                // EOF
                let Some(line) = line else { break };
                if execute(&mut controller, &recognizer, &line)? == Flow::Quit {
                    break;
                }
            }
            Some(event) = events.recv() => {
                let now = Instant::now();
                for ev in controller.handle_event(event, now) {
                    report(&controller, ev);
                }
            }
            _ = watchdog.tick() => {
                if let Some(ev) = controller.check_watchdog(Instant::now()) {
                    report(&controller, ev);
                }
            }
        }
    }

    shutdown(&handle, &mut events, config.engine.session_config().quit_grace).await;
    Ok(())
}

/// 標準入力を別スレッドで読み、行をチャネルに流す
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("failed to read stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}

async fn shutdown(handle: &EngineHandle, events: &mut EventReceiver, grace: Duration) {
    if handle.shutdown().is_err() {
        return;
    }
    // 監視タスクが終わるとイベントチャネルが閉じる
    let drain = async { while events.recv().await.is_some() {} };
    if tokio::time::timeout(grace + Duration::from_secs(1), drain).await.is_err() {
        log::warn!("engine session did not finish in time");
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn execute(
    controller: &mut GameController<EngineHandle>,
    recognizer: &dyn BoardRecognizer,
    line: &str,
) -> Result<Flow> {
    if line.trim().is_empty() {
        return Ok(Flow::Continue);
    }
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(e) => {
            println!("error: {e}");
            return Ok(Flow::Continue);
        }
    };

    // 局面が入れ替わるコマンドの後は盤を表示する
    let reprint = matches!(command, Command::Fen(_) | Command::Recognize(_) | Command::New);
    let now = Instant::now();
    let result = match command {
        Command::Move(mv) => controller.user_move(mv, now),
        Command::Undo => controller.undo(now).map(|(undone, events)| {
            println!("took back {undone} move(s)");
            print_board(controller);
            events
        }),
        Command::Hint => controller.hint(now),
        Command::Fen(fen) => Position::from_fen(&fen)
            .map_err(GameError::from)
            .and_then(|position| controller.set_position(position, now)),
        Command::Recognize(text) => recognizer
            .recognize(text.as_bytes())
            .map_err(GameError::from)
            .and_then(|recognition| controller.load_recognition(&recognition, now)),
        Command::Show => {
            print_board(controller);
            Ok(Vec::new())
        }
        Command::History { json } => {
            print_history(controller, json)?;
            Ok(Vec::new())
        }
        Command::New => Ok(controller.new_game(now)),
        Command::Quit => return Ok(Flow::Quit),
        Command::Help => {
            println!("{HELP}");
            Ok(Vec::new())
        }
    };

    match result {
        Ok(events) => {
            if reprint {
                print_board(controller);
            }
            for ev in events {
                report(controller, ev);
            }
        }
        Err(GameError::Recognition(RecognizeError::Invalid { position, violation })) => {
            println!("recognized board rejected: {violation}");
            println!("{}", position.board);
            println!("fix it and load with: fen {position}");
        }
        Err(e) => println!("error: {e}"),
    }
    Ok(Flow::Continue)
}

fn report(controller: &GameController<EngineHandle>, event: ControllerEvent) {
    match event {
        ControllerEvent::MoveApplied { entry, by_engine } => {
            let who = if by_engine { "engine" } else { "you" };
            println!("{who}: {} ({})", entry.notation, entry.mv);
            print_board(controller);
        }
        ControllerEvent::GameOver { loser } => {
            println!("{loser} has no legal move. {} wins", !loser);
        }
        ControllerEvent::Hint { mv, notation } => println!("hint: {notation} ({mv})"),
        ControllerEvent::Analysis(info) => {
            let score = info.score.map_or_else(|| "-".to_string(), |s| s.to_string());
            log::debug!(
                "depth {} score {score} pv {}",
                info.depth.unwrap_or(0),
                info.pv.join(" ")
            );
        }
        ControllerEvent::EngineReady => println!("engine ready"),
        ControllerEvent::EngineUnavailable { reason } => {
            println!("engine unavailable ({reason}); continuing without AI");
        }
        ControllerEvent::EngineCrashed { .. } => println!("engine crashed; restarting"),
        ControllerEvent::WatchdogTimeout { purpose } => {
            println!("engine did not answer in time ({purpose:?}); search stopped");
        }
        ControllerEvent::StaleReply { request } => log::debug!("stale reply {request:?}"),
        ControllerEvent::IllegalEngineMove { uci, reason } => {
            println!("engine proposed an illegal move {uci}: {reason}");
        }
    }
}

fn print_board(controller: &GameController<EngineHandle>) {
    let position = controller.position();
    println!("{}", position.board);
    let status = match controller.loser() {
        Some(loser) => format!("game over, {} wins", !loser),
        None if controller.is_thinking() => {
            format!("{} to move (engine busy)", position.side_to_move)
        }
        None => format!("{} to move", position.side_to_move),
    };
    println!("{status}  [{position}]");
}

fn print_history(controller: &GameController<EngineHandle>, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(controller.history())
            .context("failed to serialize history")?;
        println!("{text}");
        return Ok(());
    }
    if controller.history().is_empty() {
        println!("(no moves)");
    }
    for (i, entry) in controller.history().iter().enumerate() {
        println!("{:>3}. {} ({})", i + 1, entry.notation, entry.mv);
    }
    Ok(())
}
