//! 対局コントローラ
//!
//! 正本の局面・手番・棋譜を持ち、着手の検証と適用、エンジンへの探索依頼を行う。
//!
//! - AI の手番になったら `go movetime` で指し手を依頼する
//! - 人の手番になったら `go depth 1` で詰み/ステイルメイトを確認する
//!   （`bestmove (none)` なら手番側の負け）
//! - すべての探索に `RequestId` を付け、最新の依頼以外への応答は捨てる
//!
//! 時刻は呼び出し側から渡す（`now`）。ウォッチドッグのテストで時間を進めるため。

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rxiangqi_core::{
    notate, validate_move, validate_position, Color, CoordError, FenError, Move, MoveViolation,
    Position, PositionViolation,
};
use rxiangqi_uci::{
    BestMove, EngineEvent, EngineHandle, EngineInfo, GoLimit, RequestId, SessionError, UciCommand,
};
use serde::Serialize;

use crate::recognize::{normalize, Recognition, RecognizeError};

/// コントローラからエンジンへの送信口
///
/// 本番では `EngineHandle`、テストでは送信内容を記録するフェイクを使う。
pub trait EngineLink {
    fn send(&mut self, cmd: UciCommand) -> Result<(), SessionError>;
    fn go(&mut self, request: RequestId, limit: GoLimit) -> Result<(), SessionError>;
}

impl EngineLink for EngineHandle {
    fn send(&mut self, cmd: UciCommand) -> Result<(), SessionError> {
        EngineHandle::send(self, cmd)
    }

    fn go(&mut self, request: RequestId, limit: GoLimit) -> Result<(), SessionError> {
        EngineHandle::go(self, request, limit)
    }
}

/// 対局設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// AI が指す側（`None` なら AI は指さない）
    pub ai_color: Option<Color>,
    pub movetime_ms: u64,
    pub mate_check_depth: u32,
    pub watchdog_margin: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            ai_color: Some(Color::Black),
            movetime_ms: 1000,
            mate_check_depth: 1,
            watchdog_margin: Duration::from_secs(3),
        }
    }
}

/// 探索の目的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPurpose {
    /// AI の指し手
    EngineMove,
    /// 手番側に指し手が残っているかの確認
    MateCheck,
    /// 人へのヒント
    Hint,
}

/// 応答待ちの探索
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSearch {
    pub id: RequestId,
    pub purpose: SearchPurpose,
    /// 依頼時の手番
    pub side: Color,
    pub deadline: Instant,
}

/// 棋譜の 1 手
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// 着手後の局面
    pub fen: String,
    #[serde(serialize_with = "serialize_uci")]
    pub mv: Move,
    pub notation: String,
}

fn serialize_uci<S: serde::Serializer>(mv: &Move, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mv.to_uci())
}

/// コントローラから UI への通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    MoveApplied { entry: HistoryEntry, by_engine: bool },
    /// `loser` に指せる手がない
    GameOver { loser: Color },
    Hint { mv: Move, notation: String },
    Analysis(EngineInfo),
    EngineReady,
    /// エンジンを使えない。AI なしで続行する
    EngineUnavailable { reason: String },
    /// クラッシュした。再起動後に探索を依頼し直す
    EngineCrashed { lost: Option<SearchPurpose> },
    WatchdogTimeout { purpose: SearchPurpose },
    /// 最新の依頼に対応しない応答を捨てた
    StaleReply { request: Option<RequestId> },
    /// エンジンが不正な手を返した
    IllegalEngineMove { uci: String, reason: String },
}

/// 着手・操作の拒否理由
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("that piece belongs to the other side")]
    NotYourPiece,
    #[error("the game is over")]
    GameOver,
    #[error("the engine is thinking")]
    EngineThinking,
    #[error("the engine is not available")]
    EngineUnavailable,
    #[error("illegal move: {0}")]
    Illegal(#[from] MoveViolation),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error(transparent)]
    Fen(#[from] FenError),
    #[error(transparent)]
    Coord(#[from] CoordError),
    #[error("invalid position: {0}")]
    InvalidPosition(PositionViolation),
    #[error(transparent)]
    Recognition(#[from] RecognizeError),
}

/// 対局コントローラ
pub struct GameController<L: EngineLink> {
    link: L,
    settings: GameSettings,
    /// 接続直後に毎回送る `setoption` など
    setup: Vec<UciCommand>,
    position: Position,
    initial: Position,
    history: Vec<HistoryEntry>,
    pending: Option<PendingSearch>,
    /// クラッシュで失われた探索。`Ready` 後に依頼し直す
    lost: Option<SearchPurpose>,
    next_request: u64,
    engine_available: bool,
    loser: Option<Color>,
    last_info: Option<EngineInfo>,
}

impl<L: EngineLink> GameController<L> {
    pub fn new(link: L, settings: GameSettings, start: Position) -> Self {
        Self {
            link,
            settings,
            setup: Vec::new(),
            position: start,
            initial: start,
            history: Vec::new(),
            pending: None,
            lost: None,
            next_request: 0,
            engine_available: false,
            loser: None,
            last_info: None,
        }
    }

    /// エンジン接続時に送るコマンドを設定する
    pub fn with_setup_commands(mut self, setup: Vec<UciCommand>) -> Self {
        self.setup = setup;
        self
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn pending(&self) -> Option<&PendingSearch> {
        self.pending.as_ref()
    }

    pub fn is_thinking(&self) -> bool {
        self.pending.is_some()
    }

    pub fn engine_available(&self) -> bool {
        self.engine_available
    }

    /// 負けた側（終局していなければ `None`）
    pub fn loser(&self) -> Option<Color> {
        self.loser
    }

    pub fn last_info(&self) -> Option<&EngineInfo> {
        self.last_info.as_ref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// AI が指す手番か。エンジンが使えない間は両手番とも人が指す
    fn is_ai_turn(&self) -> bool {
        self.engine_available && self.settings.ai_color == Some(self.position.side_to_move)
    }

    // ------------------------------------------------------------------
    // 人の操作
    // ------------------------------------------------------------------

    /// 人の着手
    pub fn user_move(&mut self, mv: Move, now: Instant) -> Result<Vec<ControllerEvent>, GameError> {
        if self.loser.is_some() {
            return Err(GameError::GameOver);
        }
        if self.is_ai_turn() {
            return Err(if self.pending.is_some() {
                GameError::EngineThinking
            } else {
                GameError::NotYourTurn
            });
        }
        let side = self.position.side_to_move;
        if self.position.board.piece_on(mv.from).is_some_and(|pc| pc.color != side) {
            return Err(GameError::NotYourPiece);
        }
        validate_move(&self.position.board, mv)?;

        // 詰み確認やヒントの応答はもう要らない
        self.cancel_pending();

        let mut events = vec![self.apply(mv, false)];
        events.extend(self.sync_turn(now));
        Ok(events)
    }

    /// UCI 表記の文字列で着手する
    pub fn user_move_str(
        &mut self,
        uci: &str,
        now: Instant,
    ) -> Result<Vec<ControllerEvent>, GameError> {
        let mv = Move::from_uci(uci)?;
        self.user_move(mv, now)
    }

    /// ヒントを依頼する
    pub fn hint(&mut self, now: Instant) -> Result<Vec<ControllerEvent>, GameError> {
        if self.loser.is_some() {
            return Err(GameError::GameOver);
        }
        if !self.engine_available {
            return Err(GameError::EngineUnavailable);
        }
        if self.pending.as_ref().is_some_and(|p| p.purpose == SearchPurpose::EngineMove) {
            return Err(GameError::EngineThinking);
        }
        Ok(self.request(SearchPurpose::Hint, now).into_iter().collect())
    }

    /// 1 手戻す。戻した結果 AI の手番になるならもう 1 手戻す
    ///
    /// 戻した手数を返す。
    pub fn undo(&mut self, now: Instant) -> Result<(usize, Vec<ControllerEvent>), GameError> {
        if self.history.is_empty() {
            return Err(GameError::NothingToUndo);
        }
        self.cancel_pending();
        self.lost = None;

        self.history.pop();
        let mut undone = 1;
        self.restore_last()?;
        if self.is_ai_turn() && !self.history.is_empty() {
            self.history.pop();
            undone += 1;
            self.restore_last()?;
        }
        self.loser = None;
        info!("undo {undone} ply; {} to move", self.position.side_to_move);

        let events = self.sync_turn(now);
        Ok((undone, events))
    }

    fn restore_last(&mut self) -> Result<(), GameError> {
        self.position = match self.history.last() {
            Some(entry) => Position::from_fen(&entry.fen)?,
            None => self.initial,
        };
        Ok(())
    }

    /// 初期局面から指し直す
    pub fn new_game(&mut self, now: Instant) -> Vec<ControllerEvent> {
        let start = Position::startpos();
        self.reset(start);
        self.send(UciCommand::UciNewGame);
        self.sync_turn(now)
    }

    /// 任意の局面から始める。構造チェックを通らない局面は拒否する
    pub fn set_position(
        &mut self,
        position: Position,
        now: Instant,
    ) -> Result<Vec<ControllerEvent>, GameError> {
        validate_position(&position).map_err(GameError::InvalidPosition)?;
        self.reset(position);
        self.send(UciCommand::UciNewGame);
        Ok(self.sync_turn(now))
    }

    /// 盤面認識の結果を取り込む
    ///
    /// 不正な盤面は `GameError::Recognition(RecognizeError::Invalid { .. })` として
    /// 局面付きで返し、対局状態は変えない。
    pub fn load_recognition(
        &mut self,
        recognition: &Recognition,
        now: Instant,
    ) -> Result<Vec<ControllerEvent>, GameError> {
        let position = normalize(recognition)?;
        self.set_position(position, now)
    }

    fn reset(&mut self, start: Position) {
        self.cancel_pending();
        self.lost = None;
        self.position = start;
        self.initial = start;
        self.history.clear();
        self.loser = None;
        self.last_info = None;
    }

    // ------------------------------------------------------------------
    // エンジンからのイベント
    // ------------------------------------------------------------------

    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) -> Vec<ControllerEvent> {
        match event {
            EngineEvent::Ready { pid } => {
                info!("engine ready (pid {pid})");
                self.engine_available = true;
                for cmd in self.setup.clone() {
                    self.send(cmd);
                }
                // 落ちた探索のうち、今の局面でも意味があるのはヒントだけ
                let mut events = vec![ControllerEvent::EngineReady];
                match self.lost.take() {
                    Some(SearchPurpose::Hint) if self.loser.is_none() => {
                        events.extend(self.request(SearchPurpose::Hint, now));
                    }
                    _ => events.extend(self.sync_turn(now)),
                }
                events
            }
            EngineEvent::ReadyOk => Vec::new(),
            EngineEvent::Info(info) => {
                if self.pending.is_none() {
                    return Vec::new();
                }
                self.last_info = Some(info.clone());
                vec![ControllerEvent::Analysis(info)]
            }
            EngineEvent::BestMove { request, best, .. } => self.on_bestmove(request, best, now),
            EngineEvent::Crashed { code } => {
                warn!("engine crashed (exit code {code:?})");
                let lost = self.pending.take().map(|p| p.purpose);
                self.lost = lost.or(self.lost);
                vec![ControllerEvent::EngineCrashed { lost }]
            }
            EngineEvent::Quit => {
                self.engine_available = false;
                self.pending = None;
                Vec::new()
            }
            EngineEvent::Error { message } => {
                warn!("engine unavailable: {message}");
                self.engine_available = false;
                self.pending = None;
                self.lost = None;
                vec![ControllerEvent::EngineUnavailable { reason: message }]
            }
        }
    }

    fn on_bestmove(
        &mut self,
        request: Option<RequestId>,
        best: BestMove,
        now: Instant,
    ) -> Vec<ControllerEvent> {
        let Some(pending) = self.pending.take_if(|p| Some(p.id) == request) else {
            debug!("discarding stale bestmove for request {request:?}");
            return vec![ControllerEvent::StaleReply { request }];
        };

        let Some(uci) = best.as_move() else {
            // 指せる手がない: 手番側の負け
            info!("{} has no legal move", pending.side);
            self.loser = Some(pending.side);
            return vec![ControllerEvent::GameOver { loser: pending.side }];
        };

        let mv = match Move::from_uci(uci) {
            Ok(mv) => mv,
            Err(e) => {
                warn!("engine returned unparsable move {uci}: {e}");
                return vec![ControllerEvent::IllegalEngineMove {
                    uci: uci.to_string(),
                    reason: e.to_string(),
                }];
            }
        };

        match pending.purpose {
            SearchPurpose::MateCheck => Vec::new(),
            SearchPurpose::Hint => {
                let notation = notate(&self.position.board, mv);
                vec![ControllerEvent::Hint { mv, notation }]
            }
            SearchPurpose::EngineMove => self.apply_engine_move(uci, mv, now),
        }
    }

    fn apply_engine_move(&mut self, uci: &str, mv: Move, now: Instant) -> Vec<ControllerEvent> {
        // 手番と合わない駒を動かす手は別局面への応答とみなす
        let side = self.position.side_to_move;
        match self.position.board.piece_on(mv.from) {
            Some(pc) if pc.color == side && self.is_ai_turn() => {}
            _ => {
                warn!("discarding ghost move {uci}: {side} to move");
                return vec![ControllerEvent::StaleReply { request: None }];
            }
        }
        if let Err(violation) = validate_move(&self.position.board, mv) {
            warn!("engine move {uci} rejected: {violation}");
            return vec![ControllerEvent::IllegalEngineMove {
                uci: uci.to_string(),
                reason: violation.to_string(),
            }];
        }
        let mut events = vec![self.apply(mv, true)];
        events.extend(self.sync_turn(now));
        events
    }

    /// 探索期限を過ぎていれば打ち切る
    pub fn check_watchdog(&mut self, now: Instant) -> Option<ControllerEvent> {
        let pending = self.pending.take_if(|p| now >= p.deadline)?;
        warn!(
            "no bestmove for request {} ({:?}) before deadline; stopping",
            pending.id, pending.purpose
        );
        self.send(UciCommand::Stop);
        Some(ControllerEvent::WatchdogTimeout { purpose: pending.purpose })
    }

    // ------------------------------------------------------------------
    // 内部処理
    // ------------------------------------------------------------------

    fn apply(&mut self, mv: Move, by_engine: bool) -> ControllerEvent {
        let notation = notate(&self.position.board, mv);
        self.position = self.position.after_move(mv);
        self.lost = None;
        let entry = HistoryEntry { fen: self.position.to_fen(), mv, notation };
        info!("{} {} ({})", if by_engine { "engine" } else { "user" }, entry.notation, mv);
        self.history.push(entry.clone());
        ControllerEvent::MoveApplied { entry, by_engine }
    }

    /// 現在の手番に応じた探索を依頼する
    ///
    /// AI の手番なら指し手、それ以外は詰み確認。
    fn sync_turn(&mut self, now: Instant) -> Vec<ControllerEvent> {
        if self.loser.is_some() || !self.engine_available {
            return Vec::new();
        }
        let purpose =
            if self.is_ai_turn() { SearchPurpose::EngineMove } else { SearchPurpose::MateCheck };
        self.request(purpose, now).into_iter().collect()
    }

    fn request(&mut self, purpose: SearchPurpose, now: Instant) -> Option<ControllerEvent> {
        if !self.engine_available {
            return None;
        }
        self.cancel_pending();

        self.next_request += 1;
        let id = RequestId(self.next_request);
        let limit = match purpose {
            SearchPurpose::EngineMove | SearchPurpose::Hint => {
                GoLimit::MoveTime(self.settings.movetime_ms)
            }
            SearchPurpose::MateCheck => GoLimit::Depth(self.settings.mate_check_depth),
        };
        let deadline = now + limit.budget().unwrap_or_default() + self.settings.watchdog_margin;

        let fen = self.position.to_fen();
        let result = self
            .link
            .send(UciCommand::Position { fen })
            .and_then(|()| self.link.go(id, limit));
        if let Err(e) = result {
            warn!("failed to request {purpose:?}: {e}");
            self.engine_available = false;
            return Some(ControllerEvent::EngineUnavailable { reason: e.to_string() });
        }
        debug!("request {id}: {purpose:?} {limit:?}");
        self.pending =
            Some(PendingSearch { id, purpose, side: self.position.side_to_move, deadline });
        None
    }

    /// 応答待ちの探索を止める。遅れて届く `bestmove` は番号で捨てられる
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("cancelling request {} ({:?})", pending.id, pending.purpose);
            self.send(UciCommand::Stop);
        }
    }

    fn send(&mut self, cmd: UciCommand) {
        if !self.engine_available {
            return;
        }
        if let Err(e) = self.link.send(cmd) {
            warn!("engine link closed: {e}");
            self.engine_available = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 送信内容を記録するだけのリンク
    #[derive(Default)]
    struct RecordingLink {
        sent: Vec<String>,
        searches: Vec<(RequestId, GoLimit)>,
    }

    impl EngineLink for RecordingLink {
        fn send(&mut self, cmd: UciCommand) -> Result<(), SessionError> {
            self.sent.push(cmd.to_string());
            Ok(())
        }

        fn go(&mut self, request: RequestId, limit: GoLimit) -> Result<(), SessionError> {
            self.sent.push(UciCommand::Go(limit).to_string());
            self.searches.push((request, limit));
            Ok(())
        }
    }

    fn controller(ai: Option<Color>) -> GameController<RecordingLink> {
        let settings = GameSettings { ai_color: ai, ..GameSettings::default() };
        GameController::new(RecordingLink::default(), settings, Position::startpos())
    }

    fn ready(ctl: &mut GameController<RecordingLink>, now: Instant) -> Vec<ControllerEvent> {
        ctl.handle_event(EngineEvent::Ready { pid: 1 }, now)
    }

    fn bestmove(id: u64, mv: &str) -> EngineEvent {
        let best = if mv == "(none)" { BestMove::None } else { BestMove::Move(mv.to_string()) };
        EngineEvent::BestMove { request: Some(RequestId(id)), best, ponder: None }
    }

    #[test]
    fn test_ready_sends_setup_and_requests_ai_move() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Red))
            .with_setup_commands(vec![UciCommand::set_option("EvalFile", "w.nnue")]);
        let events = ready(&mut ctl, now);
        assert_eq!(events, vec![ControllerEvent::EngineReady]);
        assert_eq!(
            ctl.link().sent,
            vec![
                "setoption name EvalFile value w.nnue".to_string(),
                format!("position fen {}", Position::startpos().to_fen()),
                "go movetime 1000".to_string(),
            ]
        );
        let pending = ctl.pending().unwrap();
        assert_eq!(pending.purpose, SearchPurpose::EngineMove);
        assert_eq!(pending.deadline, now + Duration::from_millis(1000) + Duration::from_secs(3));
        assert_eq!(ctl.link().searches, vec![(RequestId(1), GoLimit::MoveTime(1000))]);
    }

    #[test]
    fn test_user_move_then_engine_reply() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        ready(&mut ctl, now);
        // 紅番なので最初は詰み確認
        assert_eq!(ctl.pending().unwrap().purpose, SearchPurpose::MateCheck);

        let events = ctl.user_move_str("h2e2", now).unwrap();
        match &events[0] {
            ControllerEvent::MoveApplied { entry, by_engine: false } => {
                assert_eq!(entry.notation, "炮二平五");
            }
            other => panic!("unexpected {other:?}"),
        }
        // 詰み確認は stop で取り消され、AI の指し手を依頼
        let pending = ctl.pending().unwrap().clone();
        assert_eq!(pending.purpose, SearchPurpose::EngineMove);
        assert_eq!(pending.id, RequestId(2));
        assert!(ctl.link().sent.contains(&"stop".to_string()));

        let events = ctl.handle_event(bestmove(2, "h7e7"), now);
        match &events[0] {
            ControllerEvent::MoveApplied { entry, by_engine: true } => {
                assert_eq!(entry.notation, "炮８平５");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ctl.position().side_to_move, Color::Red);
        assert_eq!(ctl.history().len(), 2);
        assert_eq!(ctl.pending().unwrap().purpose, SearchPurpose::MateCheck);
    }

    #[test]
    fn test_stale_request_is_discarded() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        ready(&mut ctl, now);
        ctl.user_move_str("h2e2", now).unwrap();

        // 取り消された詰み確認（#1）の応答
        let events = ctl.handle_event(bestmove(1, "(none)"), now);
        assert_eq!(events, vec![ControllerEvent::StaleReply { request: Some(RequestId(1)) }]);
        assert_eq!(ctl.loser(), None);
        assert_eq!(ctl.pending().unwrap().id, RequestId(2));
    }

    #[test]
    fn test_ghost_move_of_wrong_color_is_discarded() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        ready(&mut ctl, now);
        ctl.user_move_str("h2e2", now).unwrap();

        // 番号は合っているが紅の駒を動かす手
        let events = ctl.handle_event(bestmove(2, "b2e2"), now);
        assert_eq!(events, vec![ControllerEvent::StaleReply { request: None }]);
        assert_eq!(ctl.history().len(), 1);
    }

    #[test]
    fn test_illegal_engine_move_is_reported() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        ready(&mut ctl, now);
        ctl.user_move_str("h2e2", now).unwrap();
        let events = ctl.handle_event(bestmove(2, "a9a5"), now);
        assert!(matches!(&events[0], ControllerEvent::IllegalEngineMove { uci, .. } if uci == "a9a5"));
        assert_eq!(ctl.position().side_to_move, Color::Black);
    }

    #[test]
    fn test_no_move_means_side_to_move_lost() {
        let now = Instant::now();
        let mut ctl = controller(None);
        ready(&mut ctl, now);
        let events = ctl.handle_event(bestmove(1, "(none)"), now);
        assert_eq!(events, vec![ControllerEvent::GameOver { loser: Color::Red }]);
        assert_eq!(ctl.user_move_str("h2e2", now), Err(GameError::GameOver));
    }

    #[test]
    fn test_user_move_rejections() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        assert_eq!(
            ctl.user_move_str("h2h8", now),
            Err(GameError::Illegal(MoveViolation::PathBlocked))
        );
        assert_eq!(ctl.user_move_str("h7e7", now), Err(GameError::NotYourPiece));
        assert!(matches!(ctl.user_move_str("z2e2", now), Err(GameError::Coord(_))));

        ready(&mut ctl, now);
        ctl.user_move_str("h2e2", now).unwrap();
        assert_eq!(ctl.user_move_str("h7e7", now), Err(GameError::EngineThinking));
    }

    #[test]
    fn test_watchdog_stops_search() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Red));
        ready(&mut ctl, now);
        assert_eq!(ctl.check_watchdog(now + Duration::from_millis(3999)), None);
        assert_eq!(
            ctl.check_watchdog(now + Duration::from_secs(4)),
            Some(ControllerEvent::WatchdogTimeout { purpose: SearchPurpose::EngineMove })
        );
        assert!(!ctl.is_thinking());
        assert_eq!(ctl.link().sent.last().map(String::as_str), Some("stop"));
        // 遅れて届いた応答は捨てる
        let events = ctl.handle_event(bestmove(1, "h2e2"), now);
        assert_eq!(events, vec![ControllerEvent::StaleReply { request: Some(RequestId(1)) }]);
    }

    #[test]
    fn test_crash_reissues_search_after_ready() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Red));
        ready(&mut ctl, now);
        let events = ctl.handle_event(EngineEvent::Crashed { code: Some(1) }, now);
        assert_eq!(
            events,
            vec![ControllerEvent::EngineCrashed { lost: Some(SearchPurpose::EngineMove) }]
        );
        assert!(!ctl.is_thinking());

        ready(&mut ctl, now);
        let pending = ctl.pending().unwrap();
        assert_eq!(pending.purpose, SearchPurpose::EngineMove);
        assert_eq!(pending.id, RequestId(2));
    }

    #[test]
    fn test_undo_skips_back_over_ai_move() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        ready(&mut ctl, now);
        ctl.user_move_str("h2e2", now).unwrap();
        ctl.handle_event(bestmove(2, "h7e7"), now);
        assert_eq!(ctl.history().len(), 2);

        let (undone, _) = ctl.undo(now).unwrap();
        assert_eq!(undone, 2);
        assert_eq!(ctl.position(), &Position::startpos());
        assert!(ctl.history().is_empty());
        assert_eq!(ctl.undo(now).map(|(n, _)| n), Err(GameError::NothingToUndo));
    }

    #[test]
    fn test_undo_single_ply_without_ai() {
        let now = Instant::now();
        let mut ctl = controller(None);
        ctl.user_move_str("h2e2", now).unwrap();
        ctl.user_move_str("h7e7", now).unwrap();
        let (undone, _) = ctl.undo(now).unwrap();
        assert_eq!(undone, 1);
        assert_eq!(ctl.position().side_to_move, Color::Black);
        assert_eq!(ctl.history().len(), 1);
    }

    #[test]
    fn test_hint_requires_engine() {
        let now = Instant::now();
        let mut ctl = controller(None);
        assert_eq!(ctl.hint(now), Err(GameError::EngineUnavailable));

        ready(&mut ctl, now);
        ctl.hint(now).unwrap();
        assert_eq!(ctl.pending().unwrap().purpose, SearchPurpose::Hint);
        let events = ctl.handle_event(bestmove(2, "h2e2"), now);
        assert_eq!(
            events,
            vec![ControllerEvent::Hint {
                mv: Move::from_uci("h2e2").unwrap(),
                notation: "炮二平五".to_string()
            }]
        );
        // ヒントは局面を変えない
        assert!(ctl.history().is_empty());
    }

    #[test]
    fn test_engine_error_degrades_to_manual() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        let events = ctl.handle_event(
            EngineEvent::Error { message: "failed to spawn engine".to_string() },
            now,
        );
        assert!(matches!(&events[0], ControllerEvent::EngineUnavailable { .. }));
        // AI の手番も人が指す
        ctl.user_move_str("h2e2", now).unwrap();
        ctl.user_move_str("h7e7", now).unwrap();
        assert_eq!(ctl.history().len(), 2);
        assert_eq!(ctl.position().side_to_move, Color::Red);
        assert!(ctl.link().searches.is_empty());
        // 1 手ずつ戻る
        assert_eq!(ctl.undo(now).map(|(n, _)| n), Ok(1));
    }

    #[test]
    fn test_manual_play_before_engine_starts() {
        let now = Instant::now();
        let mut ctl = GameController::new(
            RecordingLink::default(),
            GameSettings::default(),
            Position::startpos(),
        );
        assert_eq!(ctl.settings().ai_color, Some(Color::Black));
        ctl.user_move_str("h2e2", now).unwrap();
        ctl.user_move_str("h7e7", now).unwrap();
        ctl.user_move_str("b0c2", now).unwrap();
        assert_eq!(ctl.history().len(), 3);
        assert!(ctl.link().sent.is_empty());
    }

    #[test]
    fn test_crash_then_user_move_searches_current_turn() {
        let now = Instant::now();
        let mut ctl = controller(Some(Color::Black));
        ready(&mut ctl, now);
        let events = ctl.handle_event(EngineEvent::Crashed { code: Some(1) }, now);
        assert_eq!(
            events,
            vec![ControllerEvent::EngineCrashed { lost: Some(SearchPurpose::MateCheck) }]
        );

        // 再起動待ちの間に人が指す
        ctl.user_move_str("h2e2", now).unwrap();
        ctl.handle_event(EngineEvent::Ready { pid: 2 }, now);
        let pending = ctl.pending().unwrap().clone();
        assert_eq!(pending.purpose, SearchPurpose::EngineMove);
        assert_eq!(pending.side, Color::Black);
        assert_eq!(ctl.link().searches.last(), Some(&(pending.id, GoLimit::MoveTime(1000))));

        let events = ctl.handle_event(bestmove(pending.id.0, "h7e7"), now);
        assert!(matches!(&events[0], ControllerEvent::MoveApplied { by_engine: true, .. }));
        assert_eq!(ctl.position().side_to_move, Color::Red);
    }

    #[test]
    fn test_crash_replays_hint_on_unchanged_position() {
        let now = Instant::now();
        let mut ctl = controller(None);
        ready(&mut ctl, now);
        ctl.hint(now).unwrap();
        ctl.handle_event(EngineEvent::Crashed { code: Some(1) }, now);

        ctl.handle_event(EngineEvent::Ready { pid: 2 }, now);
        assert_eq!(ctl.pending().unwrap().purpose, SearchPurpose::Hint);

        // 局面が動いたらヒントは捨てて詰み確認
        ctl.handle_event(EngineEvent::Crashed { code: Some(1) }, now);
        ctl.user_move_str("h2e2", now).unwrap();
        ctl.handle_event(EngineEvent::Ready { pid: 3 }, now);
        assert_eq!(ctl.pending().unwrap().purpose, SearchPurpose::MateCheck);
    }

    #[test]
    fn test_set_position_validates() {
        let now = Instant::now();
        let mut ctl = controller(None);
        let bad = Position::from_fen("4k4/9/9/9/9/9/9/9/9/4K4 w").unwrap();
        assert_eq!(
            ctl.set_position(bad, now),
            Err(GameError::InvalidPosition(PositionViolation::FlyingGeneral))
        );
        let good = Position::from_fen("4k4/9/9/9/9/9/9/9/9/3K5 b").unwrap();
        ctl.set_position(good, now).unwrap();
        assert_eq!(ctl.position(), &good);
    }

    #[test]
    fn test_history_serializes_uci() {
        let now = Instant::now();
        let mut ctl = controller(None);
        ctl.user_move_str("h2e2", now).unwrap();
        let json = serde_json::to_value(ctl.history()).unwrap();
        assert_eq!(json[0]["mv"], "h2e2");
        assert_eq!(json[0]["notation"], "炮二平五");
    }
}
