//! 設定ファイル（TOML）
//!
//! ```toml
//! [engine]
//! path = "engine/pikafish"
//! weights = "engine/pikafish.nnue"
//! restart_delay_ms = 3000
//! quit_grace_ms = 500
//!
//! [engine.options]
//! Threads = 2
//! Hash = 128
//!
//! [game]
//! ai_side = "black"
//! movetime_ms = 1000
//! mate_check_depth = 1
//! watchdog_margin_ms = 3000
//! ```
//!
//! すべてのフィールドに既定値があり、省略したキーは既定値になる。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rxiangqi_core::Color;
use rxiangqi_uci::{SessionConfig, UciCommand};
use serde::{Deserialize, Serialize};

use crate::controller::GameSettings;

pub const DEFAULT_WEIGHTS_PATH: &str = "engine/pikafish.nnue";

/// 設定の読み込みエラー
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    pub engine: EngineSection,
    pub game: GameSection,
}

impl AssistConfig {
    /// TOML ファイルを読み込む
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// `[engine]` テーブル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// NNUE 重みファイル。`setoption name EvalFile` で渡す
    pub weights: PathBuf,
    /// 追加の UCI オプション（名前 → 値）
    pub options: BTreeMap<String, toml::Value>,
    pub restart_delay_ms: u64,
    pub quit_grace_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            path: session.path,
            args: Vec::new(),
            working_dir: None,
            weights: PathBuf::from(DEFAULT_WEIGHTS_PATH),
            options: BTreeMap::new(),
            restart_delay_ms: session.restart_delay.as_millis() as u64,
            quit_grace_ms: session.quit_grace.as_millis() as u64,
        }
    }
}

impl EngineSection {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            path: self.path.clone(),
            args: self.args.clone(),
            working_dir: self.working_dir.clone(),
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            quit_grace: Duration::from_millis(self.quit_grace_ms),
        }
    }

    /// `uciok` のたびに送る `setoption`（EvalFile → options の名前順）
    pub fn setup_commands(&self) -> Vec<UciCommand> {
        let mut cmds = Vec::with_capacity(self.options.len() + 1);
        cmds.push(UciCommand::set_option("EvalFile", self.weights.display().to_string()));
        for (name, value) in &self.options {
            cmds.push(UciCommand::set_option(name.clone(), option_value(value)));
        }
        cmds
    }
}

/// TOML の値を UCI の値文字列にする（文字列は引用符なし）
fn option_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// AI の担当
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiSide {
    Red,
    Black,
    /// AI は指さない（検討・二人対局）
    None,
}

impl AiSide {
    pub fn color(self) -> Option<Color> {
        match self {
            AiSide::Red => Some(Color::Red),
            AiSide::Black => Some(Color::Black),
            AiSide::None => None,
        }
    }
}

impl std::str::FromStr for AiSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(AiSide::None),
            other => other.parse::<Color>().map(|c| match c {
                Color::Red => AiSide::Red,
                Color::Black => AiSide::Black,
            }),
        }
    }
}

/// `[game]` テーブル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSection {
    pub ai_side: AiSide,
    pub movetime_ms: u64,
    /// 詰み/ステイルメイト確認の探索深さ
    pub mate_check_depth: u32,
    /// 探索時間にこれを足した時間で応答がなければ打ち切る
    pub watchdog_margin_ms: u64,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            ai_side: AiSide::Black,
            movetime_ms: 1000,
            mate_check_depth: 1,
            watchdog_margin_ms: 3000,
        }
    }
}

impl GameSection {
    pub fn settings(&self) -> GameSettings {
        GameSettings {
            ai_color: self.ai_side.color(),
            movetime_ms: self.movetime_ms,
            mate_check_depth: self.mate_check_depth,
            watchdog_margin: Duration::from_millis(self.watchdog_margin_ms),
        }
    }
}
