//! 盤面認識（画像 → FEN）との境界
//!
//! 画像処理そのものは外部の認識器が行い、ここでは `{fen, layout}` を受け取って
//! 向きを正規化し、構造チェックを通した局面だけを採用する。

use rxiangqi_core::{validate_position, FenError, Position, PositionViolation};
use serde::{Deserialize, Serialize};

/// 画像上の盤の向き
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardLayout {
    /// 紅が下（通常）
    #[default]
    RedBottom,
    /// 紅が上。検証前に 180 度回転する
    RedTop,
}

impl std::str::FromStr for BoardLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red_bottom" => Ok(BoardLayout::RedBottom),
            "red_top" => Ok(BoardLayout::RedTop),
            other => Err(format!("unknown layout '{other}'")),
        }
    }
}

/// 認識器の出力
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recognition {
    pub fen: String,
    #[serde(default)]
    pub layout: BoardLayout,
}

/// 認識結果を採用できなかった理由
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognizeError {
    #[error("recognizer failed: {0}")]
    Recognizer(String),
    #[error("recognized FEN is malformed: {0}")]
    Fen(#[from] FenError),
    /// 盤面は読めたが構造的に不正。手動修正のため局面を添える
    #[error("recognized board is invalid: {violation}")]
    Invalid { position: Box<Position>, violation: PositionViolation },
}

/// 画像から盤面を読み取る外部コンポーネント
pub trait BoardRecognizer {
    fn recognize(&self, image: &[u8]) -> Result<Recognition, RecognizeError>;
}

/// 認識結果を紅下向きの局面に正規化し、構造チェックする
pub fn normalize(recognition: &Recognition) -> Result<Position, RecognizeError> {
    let parsed = Position::from_fen(&recognition.fen)?;
    let position = match recognition.layout {
        BoardLayout::RedBottom => parsed,
        BoardLayout::RedTop => parsed.rotated(),
    };
    validate_position(&position)
        .map_err(|violation| RecognizeError::Invalid { position: Box::new(position), violation })?;
    Ok(position)
}

/// テキストをそのまま認識結果として扱う認識器
///
/// 入力は JSON（`{"fen": "...", "layout": "red_top"}`）か、
/// `<FEN> [red_bottom|red_top]` 形式のプレーンテキスト。
/// 外部の認識パイプラインの出力を手で流し込むときに使う。
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRecognizer;

impl BoardRecognizer for TextRecognizer {
    fn recognize(&self, image: &[u8]) -> Result<Recognition, RecognizeError> {
        let text = std::str::from_utf8(image)
            .map_err(|e| RecognizeError::Recognizer(format!("input is not UTF-8: {e}")))?
            .trim();
        if text.starts_with('{') {
            return serde_json::from_str(text)
                .map_err(|e| RecognizeError::Recognizer(format!("bad recognition JSON: {e}")));
        }

        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        let layout = match tokens.last().map(|t| t.parse::<BoardLayout>()) {
            Some(Ok(layout)) => {
                tokens.pop();
                layout
            }
            _ => BoardLayout::default(),
        };
        if tokens.is_empty() {
            return Err(RecognizeError::Recognizer("empty recognition result".to_string()));
        }
        Ok(Recognition { fen: tokens.join(" "), layout })
    }
}
