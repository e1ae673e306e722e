//! エンジン出力の行バッファ
//!
//! stdout から届くバイト列はどこで切れるか分からないため、改行までを溜めて
//! 完全な行だけを取り出す。行末の `\r` は取り除く。

/// 改行で区切られていない末尾を保持する行アキュムレータ
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// バイト列を追加し、完成した行を到着順に返す
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// 改行なしで残っている末尾を取り出す（プロセス終了時）
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches('\r');
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// 未完の行が残っているか
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
