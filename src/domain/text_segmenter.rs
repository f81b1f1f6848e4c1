//! 流式文本分割器
//!
//! 在补全文本逐块到达的过程中检测句子边界：强分隔符（句末标点）
//! 在累计字符数达到下限后闭合句子，弱分隔符同样受下限约束，
//! 换行无条件闭合。已产出的句子不可再被追加，句末紧跟的引号
//! 会被并入尚未产出的句子缓冲。

/// 默认最小字符数限制
/// 未达到此限制时，分隔符不会闭合句子（短句向后合并）
pub const DEFAULT_MIN_CHARS: usize = 20;

/// 分割配置
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// 最小字符数限制（用于合并短句）
    pub min_chars: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

/// 检查是否为强分隔符（句末标点）
#[inline]
fn is_strong_delimiter(ch: char) -> bool {
    matches!(ch, '。' | '？' | '！' | '.' | '?' | '!')
}

/// 检查是否为弱分隔符（逗号等）
#[inline]
fn is_weak_delimiter(ch: char) -> bool {
    matches!(ch, '，' | '；' | '：' | ',' | ';' | ':')
}

/// 检查字符是否为引号或空白
#[inline]
fn is_quote_or_space(ch: char) -> bool {
    // 中文引号: " (\u{201C}) " (\u{201D})  中文单引号: ' (\u{2018}) ' (\u{2019})
    matches!(
        ch,
        '"' | '\u{201C}' | '\u{201D}' | '\'' | '\u{2018}' | '\u{2019}' | ' ' | '\t'
    )
}

/// 检查片段是否只包含引号或空白（不值得单独成句）
#[inline]
fn is_trivial_segment(s: &str) -> bool {
    s.chars().all(is_quote_or_space)
}

/// 流式句子扫描器
///
/// 用法: 每收到一个文本增量调用 [`push`](Self::push)，返回其间新闭合的
/// 句子；流结束后调用 [`flush`](Self::flush) 收取尾部。
#[derive(Debug, Clone)]
pub struct StreamSegmenter {
    config: SegmentConfig,
    /// 当前未闭合句子
    buffer: String,
    /// buffer 的字符数（避免逐字符重数）
    buffer_chars: usize,
    /// 已见边界、等待吸收句末引号的句子
    sealed: Option<String>,
}

impl StreamSegmenter {
    pub fn new(config: SegmentConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            buffer_chars: 0,
            sealed: None,
        }
    }

    /// 喂入一个文本增量，返回新闭合的句子（可能为空）
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut closed = Vec::new();

        for ch in delta.chars() {
            // 句末引号并入刚闭合的句子；其余字符先结算 sealed
            if let Some(sealed) = &mut self.sealed {
                if is_quote_or_space(ch) && ch != '\n' {
                    sealed.push(ch);
                    continue;
                }
                Self::emit(self.sealed.take(), &mut closed);
            }

            if ch == '\n' || ch == '\r' {
                // 行边界无条件闭合
                self.seal();
                Self::emit(self.sealed.take(), &mut closed);
                continue;
            }

            self.buffer.push(ch);
            self.buffer_chars += 1;

            let reached_min = self.buffer_chars >= self.config.min_chars;
            if is_strong_delimiter(ch) && reached_min {
                self.seal();
            } else if is_weak_delimiter(ch) && reached_min {
                self.seal();
            }
        }

        closed
    }

    /// 流结束，收取剩余尾部（可能为 0 到 2 个句子）
    pub fn flush(&mut self) -> Vec<String> {
        let mut closed = Vec::new();
        Self::emit(self.sealed.take(), &mut closed);
        self.seal();
        Self::emit(self.sealed.take(), &mut closed);
        closed
    }

    /// 未闭合的尾部文本（含等待吸收引号的部分）
    pub fn pending(&self) -> String {
        match &self.sealed {
            Some(sealed) => format!("{}{}", sealed, self.buffer),
            None => self.buffer.clone(),
        }
    }

    /// 将当前 buffer 转入 sealed 等待产出
    fn seal(&mut self) {
        let text = std::mem::take(&mut self.buffer);
        self.buffer_chars = 0;
        match &mut self.sealed {
            // 连续闭合（如换行紧跟句号）时并入前一个未产出句子
            Some(sealed) => sealed.push_str(&text),
            None => self.sealed = Some(text),
        }
    }

    fn emit(sealed: Option<String>, closed: &mut Vec<String>) {
        if let Some(text) = sealed {
            let trimmed = text.trim();
            if !trimmed.is_empty() && !is_trivial_segment(trimmed) {
                closed.push(trimmed.to_string());
            }
        }
    }
}

impl Default for StreamSegmenter {
    fn default() -> Self {
        Self::new(SegmentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(min_chars: usize) -> StreamSegmenter {
        StreamSegmenter::new(SegmentConfig { min_chars })
    }

    #[test]
    fn test_strong_delimiter_closes_sentence() {
        let mut seg = scanner(4);
        let closed = seg.push("今天天气不错。明天");
        assert_eq!(closed, vec!["今天天气不错。"]);
        assert_eq!(seg.pending(), "明天");
    }

    #[test]
    fn test_boundary_split_across_deltas() {
        // 句号与后续文本分属不同增量
        let mut seg = scanner(4);
        assert!(seg.push("It was a long day").is_empty());
        assert!(seg.push(".").is_empty());
        let closed = seg.push(" Then");
        assert_eq!(closed, vec!["It was a long day."]);
        assert_eq!(seg.pending(), "Then");
    }

    #[test]
    fn test_short_sentences_merge_forward() {
        let mut seg = scanner(100);
        assert!(seg.push("短。短？短！").is_empty());
        let closed = seg.flush();
        assert_eq!(closed, vec!["短。短？短！"]);
    }

    #[test]
    fn test_weak_delimiter_respects_min_chars() {
        let mut seg = scanner(20);
        assert!(seg.push("所以，如今想要讨还回去吧，").is_empty());
        let closed = seg.flush();
        assert_eq!(closed.len(), 1);
    }

    #[test]
    fn test_weak_delimiter_splits_when_enough_chars() {
        let mut seg = scanner(10);
        let closed = seg.push("这是一段很长的文字内容，另一段也很长的内容。");
        assert_eq!(closed[0], "这是一段很长的文字内容，");
    }

    #[test]
    fn test_newline_always_closes() {
        let mut seg = scanner(50);
        let closed = seg.push("第一行\n第二行\n");
        assert_eq!(closed, vec!["第一行", "第二行"]);
    }

    #[test]
    fn test_trailing_quote_absorbed() {
        let mut seg = scanner(8);
        let closed = seg.push("\"斗之力，三段！\"旁白继续");
        assert_eq!(closed, vec!["\"斗之力，三段！\""]);
        assert_eq!(seg.pending(), "旁白继续");
    }

    #[test]
    fn test_quote_absorbed_at_flush() {
        let mut seg = scanner(4);
        assert!(seg.push("结束了。").is_empty());
        assert!(seg.push("\"").is_empty());
        assert_eq!(seg.flush(), vec!["结束了。\""]);
    }

    #[test]
    fn test_trivial_tail_dropped_on_flush() {
        let mut seg = scanner(4);
        assert!(seg.push("\" ").is_empty());
        assert!(seg.flush().is_empty());
    }

    #[test]
    fn test_flush_emits_tail() {
        let mut seg = scanner(20);
        assert!(seg.push("Hi there").is_empty());
        assert_eq!(seg.flush(), vec!["Hi there"]);
        assert!(seg.flush().is_empty());
    }

    #[test]
    fn test_english_paragraph() {
        let mut seg = scanner(12);
        let mut closed = Vec::new();
        for delta in ["The sky was clear", ". Birds sang", " loudly. The", " end"] {
            closed.extend(seg.push(delta));
        }
        closed.extend(seg.flush());
        assert_eq!(
            closed,
            vec!["The sky was clear.", "Birds sang loudly.", "The end"]
        );
    }
}
