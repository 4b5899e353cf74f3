//! 流式输出缓冲
//!
//! 攒够字符数、遇到换行或距上次刷新超过时限时（先到先得）吐出一段文本，
//! 避免每个分片都写一条 ai_delta 事件。

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct DeltaBuffer {
    buf: String,
    max_chars: usize,
    max_age: Duration,
    last_flush: Instant,
}

impl DeltaBuffer {
    pub fn new(max_chars: usize, max_age: Duration) -> Self {
        Self::starting_at(max_chars, max_age, Instant::now())
    }

    pub fn starting_at(max_chars: usize, max_age: Duration, now: Instant) -> Self {
        Self {
            buf: String::new(),
            max_chars: max_chars.max(1),
            max_age,
            last_flush: now,
        }
    }

    /// 追加一段增量，满足任一刷新条件时返回需要发出的文本
    pub fn push(&mut self, text: &str, now: Instant) -> Option<String> {
        self.buf.push_str(text);
        if self.buf.is_empty() {
            return None;
        }

        let should_flush = self.buf.chars().count() >= self.max_chars
            || self.buf.contains('\n')
            || now.saturating_duration_since(self.last_flush) >= self.max_age;

        if should_flush {
            self.last_flush = now;
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    /// 流结束时取出剩余文本
    pub fn finish(&mut self) -> Option<String> {
        (!self.buf.is_empty()).then(|| std::mem::take(&mut self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(start: Instant) -> DeltaBuffer {
        DeltaBuffer::starting_at(10, Duration::from_millis(800), start)
    }

    #[test]
    fn test_flushes_on_char_threshold() {
        let start = Instant::now();
        let mut buf = buffer(start);
        assert_eq!(buf.push("一二三四五", start), None);
        assert_eq!(buf.push("六七八九十", start).as_deref(), Some("一二三四五六七八九十"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_flushes_on_newline() {
        let start = Instant::now();
        let mut buf = buffer(start);
        assert_eq!(buf.push("[{\n", start).as_deref(), Some("[{\n"));
    }

    #[test]
    fn test_flushes_after_max_age() {
        let start = Instant::now();
        let mut buf = buffer(start);
        assert_eq!(buf.push("ab", start + Duration::from_millis(300)), None);
        assert_eq!(
            buf.push("c", start + Duration::from_millis(800)).as_deref(),
            Some("abc")
        );
        // 时间窗口从最近一次刷新重新计算
        assert_eq!(buf.push("d", start + Duration::from_millis(1000)), None);
        assert_eq!(buf.finish().as_deref(), Some("d"));
    }

    #[test]
    fn test_empty_push_never_flushes() {
        let start = Instant::now();
        let mut buf = buffer(start);
        assert_eq!(buf.push("", start + Duration::from_secs(5)), None);
        assert_eq!(buf.finish(), None);
    }
}
