//! Ordered output sink and consumer callbacks

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use super::state::RunStatus;

/// Consumer of a run
pub trait RunObserver: Send + Sync {
    /// Complete lines, plus a final partial line at stream end
    fn on_output(&self, text: &str);

    fn on_progress(&self, _current: usize, _total: usize, _label: &str) {}

    fn on_done(&self, _status: &RunStatus) {}
}

/// Observer that ignores everything
#[cfg(test)]
pub struct NullObserver;

#[cfg(test)]
impl RunObserver for NullObserver {
    fn on_output(&self, _text: &str) {}
}

/// Terminal observer: transcript to stdout, progress to stderr
pub struct ConsoleObserver {
    show_progress: bool,
}

impl ConsoleObserver {
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_output(&self, text: &str) {
        let _stdout = crate::capture::hold_stdout();
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn on_progress(&self, current: usize, total: usize, label: &str) {
        if self.show_progress {
            eprintln!("[{}/{}] {}", current, total, label);
        }
    }
}

struct Buffer {
    text: String,
    limit: usize,
    dropped: usize,
}

impl Buffer {
    /// Drop the oldest text, cutting at a line boundary where possible
    fn trim(&mut self) {
        if self.text.len() <= self.limit {
            return;
        }
        let mut excess = self.text.len() - self.limit;
        while !self.text.is_char_boundary(excess) {
            excess += 1;
        }
        let cut = match self.text[excess..].find('\n') {
            Some(offset) => excess + offset + 1,
            None => excess,
        };
        self.text.drain(..cut);
        self.dropped += cut;
    }
}

/// Append-only, bounded, mutex-guarded transcript of a run.
///
/// Every append is forwarded to the observer while the lock is held, so
/// the observer sees exactly the transcript order.
pub struct OutputSink {
    buffer: Mutex<Buffer>,
    observer: Arc<dyn RunObserver>,
}

impl OutputSink {
    pub fn new(limit: usize, observer: Arc<dyn RunObserver>) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                text: String::new(),
                limit,
                dropped: 0,
            }),
            observer,
        }
    }

    pub fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut buffer = self.buffer.lock();
        buffer.text.push_str(text);
        buffer.trim();
        self.observer.on_output(text);
    }

    /// Retained text
    pub fn contents(&self) -> String {
        self.buffer.lock().text.clone()
    }

    /// Bytes discarded to stay under the limit
    pub fn dropped_bytes(&self) -> usize {
        self.buffer.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<String>>);

    impl RunObserver for Recorder {
        fn on_output(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    #[test]
    fn test_forwards_in_order() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let sink = OutputSink::new(1024, recorder.clone());
        sink.append("one\n");
        sink.append("");
        sink.append("two\n");

        assert_eq!(*recorder.0.lock(), vec!["one\n", "two\n"]);
        assert_eq!(sink.contents(), "one\ntwo\n");
    }

    #[test]
    fn test_trims_at_line_boundary() {
        let sink = OutputSink::new(10, Arc::new(NullObserver));
        sink.append("aaaa\n");
        sink.append("bbbb\n");
        sink.append("cc\n");

        assert_eq!(sink.contents(), "bbbb\ncc\n");
        assert_eq!(sink.dropped_bytes(), 5);
    }

    #[test]
    fn test_trim_without_newline_respects_utf8() {
        let sink = OutputSink::new(4, Arc::new(NullObserver));
        sink.append("测试测试");
        let kept = sink.contents();
        assert!(kept.len() <= 6);
        assert!(kept.ends_with('试'));
    }
}
