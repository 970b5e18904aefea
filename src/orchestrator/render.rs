//! Fixed transcript text: header, section titles, summary, trailer

use std::time::Duration;

use chrono::{DateTime, Local};

use super::selection::Language;
use crate::error::Error;

/// Width of centred banner lines
pub const LINE_WIDTH: usize = 82;

fn centred(text: &str) -> String {
    format!("{:-^width$}\n", text, width = LINE_WIDTH)
}

pub fn header(version: &str) -> String {
    centred(&format!(" {} v{} ", crate::version::NAME, version))
}

pub fn section_title(title: &str) -> String {
    centred(title)
}

/// Elapsed time and wall clock for a completed run
pub fn summary(language: Language, elapsed: Duration, now: DateTime<Local>) -> String {
    let secs = elapsed.as_secs();
    let (minutes, seconds) = (secs / 60, secs % 60);
    let stamp = now.format("%a %b %-d %H:%M:%S %Z %Y");

    let mut out = centred("");
    match language {
        Language::En => {
            out.push_str(&format!("Cost    Time          : {} min {} sec\n", minutes, seconds));
            out.push_str(&format!("Current Time          : {}\n", stamp));
        }
        Language::Zh => {
            out.push_str(&format!("花费          : {} 分 {} 秒\n", minutes, seconds));
            out.push_str(&format!("时间          : {}\n", stamp));
        }
    }
    out.push_str(&centred(""));
    out
}

pub fn interrupted(language: Language) -> String {
    match language {
        Language::En => "\n== test interrupted by user ==\n\n".to_string(),
        Language::Zh => "\n== 测试被用户中断 ==\n\n".to_string(),
    }
}

/// Inline diagnostic for a section that failed without ending the run
pub fn section_failed(label: &str, reason: &str) -> String {
    format!("✗ {} failed: {}\n", label, reason)
}

/// Diagnostic for an error that ends the run
pub fn fatal(error: &Error) -> String {
    let mut out = format!("\n✗ {}\n", error);
    if let Some(hint) = error.suggestion() {
        out.push_str(&format!("  hint: {}\n", hint));
    }
    out
}
