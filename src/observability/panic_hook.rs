//! Panic hook that prints a crash report.
//!
//! The report names the file and phase the panicking thread was in, how
//! many files were done, and where the panic happened.

use super::context::{get_current_context, get_progress, InstrumentContext};
use std::panic::PanicHookInfo;
use tracing::Span;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const RULE: &str = "════════════════════════════════════════════════════════════════════════════════";

/// Install the crash report hook. Call before any file is processed.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        print_crash_report(info);
    }));
}

fn print_crash_report(info: &PanicHookInfo<'_>) {
    let context = get_current_context();
    let (processed, total) = get_progress();
    eprintln!();
    eprintln!("{}", render_report(info, &context, processed, total));
}

fn render_report(
    info: &PanicHookInfo<'_>,
    context: &InstrumentContext,
    processed: usize,
    total: usize,
) -> String {
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
    let mut lines = header_lines();
    lines.push(format!("PANIC: {}", truncate(&extract_panic_message(info), 72)));
    if let Some(location) = location {
        lines.push(format!("Location: {}", truncate(&location, 70)));
    }
    lines.extend(context_lines(context, processed, total));
    lines.extend(backtrace_lines());
    lines.join("\n")
}

fn header_lines() -> Vec<String> {
    vec![
        RULE.to_string(),
        "COVERON CRASH REPORT".to_string(),
        format!("Version: {VERSION}"),
        format!("Platform: {}", std::env::consts::OS),
        RULE.to_string(),
    ]
}

fn context_lines(context: &InstrumentContext, processed: usize, total: usize) -> Vec<String> {
    let mut lines = vec![RULE.to_string(), "OPERATION CONTEXT:".to_string()];

    match &context.phase {
        Some(phase) => lines.push(format!("  Phase: {phase}")),
        None => lines.push("  Phase: (not set, crash happened before instrumentation)".to_string()),
    }

    if let Some(metadata) = Span::current().metadata() {
        lines.push(format!("  Span: {}", truncate(metadata.name(), 70)));
    }

    if let Some(file) = &context.current_file {
        lines.push(format!("  File: {}", truncate(&file.display().to_string(), 70)));
    }

    if total > 0 {
        let pct = processed * 100 / total;
        lines.push(format!("  Progress: {processed} / {total} files ({pct}%)"));
    }
    lines
}

fn backtrace_lines() -> Vec<String> {
    if std::env::var("RUST_BACKTRACE").is_ok() {
        vec![
            RULE.to_string(),
            "STACK TRACE:".to_string(),
            std::backtrace::Backtrace::capture().to_string(),
        ]
    } else {
        vec![
            RULE.to_string(),
            "Run with RUST_BACKTRACE=1 for stack trace".to_string(),
        ]
    }
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{keep}...")
}
