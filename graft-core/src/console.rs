use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

fn use_color() -> bool {
    static USE_COLOR: OnceLock<bool> = OnceLock::new();
    *USE_COLOR.get_or_init(|| env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal())
}

fn is_tty() -> bool {
    static IS_TTY: OnceLock<bool> = OnceLock::new();
    *IS_TTY.get_or_init(|| io::stderr().is_terminal())
}

fn paint(code: &str, text: &str) -> String {
    if use_color() {
        format!("\u{1b}[{code}m{text}\u{1b}[0m")
    } else {
        text.to_string()
    }
}

fn dim(text: &str) -> String {
    paint("2", text)
}

fn green(text: &str) -> String {
    paint("32", text)
}

fn cyan(text: &str) -> String {
    paint("36", text)
}

fn yellow(text: &str) -> String {
    paint("33", text)
}

fn red(text: &str) -> String {
    paint("31", text)
}

pub fn elapsed_seconds() -> f32 {
    START_TIME
        .get()
        .map(|t| t.elapsed().as_secs_f32())
        .unwrap_or(0.0)
}

pub fn header(command: &str, version: &str) {
    START_TIME.get_or_init(Instant::now);
    eprintln!("{}", dim(&format!("graft {command} v{version}")));
    eprintln!();
}

pub fn step(message: &str) {
    if is_tty() {
        eprint!("\r\u{1b}[K{}\n", dim(message));
        let _ = io::stderr().flush();
    } else {
        eprintln!("{}", dim(message));
    }
}

/// Rewrites the current line; no-op when stderr is not a terminal.
pub fn progress(message: &str, resolved: usize, total: usize) {
    if is_tty() {
        eprint!(
            "\r\u{1b}[K{} {}",
            dim(message),
            cyan(&format!("[{resolved}/{total}]"))
        );
        let _ = io::stderr().flush();
    }
}

pub fn clear_line() {
    if is_tty() {
        eprint!("\r\u{1b}[K");
        let _ = io::stderr().flush();
    }
}

pub fn added(name: &str, version: &str, dev: bool) {
    let mark = green("+");
    let dev_label = if dev { dim(" (dev)") } else { String::new() };
    println!("{mark} {name}@{version}{dev_label}");
}

pub fn skipped(name: &str, version: &str) {
    let mark = yellow("~");
    println!("{mark} {name}@{version} {}", dim("(skipped: unsupported platform)"));
}

pub fn summary(count: usize, skipped: usize, seconds: f32) {
    println!();
    let time_str = if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else {
        format!("{seconds:.2}s")
    };
    let noun = if count == 1 { "package" } else { "packages" };
    let skipped_str = if skipped > 0 {
        format!(", {skipped} skipped")
    } else {
        String::new()
    };

    println!(
        "{count} {noun} resolved{skipped_str} {}",
        dim(&format!("[{time_str}]"))
    );
}

pub fn error(message: &str) {
    let tag = red("error");
    eprintln!("{tag} {message}");
}
