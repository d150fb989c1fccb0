//! # 终端输出
//!
//! 统一的带颜色前缀的诊断输出。进度条运行期间的输出需经
//! `ProgressBar::suspend` 调用这些函数。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs`, `main.rs` 使用
//! - 使用 `colored` crate

use colored::Colorize;
use std::fmt::Display;
use std::path::Path;

pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

pub fn print_skip(msg: &str) {
    println!("{} {}", "[SKIP]".dimmed(), msg);
}

pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印写出的文件
pub fn print_written(what: &str, path: &Path) {
    println!(
        "{} {} {} {}",
        "[OK]".green().bold(),
        what.dimmed(),
        "->".cyan(),
        path.display()
    );
}

/// 打印对齐的 `名称: 值` 行
pub fn print_field(name: &str, value: impl Display) {
    println!("    {:<22} {}", format!("{}:", name).dimmed(), value);
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

pub fn print_separator() {
    println!("{}", "─".repeat(60).dimmed());
}
