use env_logger::fmt::Formatter;
use log::{Record, Level};
use std::io::Write;
use chrono::Local;
use colored::*;

pub fn init_logger(log_level: &str) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    builder.format(format_log);

    // Request-level chatter from actix stays at warn.
    builder.filter(Some("actix_server"), log::LevelFilter::Warn);
    builder.filter(Some("actix_web"), log::LevelFilter::Warn);
    builder.filter(Some("reqwest"), log::LevelFilter::Warn);
    builder.filter(Some("hyper_util"), log::LevelFilter::Warn);

    // Keeps the first logger if one is already installed.
    let _ = builder.try_init();
}

fn format_log(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let level_style = match record.level() {
        Level::Error => "ERROR".truecolor(255, 0, 0),
        Level::Warn => "WARN".truecolor(255, 165, 0),
        Level::Info => "INFO".truecolor(0, 255, 255),
        Level::Debug => "DEBUG".truecolor(138, 43, 226),
        Level::Trace => "TRACE".truecolor(255, 105, 180),
    };

    writeln!(
        buf,
        "{} [{}] {} - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level_style,
        record.target().dimmed(),
        record.args()
    )
}

pub fn print_banner(host: &str, port: u16) {
    let orange = (255, 165, 0);
    let cyan = (0, 230, 230);

    let border = "=".repeat(60);
    println!("{}", border.truecolor(orange.0, orange.1, orange.2));
    println!("{}", "   DevOps Copilot".truecolor(orange.0, orange.1, orange.2).bold());
    println!("{}", "   Production-grade DevOps code from a prompt".truecolor(cyan.0, cyan.1, cyan.2));
    println!();
    println!("{}", format!("   - Address: http://{}:{}", host, port).cyan());
    println!("{}", "   - Health:  /health".cyan());
    println!("{}", border.truecolor(orange.0, orange.1, orange.2));
}
