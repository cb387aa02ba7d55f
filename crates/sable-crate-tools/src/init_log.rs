use std::io::Write;

use env_logger::fmt::Formatter;

fn format_record(buf: &mut Formatter, record: &log::Record) -> std::io::Result<()> {
    let info_style =
        buf.default_level_style(log::Level::Info).fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
    let warn_style =
        buf.default_level_style(log::Level::Warn).fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
    let error_style =
        buf.default_level_style(log::Level::Error).fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

    let level_style = match record.level() {
        log::Level::Info => info_style,
        log::Level::Warn => warn_style,
        log::Level::Error => error_style,
        _ => buf.default_level_style(record.level()),
    };
    let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

    let line = record.line().unwrap_or(!0);
    let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
    let time = chrono::Local::now().format("%H:%M:%S%.3f");
    let level = record.level();
    let module = record.module_path().unwrap_or("");

    writeln!(
        buf,
        "{level_style}[{time}] {level}: {}{level_style:#}\n\t {grey_style}In {module} At {file}:{line}{grey_style:#}",
        record.args()
    )
}

/// 初始化全局日志
///
/// `level` 来自 driver 的配置，例如 `"info"`、`"debug"`；无法解析时退回 `Info`
pub fn init_log(level: &str) {
    let filter = level.parse::<log::LevelFilter>().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new().format(format_record).filter(None, filter).init();
}

/// 测试使用的日志初始化
///
/// 多个测试会重复调用，因此使用 `try_init`，重复初始化直接忽略
pub fn init_test_log() {
    let _ = env_logger::Builder::new()
        .format(format_record)
        .filter(None, log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
