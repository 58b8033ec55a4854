use chrono::Local; // 用于获取本地时间
use log::LevelFilter; // 用于设置日志级别
use std::io::Write;

/// `-v` 的次数对应的日志级别
pub fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// 初始化日志，RUST_LOG 优先于 `-v`
pub fn init_logger(verbose: u8) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level_for(verbose))
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    // 测试中可能被重复初始化
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(9), LevelFilter::Trace);
        init_logger(0);
        init_logger(1);
    }
}
