use std::io::Write;

use env_logger::Env;

/// Local wall-clock time the way it is printed in log lines.
pub fn now_time() -> String {
    let now = chrono::Local::now();
    now.naive_local().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Installs the `env_logger` backend, `info` unless `RUST_LOG` says otherwise.
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "{} [{}] {}", now_time(), record.level(), record.args())
        })
        .init();
}
