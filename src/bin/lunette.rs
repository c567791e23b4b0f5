// パス: src/bin/lunette.rs
// 役割: Binary entrypoint that launches the REPL
// 意図: Read the environment, install logging, and map session failures to an exit code
// 関連ファイル: src/repl/mod.rs, src/config.rs, src/logging.rs
use std::process::ExitCode;

use lunette::config::ReplConfig;

fn main() -> ExitCode {
    // 設定の警告を出せるよう、購読者を先に登録する
    lunette::logging::init(&ReplConfig::log_filter_from_env());
    let config = ReplConfig::from_env();
    match lunette::repl::run_repl(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}", e);
            ExitCode::FAILURE
        }
    }
}
