// パス: src/logging.rs
// 役割: Install the tracing subscriber used by the binary
// 意図: Diagnostics go to stderr so evaluated output on stdout stays untouched
// 関連ファイル: src/config.rs, src/bin/lunette.rs
//! ログ出力の初期化
//!
//! `tracing-subscriber` の `fmt` サブスクライバを `EnvFilter` 付きで登録する。
//! 既に登録済みなら何もしない（テストや組み込み側から何度呼んでもよい）。

use std::io;

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;

/// フィルタ文字列を解釈する。不正なら既定値を使う。
pub fn filter_from(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// サブスクライバを登録する。既に登録済みなら `false`。
pub fn init(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from(filter))
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}

/// テスト用: テストハーネスの出力へ流す。
#[cfg(test)]
pub fn init_test_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from("lunette=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 2 回目以降の登録は失敗を返すだけで panic しない。
    fn init_is_idempotent() {
        init_test_logger();
        assert!(!init("debug"));
        assert!(!init("not a [valid filter"));
    }

    #[test]
    fn bad_filter_falls_back() {
        let f = filter_from("lunette=notalevel");
        assert_eq!(f.to_string(), "warn");
        assert!(filter_from("lunette=debug").to_string().contains("debug"));
    }
}
