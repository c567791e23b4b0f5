// パス: src/config.rs
// 役割: Resolve REPL settings from the process environment
// 意図: Keep every environment lookup in one place so the rest of the crate takes plain values
// 関連ファイル: src/repl/cmd.rs, src/repl/line_editor.rs, src/logging.rs, src/bin/lunette.rs
//! 環境変数から得る設定
//!
//! コマンドライン引数や設定ファイルは持たない。読み取る変数は次の通り。
//!
//! | 変数 | 既定値 |
//! |---|---|
//! | `LUNETTE_HISTORY_FILE` | `$HOME/.lunette_history`（`%USERPROFILE%` も可） |
//! | `LUNETTE_LOG` | `warn` |
//! | `LUNETTE_FORMAT_LIMIT` | `1000` |
//! | `LUNETTE_CONTINUATION` | `structured` |

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use tracing::warn;

use crate::continuation::Strategy;
use crate::format::DEFAULT_LIMIT;

pub const HISTORY_FILE_VAR: &str = "LUNETTE_HISTORY_FILE";
pub const LOG_VAR: &str = "LUNETTE_LOG";
pub const FORMAT_LIMIT_VAR: &str = "LUNETTE_FORMAT_LIMIT";
pub const CONTINUATION_VAR: &str = "LUNETTE_CONTINUATION";
pub const HISTORY_FILE_NAME: &str = ".lunette_history";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplConfig {
    /// `None` なら履歴はメモリ上だけに残る。
    pub history_path: Option<PathBuf>,
    pub log_filter: String,
    pub format_limit: usize,
    pub continuation: Strategy,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_path: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            format_limit: DEFAULT_LIMIT,
            continuation: Strategy::default(),
        }
    }
}

impl ReplConfig {
    /// プロセスの環境変数から設定を組み立てる。
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key))
    }

    /// ログのフィルタだけを先に読む。残りの設定の警告を取りこぼさないよう、
    /// 購読者の登録は `from_env` より前に行う。
    pub fn log_filter_from_env() -> String {
        Self::log_filter_from_lookup(|key| env::var_os(key))
    }

    pub fn log_filter_from_lookup<F>(lookup: F) -> String
    where
        F: Fn(&str) -> Option<OsString>,
    {
        lookup(LOG_VAR)
            .map(|v| v.to_string_lossy().trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }

    /// 任意の参照関数から設定を組み立てる。不正な値は警告して既定値に戻す。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.to_string_lossy().trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let history_path = lookup(HISTORY_FILE_VAR)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                lookup("HOME")
                    .or_else(|| lookup("USERPROFILE"))
                    .filter(|h| !h.is_empty())
                    .map(|home| PathBuf::from(home).join(HISTORY_FILE_NAME))
            });

        let log_filter = Self::log_filter_from_lookup(&lookup);

        let format_limit = match text(FORMAT_LIMIT_VAR) {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(value = %raw, "ignoring invalid {}", FORMAT_LIMIT_VAR);
                    DEFAULT_LIMIT
                }
            },
        };

        let continuation = match text(CONTINUATION_VAR) {
            None => Strategy::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!("{}", e);
                Strategy::default()
            }),
        };

        Self {
            history_path,
            log_filter,
            format_limit,
            continuation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_of(vars: &[(&str, &str)]) -> ReplConfig {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        ReplConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(config_of(&[]), ReplConfig::default());
    }

    #[test]
    /// 明示した履歴ファイルがホームより優先される。
    fn history_path_resolution() {
        let c = config_of(&[("HOME", "/home/u")]);
        assert_eq!(c.history_path, Some(PathBuf::from("/home/u").join(".lunette_history")));
        let c = config_of(&[("USERPROFILE", "C:/Users/u")]);
        assert_eq!(
            c.history_path,
            Some(PathBuf::from("C:/Users/u").join(".lunette_history"))
        );
        let c = config_of(&[("HOME", "/home/u"), (HISTORY_FILE_VAR, "/tmp/h.txt")]);
        assert_eq!(c.history_path, Some(PathBuf::from("/tmp/h.txt")));
    }

    #[test]
    fn numeric_and_strategy_values() {
        let c = config_of(&[
            (FORMAT_LIMIT_VAR, "25"),
            (CONTINUATION_VAR, "suffix"),
            (LOG_VAR, "lunette=debug"),
        ]);
        assert_eq!(c.format_limit, 25);
        assert_eq!(c.continuation, Strategy::Suffix);
        assert_eq!(c.log_filter, "lunette=debug");
    }

    #[test]
    /// 解釈できない値は既定値に戻る。
    fn invalid_values_fall_back() {
        let c = config_of(&[(FORMAT_LIMIT_VAR, "lots"), (CONTINUATION_VAR, "regex")]);
        assert_eq!(c.format_limit, DEFAULT_LIMIT);
        assert_eq!(c.continuation, Strategy::Structured);
        let c = config_of(&[(FORMAT_LIMIT_VAR, "0")]);
        assert_eq!(c.format_limit, DEFAULT_LIMIT);
    }

    #[test]
    /// ログのフィルタは他の設定を解釈する前に単独で読める。
    fn log_filter_is_read_on_its_own() {
        let vars: HashMap<&str, OsString> = [
            (LOG_VAR, OsString::from(" lunette=debug ")),
            (FORMAT_LIMIT_VAR, OsString::from("lots")),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| vars.get(key).cloned();
        let filter = ReplConfig::log_filter_from_lookup(lookup);
        assert_eq!(filter, "lunette=debug");
        assert_eq!(ReplConfig::from_lookup(lookup).log_filter, filter);
        assert_eq!(ReplConfig::log_filter_from_lookup(|_| None), DEFAULT_LOG_FILTER);
    }
}
