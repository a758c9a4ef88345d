//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `kidspeak_core` linkage.
//! - Print the resolved configuration and schema state for local checks.

use kidspeak_core::db::open_db;
use kidspeak_core::sync::latest_change_seq;
use kidspeak_core::CoreConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("kidspeak_core ping={}", kidspeak_core::ping());
    println!("kidspeak_core version={}", kidspeak_core::core_version());

    let config = CoreConfig::from_env();
    println!("db_path={}", config.db_path.display());
    println!("storage_root={}", config.storage_root.display());
    println!("public_base_url={}", config.public_base_url);
    println!("feed_head_size={}", config.feed_head_size);

    match open_db(&config.db_path).map_err(|err| err.to_string()).and_then(|conn| {
        latest_change_seq(&conn).map_err(|err| err.to_string())
    }) {
        Ok(seq) => {
            println!("change_log_head={seq}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("db check failed: {err}");
            ExitCode::FAILURE
        }
    }
}
