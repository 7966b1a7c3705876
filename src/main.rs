use std::path::PathBuf;
use std::process::ExitCode;

use fixlens_lib::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(image) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: fixlens <photo-of-broken-object>");
        return ExitCode::from(2);
    };

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    match fixlens_lib::run(&image, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
