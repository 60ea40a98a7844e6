use std::process::ExitCode;

use clap::Parser;

use lumenfe::settings::EditorSettings;
use lumenfe::{cli, i18n, log_info, logger};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);

    // Initialize the internationalization system
    i18n::init();
    let settings = EditorSettings::load();
    let language = if settings.language.is_empty() {
        i18n::detect_system_language()
    } else {
        settings.language.clone()
    };
    i18n::set_language(&language);

    log_info!("LumenFE {} ({} transport)", env!("CARGO_PKG_VERSION"), settings.transport.as_str());
    cli::run(args, settings).await
}
