//! MVT renderer binary
//!
//! Usage: `mvt_app [config-path]`. Without a path the defaults are used.

use mvt_renderer::prelude::*;
use std::process::ExitCode;

fn run() -> Result<(), AppError> {
    let config_path = std::env::args().nth(1);
    let config = match &config_path {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None => ApplicationConfig::default(),
    };
    mvt_renderer::foundation::logging::init_with_level(&config.engine.log_level);
    match &config_path {
        Some(path) => log::info!("Loaded configuration from {}", path),
        None => log::info!("Using default configuration"),
    }

    if let Ok(cwd) = std::env::current_dir() {
        ShaderCompiler::add_search_path(cwd.join("EngineAssets").join("Shaders"));
    }

    let mut app = Application::new(config)?;
    app.run()
}

fn main() -> ExitCode {
    let result = run();
    ShaderCompiler::shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
