use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use wttr_gate::config::{AppConfig, Args};
use wttr_gate::runtime::modes::run_server;
use wttr_gate::system::{init_logging, install_panic_hook};

#[actix_web::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    if args.print_sample_config {
        print!("{}", AppConfig::generate_sample_config());
        return ExitCode::SUCCESS;
    }

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        println!("Configuration OK");
        return ExitCode::SUCCESS;
    }

    let _guards = match init_logging(&config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            return ExitCode::FAILURE;
        }
    };
    install_panic_hook(config.paths.log_dir());

    info!(
        "wttr-gate {} starting (root {})",
        env!("CARGO_PKG_VERSION"),
        config.paths.root_dir.display()
    );

    match run_server(Arc::new(config)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<wttr_gate::errors::WttrError>() {
                Some(err) => eprintln!("{}", err.format_colored()),
                None => eprintln!("Server error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
