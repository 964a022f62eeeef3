use gpapply::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let cfg = config::load_or_init();
    let verbosity = if cli.quiet { 0 } else { 1 + cli.verbose };
    telemetry::init(telemetry::TelemetryConfig::new(
        verbosity,
        cfg.logging.clone(),
    ));

    if let Err(e) = cli::run(cli, &cfg) {
        tracing::error!("error: {e}");
        std::process::exit(1);
    }
}
