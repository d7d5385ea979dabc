mod config;
mod error;
mod report;
mod routes;

use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use config::{Action, Config, OutputFormat};
use error::{AppError, AppResult};
use report::{DestinationReport, ErrorReport, GatewayReport};
use routes::link::SysfsLinks;
use routes::parser::SystemRouteTable;
use routes::resolver::RouteResolver;
use routes::RouteTableReader;

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            let err = AppError::Config(e.to_string());
            eprintln!("{}: {}", err.user_message(), err);
            return ExitCode::from(err.exit_code());
        }
    };

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("configuration: {:?}", config);

    match run(&config) {
        Ok(output) => match writeln!(std::io::stdout().lock(), "{}", output.trim_end()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(AppError::Io(e), config.format),
        },
        Err(e) => fail(e, config.format),
    }
}

fn run(config: &Config) -> AppResult<String> {
    let links = SysfsLinks::new(&config.sysfs_net);
    let reader = SystemRouteTable::new(&config.ip_command, links.clone());

    match &config.action {
        Action::Destination => {
            let resolver = RouteResolver::new(reader, links);
            let ip = resolver.vpn_destination_ip()?;
            report::render_destination(&DestinationReport::new(ip), config.format)
        }
        Action::Gateway { interface } => {
            let resolver = RouteResolver::new(reader, links);
            let ip = resolver.vpn_local_gateway_ip(interface)?;
            report::render_gateway(&GatewayReport::new(interface, ip), config.format)
        }
        Action::Routes => {
            let snapshot = reader.list_routes()?;
            tracing::info!("{} route(s) on {}", snapshot.len(), snapshot.hostname);
            report::render_routes(&snapshot, config.format)
        }
    }
}

fn fail(err: AppError, format: OutputFormat) -> ExitCode {
    if err.is_retryable() {
        tracing::warn!("{}", err);
    } else {
        tracing::error!("{}", err);
    }

    let report = ErrorReport {
        error: err.kind().to_string(),
        message: err.user_message(),
        retryable: err.is_retryable(),
        route_count: err.route_count(),
    };
    match format {
        OutputFormat::Json => println!("{}", report::render_error(&report, format)),
        OutputFormat::Text => eprintln!("{}", report::render_error(&report, format)),
    }
    ExitCode::from(err.exit_code())
}
