use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use pingora_proxy::http_proxy_service_with_name;

use padpin::config::Config;
use padpin::service::http::build_http_service;

fn main() {
    // Initialize logging
    env_logger::init();

    // Read command-line arguments
    let opt = Opt::parse_args();

    // Load configuration with optional override
    let config = Config::load_yaml_with_opt_override(&opt).expect("Failed to load configuration");

    // Build the affinity router and proxy service
    log::info!("Loading routing table...");
    let http_service = build_http_service(&config).expect("Failed to initialize proxy service");

    // Create Pingora server with optional configuration
    let mut padpin_server = Server::new_with_opt_and_conf(Some(opt), config.pingora);

    // Create HTTP proxy service with name
    let mut http_service =
        http_proxy_service_with_name(&padpin_server.configuration, http_service, "padpin");

    // Add listeners from configuration
    log::info!("Adding listeners...");
    for listener in config.listeners.iter() {
        http_service.add_tcp(&listener.address.to_string());
    }

    // Bootstrapping and server startup
    log::info!("Bootstrapping...");
    padpin_server.bootstrap();

    log::info!("Bootstrapped. Adding Services...");
    padpin_server.add_service(http_service);

    log::info!("Starting Server...");
    padpin_server.run_forever();
}
