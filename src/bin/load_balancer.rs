use std::process;

use strata::lb::{LbConfig, LoadBalancer};
use strata::shutdown::RunFlag;

fn main() {
    let config = LbConfig::default();
    let running = RunFlag::new();
    if let Err(e) = running.install_signal_handlers() {
        eprintln!("Failed to install signal handlers: {}", e);
        process::exit(1);
    }

    println!("Starting Load Balancer on port {}", config.bind.port());
    println!("Backend servers:");
    for (index, (host, port)) in config.backends.iter().enumerate() {
        println!("  {}: {}:{}", index, host, port);
    }
    println!();

    let balancer = match LoadBalancer::bind(config) {
        Ok(balancer) => balancer,
        Err(e) => {
            eprintln!("Failed to bind load balancer socket: {}", e);
            process::exit(1);
        }
    };

    match balancer.local_addr() {
        Ok(addr) => println!("Load balancer listening on port {}...", addr.port()),
        Err(_) => println!("Load balancer listening..."),
    }

    if let Err(e) = balancer.run(&running) {
        eprintln!("Load balancer error: {}", e);
        process::exit(1);
    }

    println!("Load balancer shutdown complete");
}
