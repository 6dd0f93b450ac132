use std::process;

use strata::server::{Server, ServerConfig};
use strata::shutdown::RunFlag;

fn main() {
    let config = ServerConfig::default();
    let running = RunFlag::new();
    if let Err(e) = running.install_signal_handlers() {
        eprintln!("Failed to install signal handlers: {}", e);
        process::exit(1);
    }

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to bind server socket: {}", e);
            process::exit(1);
        }
    };

    match server.local_addr() {
        Ok(addr) => println!("Server listening on port {}...", addr.port()),
        Err(_) => println!("Server listening..."),
    }

    if let Err(e) = server.run(&running) {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }

    println!("Server shutdown complete");
}
