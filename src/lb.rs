use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::server::{self, ACCEPT_POLL_MS};
use crate::shutdown::RunFlag;

const PROXY_BUFFER_SIZE: usize = 4096;
const PROXY_POLL_TIMEOUT_MS: i32 = 1000;
const BACKEND_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

static SERVICE_UNAVAILABLE: Lazy<Vec<u8>> =
    Lazy::new(|| error_response("503 Service Unavailable"));
static BAD_GATEWAY: Lazy<Vec<u8>> = Lazy::new(|| error_response("502 Bad Gateway"));

// How incoming connections are mapped to backends. Both policies are
// implemented; the executable picks one when it builds its config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    RoundRobin,
    LeastConnections,
}

#[derive(Clone, Debug)]
pub struct Backend {
    pub host: String,
    pub port: u16,
    pub active: bool,
    pub request_count: u64,
}

struct PoolState {
    backends: Vec<Backend>,
    cursor: usize,
}

// The backend table. One lock guards active flags, request counts, and the
// round-robin cursor so a selection sees all three consistently.
pub struct BackendPool {
    state: Mutex<PoolState>,
    policy: Policy,
}

impl BackendPool {
    // Backends start active; the first health sweep corrects the table.
    pub fn new(addrs: &[(String, u16)], policy: Policy) -> BackendPool {
        BackendPool {
            state: Mutex::new(PoolState {
                backends: addrs
                    .iter()
                    .map(|(host, port)| Backend {
                        host: host.clone(),
                        port: *port,
                        active: true,
                        request_count: 0,
                    })
                    .collect(),
                cursor: 0,
            }),
            policy,
        }
    }

    pub fn select(&self) -> Option<usize> {
        match self.policy {
            Policy::RoundRobin => self.select_round_robin(),
            Policy::LeastConnections => self.select_least_connections(),
        }
    }

    // Advances the cursor at most one full sweep looking for an active
    // backend. On success the selected backend's request count is bumped and
    // the cursor moves past the selected index.
    pub fn select_round_robin(&self) -> Option<usize> {
        let mut state = self.state.lock();
        let n = state.backends.len();
        if n == 0 {
            return None;
        }
        let mut attempts = 0;
        while attempts < n {
            let i = state.cursor;
            state.cursor = (i + 1) % n;
            if state.backends[i].active {
                state.backends[i].request_count += 1;
                return Some(i);
            }
            attempts += 1;
        }
        None
    }

    // Picks the active backend with the fewest recorded requests, lowest
    // index on ties.
    pub fn select_least_connections(&self) -> Option<usize> {
        let mut state = self.state.lock();
        let mut selected = None;
        let mut min_requests = u64::MAX;
        for (i, backend) in state.backends.iter().enumerate() {
            if backend.active && backend.request_count < min_requests {
                min_requests = backend.request_count;
                selected = Some(i);
            }
        }
        if let Some(i) = selected {
            state.backends[i].request_count += 1;
        }
        selected
    }

    pub fn set_active(&self, index: usize, active: bool) {
        let mut state = self.state.lock();
        if let Some(backend) = state.backends.get_mut(index) {
            backend.active = active;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Backend> {
        self.state.lock().backends.clone()
    }

    fn addr_of(&self, index: usize) -> Option<(String, u16)> {
        let state = self.state.lock();
        state
            .backends
            .get(index)
            .map(|b| (b.host.clone(), b.port))
    }
}

pub struct LbConfig {
    pub bind: SocketAddr,
    pub backlog: i32,
    pub backends: Vec<(String, u16)>,
    pub policy: Policy,
    pub health_interval: Duration,
}

impl Default for LbConfig {
    fn default() -> Self {
        LbConfig {
            bind: "0.0.0.0:8085".parse().unwrap(),
            backlog: 100,
            backends: (8081..=8084)
                .map(|port| ("127.0.0.1".to_string(), port))
                .collect(),
            policy: Policy::RoundRobin,
            health_interval: Duration::from_secs(10),
        }
    }
}

pub struct LoadBalancer {
    listener: TcpListener,
    health_interval: Duration,
    pub pool: Arc<BackendPool>,
}

impl LoadBalancer {
    pub fn bind(config: LbConfig) -> io::Result<LoadBalancer> {
        let listener = server::listen(config.bind, config.backlog)?;
        Ok(LoadBalancer {
            listener,
            health_interval: config.health_interval,
            pool: Arc::new(BackendPool::new(&config.backends, config.policy)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    // Accept loop: one detached thread per connection. An initial health
    // sweep runs before the first accept so selection starts from probed
    // state rather than the static table.
    pub fn run(&self, running: &RunFlag) -> io::Result<()> {
        health_check(&self.pool);
        print_backend_stats(&self.pool);
        let checker = spawn_health_checker(
            Arc::clone(&self.pool),
            running.clone(),
            self.health_interval,
        );

        let result = self.accept_loop(running);

        // The loop may have ended on an accept error; make sure the health
        // checker sees shutdown before it is joined.
        running.stop();
        let _ = checker.join();
        result
    }

    fn accept_loop(&self, running: &RunFlag) -> io::Result<()> {
        while running.is_running() {
            if !server::listener_ready(&self.listener, ACCEPT_POLL_MS)? {
                continue;
            }
            match self.listener.accept() {
                Ok((client, peer)) => {
                    println!("New client connected: {}", peer);
                    let pool = Arc::clone(&self.pool);
                    thread::spawn(move || handle_client(&pool, client));
                }
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    continue;
                }
                Err(e) => {
                    if running.is_running() {
                        eprintln!("Accept failed: {}", e);
                    }
                }
            }
        }
        Ok(())
    }
}

// Serves one client: select a backend, connect, relay until either side
// closes. Both sockets are owned here, so they close exactly once on every
// path out.
pub fn handle_client(pool: &BackendPool, mut client: TcpStream) {
    let index = match pool.select() {
        Some(index) => index,
        None => {
            println!("No active backends available");
            let _ = client.write_all(&SERVICE_UNAVAILABLE);
            return;
        }
    };

    let (host, port) = match pool.addr_of(index) {
        Some(addr) => addr,
        None => return,
    };
    println!("Selected backend {} ({}:{})", index, host, port);

    let mut backend = match connect_backend(&host, port) {
        Ok(stream) => stream,
        Err(e) => {
            println!("Failed to connect to backend {}: {}", index, e);
            let _ = client.write_all(&BAD_GATEWAY);
            return;
        }
    };

    proxy(&mut client, &mut backend);
    println!("Client disconnected from backend {}", index);
}

fn connect_backend(host: &str, port: u16) -> io::Result<TcpStream> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid backend address"))?;
    let stream = TcpStream::connect_timeout(&SocketAddr::new(ip, port), BACKEND_TIMEOUT)?;
    stream.set_read_timeout(Some(BACKEND_TIMEOUT))?;
    stream.set_write_timeout(Some(BACKEND_TIMEOUT))?;
    Ok(stream)
}

// Bidirectional byte relay, opaque to the protocol. Waits on readability of
// both sockets with a 1-second poll so shutdown and peer closes are noticed;
// EINTR retries the wait. Hangup and error read as readable so the following
// read observes EOF.
pub fn proxy(client: &mut TcpStream, backend: &mut TcpStream) {
    let mut buffer = [0u8; PROXY_BUFFER_SIZE];
    let readable = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

    loop {
        let mut fds = [
            libc::pollfd {
                fd: client.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: backend.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let rc =
            unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, PROXY_POLL_TIMEOUT_MS) };
        if rc < 0 {
            if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break;
        }
        if rc == 0 {
            continue;
        }

        if fds[0].revents & readable != 0 && !relay(client, backend, &mut buffer) {
            break;
        }
        if fds[1].revents & readable != 0 && !relay(backend, client, &mut buffer) {
            break;
        }
    }
}

// Moves one read's worth of bytes. False ends the proxy loop: the peer
// closed, the read failed, or the write could not take the exact count.
fn relay(from: &mut TcpStream, to: &mut TcpStream, buffer: &mut [u8]) -> bool {
    match from.read(buffer) {
        Ok(0) | Err(_) => false,
        Ok(n) => to.write_all(&buffer[..n]).is_ok(),
    }
}

// One probe sweep: a TCP connect with short timeouts decides each backend's
// active flag.
pub fn health_check(pool: &BackendPool) {
    println!("Performing health check on backends...");
    for (index, backend) in pool.snapshot().iter().enumerate() {
        let up = probe(&backend.host, backend.port);
        pool.set_active(index, up);
        println!(
            "Backend {}:{} is {}",
            backend.host,
            backend.port,
            if up { "UP" } else { "DOWN" }
        );
    }
}

fn probe(host: &str, port: u16) -> bool {
    let ip: IpAddr = match host.parse() {
        Ok(ip) => ip,
        Err(_) => return false,
    };
    TcpStream::connect_timeout(&SocketAddr::new(ip, port), PROBE_TIMEOUT).is_ok()
}

pub fn print_backend_stats(pool: &BackendPool) {
    println!("\n=== Backend Statistics ===");
    for (index, backend) in pool.snapshot().iter().enumerate() {
        println!(
            "Backend {}: {}:{} - {} - Requests: {}",
            index,
            backend.host,
            backend.port,
            if backend.active { "ACTIVE" } else { "INACTIVE" },
            backend.request_count
        );
    }
    println!("========================\n");
}

pub fn spawn_health_checker(
    pool: Arc<BackendPool>,
    running: RunFlag,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while running.sleep_while_running(interval) {
            health_check(&pool);
            print_backend_stats(&pool);
        }
    })
}

fn error_response(status: &str) -> Vec<u8> {
    let body = format!(
        "<!DOCTYPE html><html><body><h1>{}</h1></body></html>",
        status
    );
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
        status,
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body.as_bytes());
    response
}
