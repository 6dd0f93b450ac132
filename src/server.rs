use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::cache::FileCache;
use crate::handler;
use crate::metrics::{self, Metrics};
use crate::queue::{self, TaskQueue};
use crate::shutdown::RunFlag;

// How long an acceptor waits for a connection before re-checking the run
// flag. A control point, not an I/O deadline.
pub(crate) const ACCEPT_POLL_MS: i32 = 250;

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub root: PathBuf,
    pub workers: usize,
    pub queue_capacity: usize,
    pub cache_capacity: usize,
    pub metrics_interval: Duration,
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8080".parse().unwrap(),
            root: PathBuf::from("."),
            workers: 10,
            queue_capacity: 100,
            cache_capacity: 50,
            metrics_interval: Duration::from_secs(10),
            backlog: 10,
        }
    }
}

// The static-content server: a bound listener plus the contexts shared with
// its worker pool. Everything is reachable through the struct, so tests can
// drive a server on an ephemeral port and inspect the cache and counters.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    pub cache: Arc<FileCache>,
    pub metrics: Arc<Metrics>,
    queue: Arc<TaskQueue<TcpStream>>,
}

impl Server {
    pub fn bind(config: ServerConfig) -> io::Result<Server> {
        let listener = listen(config.bind, config.backlog)?;
        Ok(Server {
            listener,
            cache: Arc::new(FileCache::with_capacity(config.cache_capacity)),
            metrics: Arc::new(Metrics::new()),
            queue: Arc::new(TaskQueue::with_capacity(config.queue_capacity)),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    // Runs the acceptor on the calling thread until shutdown: accepted
    // sockets are enqueued in accept order and dispatched FIFO to the
    // workers. Returns once the queue is closed and every worker and the
    // metrics reporter have been joined.
    pub fn run(&self, running: &RunFlag) -> io::Result<()> {
        let workers = {
            let root = self.config.root.clone();
            let cache = Arc::clone(&self.cache);
            let metrics = Arc::clone(&self.metrics);
            queue::spawn_workers(
                self.config.workers,
                Arc::clone(&self.queue),
                running.clone(),
                move |stream| handler::handle(stream, &root, &cache, &metrics),
            )
        };
        let reporter = metrics::spawn_reporter(
            Arc::clone(&self.metrics),
            Arc::clone(&self.cache),
            running.clone(),
            self.config.metrics_interval,
        );

        let result = self.accept_loop(running);

        // The loop may have ended on an accept error; make sure the periodic
        // threads see shutdown before they are joined.
        running.stop();
        self.queue.close();
        for worker in workers {
            let _ = worker.join();
        }
        let _ = reporter.join();
        result
    }

    fn accept_loop(&self, running: &RunFlag) -> io::Result<()> {
        while running.is_running() {
            if !listener_ready(&self.listener, ACCEPT_POLL_MS)? {
                continue;
            }
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if self.queue.push(stream).is_err() {
                        break;
                    }
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

// Builds a listening socket with SO_REUSEADDR and an explicit backlog, which
// std's TcpListener::bind cannot express.
pub(crate) fn listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

// Waits for the listener to become readable. EINTR reads as "not ready" so
// the caller re-checks its run flag.
pub(crate) fn listener_ready(listener: &TcpListener, timeout_ms: i32) -> io::Result<bool> {
    let mut fds = [libc::pollfd {
        fd: listener.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }];
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0 && fds[0].revents & libc::POLLIN != 0)
}
