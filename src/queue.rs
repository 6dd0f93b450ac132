use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::shutdown::RunFlag;

// Bounded FIFO shared between one producer (the acceptor) and a fixed pool
// of consumers. The ring stores owned values, so anything left in a slot is
// dropped with the queue and sockets never leak.
pub struct TaskQueue<T> {
    state: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct Ring<T> {
    slots: Vec<Option<T>>,
    front: usize,
    rear: usize,
    count: usize,
    closed: bool,
}

impl<T> TaskQueue<T> {
    pub fn with_capacity(capacity: usize) -> TaskQueue<T> {
        assert!(capacity > 0, "task queue capacity must be at least 1");
        TaskQueue {
            state: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                front: 0,
                rear: 0,
                count: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    // Blocks while the queue is full. Hands the task back if the queue has
    // been closed in the meantime.
    pub fn push(&self, task: T) -> Result<(), T> {
        let mut ring = self.state.lock();
        while ring.count == ring.slots.len() && !ring.closed {
            self.not_full.wait(&mut ring);
        }
        if ring.closed {
            return Err(task);
        }
        let rear = ring.rear;
        ring.slots[rear] = Some(task);
        ring.rear = (rear + 1) % ring.slots.len();
        ring.count += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    // Blocks while the queue is empty and open. Returns tasks in FIFO order;
    // after close(), drains what is left and then returns None.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.state.lock();
        while ring.count == 0 {
            if ring.closed {
                return None;
            }
            self.not_empty.wait(&mut ring);
        }
        let front = ring.front;
        let task = ring.slots[front].take();
        ring.front = (front + 1) % ring.slots.len();
        ring.count -= 1;
        self.not_full.notify_one();
        task
    }

    // Marks the queue closed and wakes every waiter so no producer or
    // consumer stays blocked across shutdown.
    pub fn close(&self) {
        let mut ring = self.state.lock();
        ring.closed = true;
        drop(ring);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().slots.len()
    }
}

// Spawns `count` worker threads consuming from `queue`. Each worker loops:
// pop, check the run flag (dropping the task closes its socket when shutdown
// raced the dequeue), otherwise hand the task to `work`. Workers exit when
// the queue is closed and drained.
pub fn spawn_workers<T, F>(
    count: usize,
    queue: Arc<TaskQueue<T>>,
    running: RunFlag,
    work: F,
) -> Vec<JoinHandle<()>>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    (0..count)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let running = running.clone();
            let work = Arc::clone(&work);
            thread::spawn(move || {
                println!("Worker thread {} started", id);
                while let Some(task) = queue.pop() {
                    if !running.is_running() {
                        drop(task);
                        break;
                    }
                    work(task);
                }
                println!("Worker thread {} stopping", id);
            })
        })
        .collect()
}
