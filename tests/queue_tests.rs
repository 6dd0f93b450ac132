use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use strata::queue::{self, TaskQueue};
use strata::shutdown::RunFlag;

#[cfg(test)]
mod fifo_tests {
    use super::*;

    #[test]
    fn test_tasks_come_out_in_insertion_order() {
        let queue = TaskQueue::with_capacity(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }

        let drained: Vec<i32> = (0..5).map(|_| queue.pop().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4], "queue must be FIFO");
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let queue = TaskQueue::with_capacity(3);
        queue.push(0).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(0));

        // The ring indices wrap here; order must survive it.
        queue.push(3).unwrap();
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn test_count_stays_within_bounds() {
        let queue = TaskQueue::with_capacity(4);
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());

        for i in 0..4 {
            queue.push(i).unwrap();
            assert!(queue.len() <= queue.capacity(), "count must never exceed capacity");
        }
        assert_eq!(queue.len(), 4);

        for _ in 0..4 {
            queue.pop().unwrap();
        }
        assert!(queue.is_empty());
    }
}

#[cfg(test)]
mod blocking_tests {
    use super::*;

    #[test]
    fn test_producer_waits_while_full() {
        let queue = Arc::new(TaskQueue::with_capacity(2));
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        let producer_queue = Arc::clone(&queue);
        let producer = thread::spawn(move || producer_queue.push(3));

        // Give the producer time to block on the not-full wait.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(queue.len(), 2, "producer must wait instead of dropping the task");

        assert_eq!(queue.pop(), Some(1));
        producer.join().unwrap().unwrap();

        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3), "the delayed task must still arrive in order");
    }

    #[test]
    fn test_consumer_waits_while_empty() {
        let queue = Arc::new(TaskQueue::with_capacity(2));

        let consumer_queue = Arc::clone(&queue);
        let consumer = thread::spawn(move || consumer_queue.pop());

        thread::sleep(Duration::from_millis(100));
        queue.push(7).unwrap();

        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue: Arc<TaskQueue<i32>> = Arc::new(TaskQueue::with_capacity(2));

        let consumer_queue = Arc::clone(&queue);
        let consumer = thread::spawn(move || consumer_queue.pop());

        thread::sleep(Duration::from_millis(100));
        queue.close();

        assert_eq!(consumer.join().unwrap(), None, "close must release waiting consumers");
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(TaskQueue::with_capacity(1));
        queue.push(1).unwrap();

        let producer_queue = Arc::clone(&queue);
        let producer = thread::spawn(move || producer_queue.push(2));

        thread::sleep(Duration::from_millis(100));
        queue.close();

        assert_eq!(producer.join().unwrap(), Err(2), "close must hand the task back");
    }

    #[test]
    fn test_closed_queue_drains_then_ends() {
        let queue = TaskQueue::with_capacity(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.close();

        assert_eq!(queue.push(3), Err(3), "a closed queue accepts nothing new");
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }
}

#[cfg(test)]
mod worker_pool_tests {
    use super::*;

    #[test]
    fn test_workers_drain_every_task() {
        let queue = Arc::new(TaskQueue::with_capacity(16));
        let running = RunFlag::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let workers = queue::spawn_workers(4, Arc::clone(&queue), running.clone(), move |n: usize| {
            sink.lock().unwrap().push(n);
        });

        for i in 0..50 {
            queue.push(i).unwrap();
        }
        queue.close();
        for worker in workers {
            worker.join().unwrap();
        }

        let mut drained = seen.lock().unwrap().clone();
        drained.sort_unstable();
        assert_eq!(drained, (0..50).collect::<Vec<_>>(), "every task must be handled exactly once");
    }

    #[test]
    fn test_workers_drop_tasks_after_shutdown() {
        let queue = Arc::new(TaskQueue::with_capacity(4));
        let running = RunFlag::new();
        running.stop();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let workers = queue::spawn_workers(1, Arc::clone(&queue), running, move |n: usize| {
            sink.lock().unwrap().push(n);
        });

        queue.push(42).unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(seen.lock().unwrap().is_empty(), "tasks dequeued after shutdown are dropped, not handled");
    }
}
