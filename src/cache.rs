use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

// One cached file. Entries live in the arena below; the recency list links
// them by slot index, most recently used at the head.
struct Entry {
    filename: String,
    content: Arc<[u8]>,
    size: usize,
    last_accessed: SystemTime,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slots {
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
    index: FxHashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

// LRU cache of file contents, capacity-bounded in entry count. All mutation
// happens under one lock; hits hand out clones of the content handle taken
// under that lock, so readers never touch cache-owned bytes that a
// concurrent eviction could free, and no file or socket I/O ever runs while
// the lock is held.
pub struct FileCache {
    state: Mutex<Slots>,
    capacity: usize,
}

impl FileCache {
    pub fn with_capacity(capacity: usize) -> FileCache {
        FileCache {
            state: Mutex::new(Slots {
                entries: Vec::with_capacity(capacity),
                free: Vec::new(),
                index: FxHashMap::default(),
                head: None,
                tail: None,
                len: 0,
            }),
            capacity,
        }
    }

    // Looks up `filename`; a hit refreshes last_accessed, moves the entry to
    // the head of the recency list, and returns its content.
    pub fn get(&self, filename: &str) -> Option<Arc<[u8]>> {
        let mut slots = self.state.lock();
        let i = *slots.index.get(filename)?;
        {
            let entry = slots.entries[i].as_mut().unwrap();
            entry.last_accessed = SystemTime::now();
        }
        slots.unlink(i);
        slots.push_front(i);
        Some(Arc::clone(&slots.entries[i].as_ref().unwrap().content))
    }

    // Admits a copy of `bytes` at the head. An entry with the same filename
    // is replaced; otherwise, at capacity, the tail is evicted first.
    // Admission is best-effort: a zero-capacity cache simply never admits.
    pub fn insert(&self, filename: &str, bytes: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        let mut slots = self.state.lock();
        if let Some(i) = slots.index.get(filename).copied() {
            slots.remove(i);
        } else if slots.len == self.capacity {
            slots.evict_tail();
        }

        let entry = Entry {
            filename: filename.to_string(),
            content: Arc::from(bytes),
            size: bytes.len(),
            last_accessed: SystemTime::now(),
            prev: None,
            next: None,
        };
        let size = entry.size;
        let i = match slots.free.pop() {
            Some(i) => {
                slots.entries[i] = Some(entry);
                i
            }
            None => {
                slots.entries.push(Some(entry));
                slots.entries.len() - 1
            }
        };
        slots.index.insert(filename.to_string(), i);
        slots.push_front(i);
        slots.len += 1;
        println!("Added '{}' to cache (size: {} bytes)", filename, size);
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Filenames from most to least recently used.
    pub fn keys_mru(&self) -> Vec<String> {
        let slots = self.state.lock();
        let mut keys = Vec::with_capacity(slots.len);
        let mut cursor = slots.head;
        while let Some(i) = cursor {
            let entry = slots.entries[i].as_ref().unwrap();
            keys.push(entry.filename.clone());
            cursor = entry.next;
        }
        keys
    }
}

impl Slots {
    fn unlink(&mut self, i: usize) {
        let (prev, next) = {
            let entry = self.entries[i].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entries[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, i: usize) {
        let old_head = self.head;
        {
            let entry = self.entries[i].as_mut().unwrap();
            entry.prev = None;
            entry.next = old_head;
        }
        if let Some(h) = old_head {
            self.entries[h].as_mut().unwrap().prev = Some(i);
        }
        self.head = Some(i);
        if self.tail.is_none() {
            self.tail = Some(i);
        }
    }

    fn remove(&mut self, i: usize) -> Entry {
        self.unlink(i);
        let entry = self.entries[i].take().unwrap();
        self.index.remove(&entry.filename);
        self.free.push(i);
        self.len -= 1;
        entry
    }

    fn evict_tail(&mut self) {
        if let Some(t) = self.tail {
            let evicted = self.remove(t);
            println!("Evicting '{}' from cache", evicted.filename);
        }
    }
}
