/// Ticket-based two-room reader/writer lock.
///
/// Readers buy a ticket and line up in one of two "rooms" (`room[ticket & 1]`).
/// A writer buys the next ticket, waits for its turn, then closes the room
/// its ticket maps to and waits for the readers already inside to leave
/// before running. On unlock it opens the *next* room so the readers who
/// queued behind it can proceed while the writer after it (if any) closes
/// the room the first writer just vacated.
///
/// This gives writers priority over new readers without starving either
/// side: a writer never waits for readers that arrive after it bought its
/// ticket, and readers never wait longer than one writer's critical
/// section.
use std::sync::{Condvar, Mutex};

struct Room {
    nr_readers: u64,
    open: bool,
}

struct State {
    next_ticket: u64,
    reader_ticket: u64,
    writer_ticket: u64,
    rooms: [Room; 2],
}

pub struct RwLock {
    state: Mutex<State>,
    cond_writer: Condvar,
    cond_reader: [Condvar; 2],
}

/// Held by a reader between `reader_lock` and `reader_unlock`.
pub struct ReadTicket(u64);
/// Held by a writer between `writer_lock` and `writer_unlock`.
pub struct WriteTicket(u64);

impl Default for RwLock {
    fn default() -> Self {
        RwLock::new()
    }
}

impl RwLock {
    pub fn new() -> Self {
        RwLock {
            state: Mutex::new(State {
                next_ticket: 0,
                reader_ticket: 0,
                writer_ticket: 0,
                rooms: [
                    Room {
                        nr_readers: 0,
                        open: true,
                    },
                    Room {
                        nr_readers: 0,
                        open: false,
                    },
                ],
            }),
            cond_writer: Condvar::new(),
            cond_reader: [Condvar::new(), Condvar::new()],
        }
    }

    pub fn reader_lock(&self) -> ReadTicket {
        let mut state = self.state.lock().unwrap();
        let ticket = state.reader_ticket;
        let room = (ticket & 1) as usize;
        state.rooms[room].nr_readers += 1;
        while !state.rooms[room].open {
            state = self.cond_reader[room].wait(state).unwrap();
        }
        ReadTicket(ticket)
    }

    pub fn reader_unlock(&self, ticket: ReadTicket) {
        let mut state = self.state.lock().unwrap();
        let room = (ticket.0 & 1) as usize;
        state.rooms[room].nr_readers -= 1;
        if state.rooms[room].nr_readers == 0 {
            self.cond_writer.notify_all();
        }
    }

    pub fn writer_lock(&self) -> WriteTicket {
        let mut state = self.state.lock().unwrap();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while ticket != state.writer_ticket {
            state = self.cond_writer.wait(state).unwrap();
        }
        debug_assert_eq!(state.reader_ticket, state.writer_ticket);
        state.reader_ticket += 1;
        let room = (ticket & 1) as usize;
        while state.rooms[room].nr_readers > 0 {
            state = self.cond_writer.wait(state).unwrap();
        }
        state.rooms[room].open = false;
        WriteTicket(ticket)
    }

    pub fn writer_unlock(&self, ticket: WriteTicket) {
        let mut state = self.state.lock().unwrap();
        let room = (ticket.0 & 1) as usize;
        debug_assert_eq!(state.rooms[room].nr_readers, 0);
        let next_room = ((ticket.0 + 1) & 1) as usize;
        state.rooms[next_room].open = true;
        if state.rooms[next_room].nr_readers > 0 {
            self.cond_reader[next_room].notify_all();
        }
        state.writer_ticket += 1;
        self.cond_writer.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_reader_round_trip() {
        let lock = RwLock::new();
        let t = lock.reader_lock();
        lock.reader_unlock(t);
    }

    #[test]
    fn single_writer_round_trip() {
        let lock = RwLock::new();
        let t = lock.writer_lock();
        lock.writer_unlock(t);
    }

    #[test]
    fn writer_excludes_concurrent_readers() {
        let lock = Arc::new(RwLock::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = lock.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let t = lock.writer_lock();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    active.fetch_sub(1, Ordering::SeqCst);
                    lock.writer_unlock(t);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn many_readers_can_overlap() {
        let lock = Arc::new(RwLock::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            handles.push(thread::spawn(move || {
                let t = lock.reader_lock();
                thread::yield_now();
                lock.reader_unlock(t);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
