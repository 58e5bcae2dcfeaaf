//! Decompressing reader: the mirror of the writer pipeline.
//!
//! Frames are read and entropy-decoded under the ordering token (frame
//! boundaries are only discoverable in stream order), then inverse
//! transforms and checksum verification run in parallel. Decoded blocks
//! are handed to the caller strictly in block order through a shared
//! completion map.

use crate::block::{RawFrame, read_block, restore_block};
use crate::event::{Event, EventKind, Listener};
use crate::header::{StreamHeader, read_header};
use crate::validate_jobs;
use crate::writer::OrderingCounter;
use cascade_core::bitstream::BitReader;
use cascade_core::error::{CascadeError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

struct CompletionMap {
    /// `Ok(Some(_))` is a decoded block, `Ok(None)` the terminator.
    ready: Mutex<HashMap<u64, Result<Option<Vec<u8>>>>>,
    next_emit: AtomicU64,
    condvar: Condvar,
}

struct DecoderShared<R: Read> {
    bs: Mutex<BitReader<R>>,
    order: OrderingCounter,
    aborted: AtomicBool,
    terminated: AtomicBool,
    next_read_id: AtomicU64,
    completions: CompletionMap,
    listeners: Vec<Arc<dyn Listener>>,
}

impl<R: Read> DecoderShared<R> {
    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.order.interrupt();
        let _guard = self.completions.ready.lock().unwrap();
        self.completions.condvar.notify_all();
    }

    fn publish(&self, block_id: u64, result: Result<Option<Vec<u8>>>) {
        let mut ready = self.completions.ready.lock().unwrap();
        ready.insert(block_id, result);
        self.completions.condvar.notify_all();
    }

    fn notify(&self, block_id: u64, size: usize, checksum: Option<u32>) {
        if self.listeners.is_empty() {
            return;
        }
        let event = Event {
            kind: EventKind::BlockDecoded,
            block_id,
            size,
            checksum,
        };
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

/// Read one frame under the token and restore it outside; returns `false`
/// when the worker should stop.
fn decode_one<R: Read>(shared: &DecoderShared<R>, header: &StreamHeader, block_id: u64) -> bool {
    if !shared.order.acquire(block_id, &shared.aborted) {
        return false;
    }
    if shared.terminated.load(Ordering::Acquire) {
        shared.order.release(block_id + 1);
        return false;
    }

    let frame = {
        let mut bs = shared.bs.lock().unwrap();
        read_block(&mut bs, header, block_id)
    };
    match frame {
        Ok(None) => {
            shared.terminated.store(true, Ordering::Release);
            shared.order.release(block_id + 1);
            shared.publish(block_id, Ok(None));
            false
        }
        Ok(Some(raw)) => {
            shared.order.release(block_id + 1);
            let checksum = raw.expected_checksum;
            match restore_block(raw, header) {
                Ok(data) => {
                    shared.notify(block_id, data.len(), checksum);
                    shared.publish(block_id, Ok(Some(data)));
                    true
                }
                Err(e) => {
                    shared.abort();
                    shared.publish(block_id, Err(e));
                    false
                }
            }
        }
        Err(e) => {
            shared.abort();
            shared.publish(block_id, Err(e));
            false
        }
    }
}

fn run_decode_worker<R: Read>(shared: &DecoderShared<R>, header: &StreamHeader, window: u64) {
    loop {
        let block_id = shared.next_read_id.fetch_add(1, Ordering::SeqCst);
        // Backpressure: stay within `window` blocks of the consumer.
        {
            let mut ready = shared.completions.ready.lock().unwrap();
            loop {
                if shared.aborted.load(Ordering::Acquire)
                    || shared.terminated.load(Ordering::Acquire)
                {
                    break;
                }
                if block_id < shared.completions.next_emit.load(Ordering::Acquire) + window {
                    break;
                }
                ready = shared.completions.condvar.wait(ready).unwrap();
            }
        }
        if !decode_one(shared, header, block_id) {
            return;
        }
    }
}

/// Decompressing reader over any byte source.
///
/// The stream header is read and validated on first use. Blocks are
/// delivered in order through [`Read`] or [`CompressedReader::next_block`].
pub struct CompressedReader<R: Read + Send + 'static> {
    shared: Arc<DecoderShared<R>>,
    jobs: usize,
    header: Option<StreamHeader>,
    handles: Vec<JoinHandle<()>>,
    current: Vec<u8>,
    offset: usize,
    next_emit: u64,
    finished: bool,
}

impl<R: Read + Send + 'static> CompressedReader<R> {
    /// Create a reader decoding with `jobs` worker threads (1..=16).
    pub fn new(source: R, jobs: usize) -> Result<Self> {
        Self::with_listeners(source, jobs, Vec::new())
    }

    /// Create a reader with progress listeners attached.
    pub fn with_listeners(
        source: R,
        jobs: usize,
        listeners: Vec<Arc<dyn Listener>>,
    ) -> Result<Self> {
        validate_jobs(jobs)?;
        Ok(Self {
            shared: Arc::new(DecoderShared {
                bs: Mutex::new(BitReader::new(source)),
                order: OrderingCounter::new(),
                aborted: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                next_read_id: AtomicU64::new(0),
                completions: CompletionMap {
                    ready: Mutex::new(HashMap::new()),
                    next_emit: AtomicU64::new(0),
                    condvar: Condvar::new(),
                },
                listeners,
            }),
            jobs,
            header: None,
            handles: Vec::new(),
            current: Vec::new(),
            offset: 0,
            next_emit: 0,
            finished: false,
        })
    }

    /// The stream header, once read.
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    fn initialize(&mut self) -> Result<()> {
        if self.header.is_some() {
            return Ok(());
        }
        let header = {
            let mut bs = self.shared.bs.lock().unwrap();
            read_header(&mut bs)?
        };
        log::debug!(
            "stream opened: entropy={}, transforms={:?}, block size {}, jobs {}",
            header.entropy.name(),
            header.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            header.block_size,
            self.jobs
        );
        if self.jobs > 1 {
            let window = 2 * self.jobs as u64;
            for _ in 0..self.jobs {
                let shared = Arc::clone(&self.shared);
                let header = header.clone();
                self.handles.push(std::thread::spawn(move || {
                    run_decode_worker(&shared, &header, window);
                }));
            }
        }
        self.header = Some(header);
        Ok(())
    }

    /// Next decoded block in order, or `None` at end of stream.
    pub fn next_block(&mut self) -> Result<Option<Vec<u8>>> {
        self.initialize()?;
        if self.finished {
            return Ok(None);
        }

        let result = if self.jobs == 1 {
            self.decode_inline()
        } else {
            self.await_block()
        };
        match &result {
            Ok(Some(_)) => {
                self.next_emit += 1;
                self.shared
                    .completions
                    .next_emit
                    .store(self.next_emit, Ordering::Release);
                let _guard = self.shared.completions.ready.lock().unwrap();
                self.shared.completions.condvar.notify_all();
            }
            _ => self.finished = true,
        }
        result
    }

    fn decode_inline(&mut self) -> Result<Option<Vec<u8>>> {
        let header = self.header.as_ref().expect("initialized");
        let block_id = self.next_emit;
        let frame: Option<RawFrame> = {
            let mut bs = self.shared.bs.lock().unwrap();
            read_block(&mut bs, header, block_id)?
        };
        match frame {
            None => Ok(None),
            Some(raw) => {
                let checksum = raw.expected_checksum;
                let data = restore_block(raw, header)?;
                self.shared.notify(block_id, data.len(), checksum);
                Ok(Some(data))
            }
        }
    }

    fn await_block(&mut self) -> Result<Option<Vec<u8>>> {
        let mut ready = self.shared.completions.ready.lock().unwrap();
        loop {
            if let Some(entry) = ready.remove(&self.next_emit) {
                return entry;
            }
            if self.shared.aborted.load(Ordering::Acquire) && ready.is_empty() {
                return Err(CascadeError::invalid_bitstream(
                    "decode pipeline aborted without a result",
                ));
            }
            ready = self.shared.completions.condvar.wait(ready).unwrap();
        }
    }
}

impl<R: Read + Send + 'static> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset == self.current.len() {
            match self.next_block()? {
                Some(block) => {
                    self.current = block;
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }
        let n = (self.current.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

impl<R: Read + Send + 'static> Drop for CompressedReader<R> {
    fn drop(&mut self) {
        self.shared.abort();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
