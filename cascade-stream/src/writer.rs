//! Compressing writer: accumulates fixed-size blocks and pushes them
//! through checksum, transform, and entropy stages.
//!
//! Blocks are prepared (checksum + transforms) by a pool of worker threads
//! and emitted in strict block order: a task waits on the shared ordering
//! counter for its predecessor, writes its whole frame to the shared bit
//! writer, and releases the counter. With one job everything runs inline;
//! the emitted bytes are identical either way, because the write order is
//! the token order in both paths.

use crate::block::{prepare_block, write_block, write_terminator};
use crate::event::{Event, EventKind, Listener};
use crate::header::{StreamHeader, write_header};
use crate::{STREAM_VERSION, WriterConfig};
use cascade_core::bitstream::BitWriter;
use cascade_core::error::{CascadeError, Result};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// The block-order token: tasks may only touch the shared bit writer while
/// the counter equals their block id.
pub(crate) struct OrderingCounter {
    counter: Mutex<u64>,
    condvar: Condvar,
}

impl OrderingCounter {
    pub(crate) fn new() -> Self {
        Self {
            counter: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Park until it is `block_id`'s turn. Returns `false` when the
    /// pipeline aborted instead.
    pub(crate) fn acquire(&self, block_id: u64, aborted: &AtomicBool) -> bool {
        let mut counter = self.counter.lock().unwrap();
        loop {
            if aborted.load(Ordering::Acquire) {
                return false;
            }
            if *counter == block_id {
                return true;
            }
            counter = self.condvar.wait(counter).unwrap();
        }
    }

    /// Hand the token to `next`, waking every waiter.
    pub(crate) fn release(&self, next: u64) {
        *self.counter.lock().unwrap() = next;
        self.condvar.notify_all();
    }

    /// Current counter value.
    pub(crate) fn current(&self) -> u64 {
        *self.counter.lock().unwrap()
    }

    /// Wake waiters so they observe an abort.
    pub(crate) fn interrupt(&self) {
        let _guard = self.counter.lock().unwrap();
        self.condvar.notify_all();
    }
}

struct EncoderShared<W: Write> {
    bs: Mutex<BitWriter<W>>,
    order: OrderingCounter,
    aborted: AtomicBool,
    config: WriterConfig,
    listeners: Vec<Arc<dyn Listener>>,
}

impl<W: Write> EncoderShared<W> {
    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.order.interrupt();
    }

    fn notify(&self, kind: EventKind, block_id: u64, size: usize, checksum: Option<u32>) {
        if self.listeners.is_empty() {
            return;
        }
        let event = Event {
            kind,
            block_id,
            size,
            checksum,
        };
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

/// One block through checksum, transform, and (in turn) frame emission.
fn run_encode_task<W: Write>(shared: &EncoderShared<W>, block_id: u64, data: Vec<u8>) -> Result<()> {
    shared.notify(EventKind::BeforeTransform, block_id, data.len(), None);
    let prepared = match prepare_block(block_id, &data, &shared.config) {
        Ok(prepared) => prepared,
        Err(e) => {
            // Failing before the token would strand every successor, so
            // wake them through the abort flag instead.
            shared.abort();
            return Err(e);
        }
    };
    shared.notify(
        EventKind::AfterTransform,
        block_id,
        prepared.payload.len(),
        prepared.checksum,
    );

    if !shared.order.acquire(block_id, &shared.aborted) {
        // Another task failed; it owns the error report.
        return Ok(());
    }
    shared.notify(
        EventKind::BeforeEntropy,
        block_id,
        prepared.payload.len(),
        prepared.checksum,
    );
    let result = {
        let mut bs = shared.bs.lock().unwrap();
        write_block(&mut bs, &prepared, shared.config.entropy)
    };
    shared.order.release(block_id + 1);

    match result {
        Ok(()) => {
            shared.notify(
                EventKind::AfterEntropy,
                block_id,
                prepared.payload.len(),
                prepared.checksum,
            );
            Ok(())
        }
        Err(e) => {
            shared.abort();
            Err(e)
        }
    }
}

struct EncodePool {
    task_tx: Option<Sender<(u64, Vec<u8>)>>,
    results_rx: Receiver<Result<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl EncodePool {
    fn start<W: Write + Send + 'static>(shared: Arc<EncoderShared<W>>, jobs: usize) -> Self {
        // The bounded queue doubles as backpressure: at most `jobs` blocks
        // wait while `jobs` more are in flight.
        let (task_tx, task_rx) = bounded::<(u64, Vec<u8>)>(jobs);
        let (results_tx, results_rx) = unbounded();
        let handles = (0..jobs)
            .map(|_| {
                let task_rx = task_rx.clone();
                let results_tx = results_tx.clone();
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for (block_id, data) in task_rx.iter() {
                        let _ = results_tx.send(run_encode_task(&shared, block_id, data));
                    }
                })
            })
            .collect();
        Self {
            task_tx: Some(task_tx),
            results_rx,
            handles,
        }
    }

    fn submit(&self, block_id: u64, data: Vec<u8>) -> Result<()> {
        self.task_tx
            .as_ref()
            .expect("pool already drained")
            .send((block_id, data))
            .map_err(|_| CascadeError::block_failed(block_id, "worker pool is gone"))
    }

    /// First error already reported by finished tasks, without blocking.
    fn poll_error(&self) -> Result<()> {
        while let Ok(result) = self.results_rx.try_recv() {
            result?;
        }
        Ok(())
    }

    /// Stop accepting tasks, run the queue dry, and surface the first error.
    fn drain(mut self) -> Result<()> {
        self.task_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        let mut first_error = Ok(());
        while let Ok(result) = self.results_rx.try_recv() {
            if result.is_err() && first_error.is_ok() {
                first_error = result;
            }
        }
        first_error
    }
}

/// Compressing writer over any byte sink.
///
/// Bytes written through [`Write`] accumulate into blocks of the
/// configured size; each full block is dispatched to the pipeline. Call
/// [`CompressedWriter::close`] (or [`CompressedWriter::into_inner`]) to
/// flush the final partial block and the terminator frame.
pub struct CompressedWriter<W: Write + Send + 'static> {
    shared: Option<Arc<EncoderShared<W>>>,
    pool: Option<EncodePool>,
    buffer: Vec<u8>,
    next_block_id: u64,
    closed: bool,
}

impl<W: Write + Send + 'static> CompressedWriter<W> {
    /// Create a writer and emit the stream header.
    pub fn new(sink: W, config: WriterConfig) -> Result<Self> {
        Self::with_listeners(sink, config, Vec::new())
    }

    /// Create a writer with progress listeners attached.
    pub fn with_listeners(
        sink: W,
        config: WriterConfig,
        listeners: Vec<Arc<dyn Listener>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut bs = BitWriter::new(sink);
        let header = StreamHeader {
            version: STREAM_VERSION,
            checksum: config.checksum,
            entropy: config.entropy,
            transforms: config.transforms.clone(),
            block_size: config.block_size,
        };
        write_header(&mut bs, &header)?;
        log::debug!(
            "stream opened: entropy={}, transforms={:?}, block size {}, jobs {}",
            config.entropy.name(),
            config.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            config.block_size,
            config.jobs
        );

        let block_size = config.block_size;
        let shared = Arc::new(EncoderShared {
            bs: Mutex::new(bs),
            order: OrderingCounter::new(),
            aborted: AtomicBool::new(false),
            config,
            listeners,
        });
        Ok(Self {
            shared: Some(shared),
            pool: None,
            buffer: Vec::with_capacity(block_size),
            next_block_id: 0,
            closed: false,
        })
    }

    fn shared(&self) -> &Arc<EncoderShared<W>> {
        self.shared.as_ref().expect("writer already consumed")
    }

    /// Number of blocks fully emitted so far.
    pub fn blocks_written(&self) -> u64 {
        self.shared().order.current()
    }

    /// Buffer bytes, dispatching every full block to the pipeline.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(CascadeError::StreamClosed);
        }
        if let Some(pool) = &self.pool {
            pool.poll_error()?;
        }
        let block_size = self.shared().config.block_size;
        while !data.is_empty() {
            let room = block_size - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == block_size {
                self.dispatch()?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<()> {
        let data = std::mem::take(&mut self.buffer);
        let block_id = self.next_block_id;
        self.next_block_id += 1;
        // The worker pool spins up with the first dispatched block.
        let jobs = self.shared().config.jobs;
        if jobs > 1 && self.pool.is_none() {
            let shared = Arc::clone(self.shared());
            self.pool = Some(EncodePool::start(shared, jobs));
        }
        match &self.pool {
            Some(pool) => pool.submit(block_id, data),
            None => run_encode_task(self.shared(), block_id, data),
        }
    }

    /// Flush the final partial block, drain the pipeline, and write the
    /// terminator frame. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = if self.buffer.is_empty() {
            Ok(())
        } else {
            self.dispatch()
        };
        if let Some(pool) = self.pool.take() {
            let drained = pool.drain();
            if result.is_ok() {
                result = drained;
            }
        }
        result?;

        let shared = self.shared();
        if shared.aborted.load(Ordering::Acquire) {
            return Err(CascadeError::invalid_argument(
                "pipeline aborted before close",
            ));
        }
        let mut bs = shared.bs.lock().unwrap();
        write_terminator(&mut bs)?;
        bs.close()?;
        log::debug!("stream closed after {} blocks", self.next_block_id);
        Ok(())
    }

    /// Close the stream and return the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.close()?;
        let shared = self
            .shared
            .take()
            .expect("writer already consumed");
        let shared = Arc::try_unwrap(shared).map_err(|_| {
            CascadeError::invalid_argument("worker threads still hold the writer")
        })?;
        let bs = shared
            .bs
            .into_inner()
            .map_err(|_| CascadeError::invalid_argument("bit writer mutex poisoned"))?;
        bs.into_inner()
    }
}

impl<W: Write + Send + 'static> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Blocks are framed units; partial blocks only flush at close.
        Ok(())
    }
}
