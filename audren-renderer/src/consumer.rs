//! Hand-off of finished command lists to the mixing side
//!
//! A session produces at most one list per frame and must not queue a second
//! while the first is outstanding; `has_remaining_commands` is that
//! backpressure signal. Lists come back through `take_finished` so their
//! commands can return to the session's pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use tracing::{debug, error, info, trace, warn};

use crate::command::CommandList;

/// Consumer of per-session command lists
pub trait MixingConsumer: Send + Sync {
    /// Whether the session's previous list is still queued or executing
    fn has_remaining_commands(&self, session_id: u32) -> bool;

    /// Queue a list; gives it back when the session cannot accept one
    fn send(
        &self,
        session_id: u32,
        list: CommandList,
        deadline: u64,
        resource_id: u64,
    ) -> std::result::Result<(), CommandList>;

    /// Hand every executed list of the session to `reclaim`
    fn take_finished(&self, session_id: u32, reclaim: &mut dyn FnMut(CommandList));
}

/// Slots per direction; one list in flight plus one awaiting reclaim
const LINK_CAPACITY: usize = 2;

struct Submission {
    list: CommandList,
    deadline: u64,
    resource_id: u64,
}

/// SPSC links between one session and the mixer thread
struct SessionLink {
    submit_tx: Mutex<HeapProd<Submission>>,
    submit_rx: Mutex<HeapCons<Submission>>,
    done_tx: Mutex<HeapProd<CommandList>>,
    done_rx: Mutex<HeapCons<CommandList>>,
    in_flight: AtomicBool,
}

impl SessionLink {
    fn new() -> Self {
        let (submit_tx, submit_rx) = HeapRb::<Submission>::new(LINK_CAPACITY).split();
        let (done_tx, done_rx) = HeapRb::<CommandList>::new(LINK_CAPACITY).split();
        Self {
            submit_tx: Mutex::new(submit_tx),
            submit_rx: Mutex::new(submit_rx),
            done_tx: Mutex::new(done_tx),
            done_rx: Mutex::new(done_rx),
            in_flight: AtomicBool::new(false),
        }
    }
}

struct MixerShared {
    links: Vec<SessionLink>,
    /// Submissions not yet picked up by the worker
    pending: Mutex<usize>,
    condvar: Condvar,
    stop_flag: AtomicBool,
    executed_frames: AtomicU64,
    late_frames: AtomicU64,
}

/// Reference mixer: executes lists on a worker thread
///
/// Execution only accounts the summed cost of the enabled commands against
/// the submitted deadline; no samples are produced.
pub struct DspMixer {
    shared: Arc<MixerShared>,
    worker: Option<JoinHandle<()>>,
}

impl DspMixer {
    pub fn new(session_count: usize) -> Self {
        let shared = Arc::new(MixerShared {
            links: (0..session_count).map(|_| SessionLink::new()).collect(),
            pending: Mutex::new(0),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            executed_frames: AtomicU64::new(0),
            late_frames: AtomicU64::new(0),
        });

        let worker_state = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("audren-mixer".into())
            .spawn(move || Self::worker_loop(worker_state))
            .map_err(|e| error!("Failed to spawn mixer thread: {}", e))
            .ok();

        info!("DSP mixer started for {} sessions", session_count);
        Self { shared, worker }
    }

    /// Frames executed since start
    pub fn executed_frames(&self) -> u64 {
        self.shared.executed_frames.load(Ordering::Relaxed)
    }

    /// Frames whose enabled cost exceeded their deadline
    pub fn late_frames(&self) -> u64 {
        self.shared.late_frames.load(Ordering::Relaxed)
    }

    fn worker_loop(shared: Arc<MixerShared>) {
        debug!("Mixer worker started");
        loop {
            {
                let mut pending = shared.pending.lock().unwrap_or_else(|e| e.into_inner());
                while *pending == 0 && !shared.stop_flag.load(Ordering::Acquire) {
                    pending = shared.condvar.wait(pending).unwrap_or_else(|e| e.into_inner());
                }
                if shared.stop_flag.load(Ordering::Acquire) {
                    debug!("Mixer worker received shutdown signal");
                    break;
                }
                *pending = 0;
            }

            for (session_id, link) in shared.links.iter().enumerate() {
                let submission = link.submit_rx.lock().unwrap_or_else(|e| e.into_inner()).try_pop();
                if let Some(submission) = submission {
                    Self::execute(&shared, session_id, link, submission);
                }
            }
        }
    }

    fn execute(shared: &MixerShared, session_id: usize, link: &SessionLink, submission: Submission) {
        let cost = submission.list.enabled_estimated_time();
        if cost > submission.deadline {
            shared.late_frames.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Session {} frame over budget: {} > {} (resource {})",
                session_id,
                cost,
                submission.deadline,
                submission.resource_id
            );
        }
        shared.executed_frames.fetch_add(1, Ordering::Relaxed);

        let pushed = link
            .done_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_push(submission.list);
        if pushed.is_err() {
            // reclaim ring full: the commands are lost to the pool, which regrows
            warn!("Session {} reclaim ring full, dropping list", session_id);
        }
        link.in_flight.store(false, Ordering::Release);
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.stop_flag.store(true, Ordering::Release);
        {
            let _pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
            self.shared.condvar.notify_all();
        }
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.join() {
                error!("Mixer worker join failed: {:?}", e);
            }
            info!("DSP mixer shut down");
        }
    }
}

impl Drop for DspMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MixingConsumer for DspMixer {
    fn has_remaining_commands(&self, session_id: u32) -> bool {
        self.shared
            .links
            .get(session_id as usize)
            .is_some_and(|link| link.in_flight.load(Ordering::Acquire))
    }

    fn send(
        &self,
        session_id: u32,
        list: CommandList,
        deadline: u64,
        resource_id: u64,
    ) -> std::result::Result<(), CommandList> {
        let Some(link) = self.shared.links.get(session_id as usize) else {
            warn!("Mixer has no link for session {}", session_id);
            return Err(list);
        };
        if link.in_flight.swap(true, Ordering::AcqRel) {
            return Err(list);
        }
        let submission = Submission {
            list,
            deadline,
            resource_id,
        };
        if let Err(rejected) = link
            .submit_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_push(submission)
        {
            link.in_flight.store(false, Ordering::Release);
            return Err(rejected.list);
        }

        let mut pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending += 1;
        self.shared.condvar.notify_one();
        Ok(())
    }

    fn take_finished(&self, session_id: u32, reclaim: &mut dyn FnMut(CommandList)) {
        let Some(link) = self.shared.links.get(session_id as usize) else {
            return;
        };
        let mut done = link.done_rx.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(list) = done.try_pop() {
            reclaim(list);
        }
    }
}
