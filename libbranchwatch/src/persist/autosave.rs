use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
};

use log::{debug, error};
use parking_lot::Mutex;

use super::PersistError;


enum Message {
    Write { path: PathBuf, data: Vec<u8> },
    Sync(Sender<()>),
}

/// Autosave state of one branch watch. Encoding happens on the caller's thread
/// (under the CPU guard), writing happens on a worker thread.
#[derive(Default)]
pub(crate) struct Autosave {
    enabled: bool,
    dirty: bool,
    path: Option<PathBuf>,
    worker: Option<Worker>,
    last_error: Arc<Mutex<Option<PersistError>>>,
}

impl Autosave {
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;

        if !enabled {
            // Dropping the worker finishes its queue first.
            self.worker = None;
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// The path to autosave to, if a save is due. Clears the dirty state.
    pub(crate) fn take_pending(&mut self) -> Option<PathBuf> {
        if !self.enabled || !self.dirty {
            return None;
        }

        let path = self.path.clone()?;
        self.dirty = false;

        Some(path)
    }

    pub(crate) fn submit(&mut self, path: PathBuf, data: Vec<u8>) {
        if self.worker.is_none() {
            self.worker = Worker::spawn(Arc::clone(&self.last_error));
        }

        let Some(worker) = &self.worker else {
            // Without a worker there's nothing better than writing inline.
            if let Err(e) = super::write_file(&path, &data) {
                error!("{}", e);
                self.report(e);
            }
            return;
        };

        worker.send(Message::Write { path, data });
    }

    pub(crate) fn sync(&self) {
        let Some(worker) = &self.worker else {
            return;
        };

        let (ack_tx, ack_rx) = mpsc::channel();
        worker.send(Message::Sync(ack_tx));

        let _ = ack_rx.recv();
    }

    pub(crate) fn report(&self, error: PersistError) {
        *self.last_error.lock() = Some(error);
    }

    pub(crate) fn take_error(&self) -> Option<PersistError> {
        self.last_error.lock().take()
    }
}

struct Worker {
    tx: Option<Sender<Message>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(last_error: Arc<Mutex<Option<PersistError>>>) -> Option<Self> {
        let (tx, rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("autosave".to_string())
            .spawn(move || worker_loop(rx, &last_error));

        match thread {
            Ok(thread) => Some(Self {
                tx: Some(tx),
                thread: Some(thread),
            }),
            Err(e) => {
                error!("Couldn't spawn the autosave thread: {}", e);
                None
            }
        }
    }

    fn send(&self, message: Message) {
        if let Some(tx) = &self.tx {
            if tx.send(message).is_err() {
                error!("Autosave worker is gone");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the queue is drained.
        self.tx = None;

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Autosave thread panicked");
            }
        }
    }
}

fn worker_loop(rx: Receiver<Message>, last_error: &Mutex<Option<PersistError>>) {
    let mut pending = None;

    while let Ok(message) = rx.recv() {
        // Only the newest image of a burst of changes is worth writing.
        for message in std::iter::once(message).chain(rx.try_iter()) {
            match message {
                Message::Write { path, data } => {
                    // Only writes to the same file replace each other.
                    if pending
                        .as_ref()
                        .is_some_and(|(pending_path, _)| *pending_path != path)
                    {
                        write_pending(&mut pending, last_error);
                    }

                    pending = Some((path, data));
                }
                Message::Sync(ack) => {
                    write_pending(&mut pending, last_error);
                    let _ = ack.send(());
                }
            }
        }

        write_pending(&mut pending, last_error);
    }
}

fn write_pending(
    pending: &mut Option<(PathBuf, Vec<u8>)>,
    last_error: &Mutex<Option<PersistError>>,
) {
    let Some((path, data)) = pending.take() else {
        return;
    };

    match super::write_file(&path, &data) {
        Ok(()) => debug!("Autosaved to '{}'", path.display()),
        Err(e) => {
            error!("Autosave failed: {}", e);
            *last_error.lock() = Some(e);
        }
    }
}
