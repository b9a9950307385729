//! Test doubles shared by the unit tests: a loader whose every poll is scripted, and a clock that only moves when
//! told to.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::*;

#[derive(Clone)]
pub(crate) struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub(crate) fn new() -> ManualClock {
        ManualClock {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// One scripted poll result.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Progress(u64),
    Succeed(Vec<u8>),
    Fail(String),
    Reread,
}

#[derive(Default)]
struct ScriptState {
    /// Paths which complete on their first poll with these contents, once their script runs out.
    files: HashMap<String, Vec<u8>>,
    /// Paths which block forever once their script runs out.
    blocked: HashSet<String>,
    scripts: HashMap<String, VecDeque<Step>>,
    unsupported: HashSet<String>,
    /// Every start, in order.
    starts: Vec<(String, LoadPriority, u32)>,
    live_handles: usize,
    max_live_handles: usize,
    priority_updates: Vec<(String, LoadPriority)>,
}

/// A loader driven entirely by the test.  Clones share state.
#[derive(Clone, Default)]
pub(crate) struct ScriptedLoader {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedLoader {
    pub(crate) fn new() -> ScriptedLoader {
        Default::default()
    }

    /// `path` completes with `contents` whenever it is polled without a script.
    pub(crate) fn file(&self, path: &str, contents: impl Into<Vec<u8>>) -> &Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), contents.into());
        self
    }

    /// `path` stays pending at progress 0 until scripted otherwise.
    pub(crate) fn block(&self, path: &str) -> &Self {
        self.state.lock().unwrap().blocked.insert(path.to_string());
        self
    }

    pub(crate) fn unblock(&self, path: &str) {
        self.state.lock().unwrap().blocked.remove(path);
    }

    pub(crate) fn script(&self, path: &str, steps: impl IntoIterator<Item = Step>) -> &Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(path.to_string())
            .or_default()
            .extend(steps);
        self
    }

    pub(crate) fn unsupported(&self, path: &str) -> &Self {
        self.state.lock().unwrap().unsupported.insert(path.to_string());
        self
    }

    pub(crate) fn starts_of(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .starts
            .iter()
            .filter(|(p, _, _)| p == path)
            .count()
    }

    pub(crate) fn start_order(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .starts
            .iter()
            .map(|(p, _, _)| p.clone())
            .collect()
    }

    pub(crate) fn attempts_of(&self, path: &str) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .starts
            .iter()
            .filter(|(p, _, _)| p == path)
            .map(|(_, _, a)| *a)
            .collect()
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.state.lock().unwrap().live_handles
    }

    pub(crate) fn max_live_handles(&self) -> usize {
        self.state.lock().unwrap().max_live_handles
    }

    pub(crate) fn priority_updates(&self) -> Vec<(String, LoadPriority)> {
        self.state.lock().unwrap().priority_updates.clone()
    }
}

impl Loader for ScriptedLoader {
    fn start(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadHandle>, LoadError> {
        let mut state = self.state.lock().unwrap();
        state
            .starts
            .push((request.path.to_string(), request.priority, request.attempt));
        if state.unsupported.contains(request.path) {
            return Err(LoadError::Unsupported {
                path: request.path.to_string(),
                reason: "scripted".into(),
            });
        }
        state.live_handles += 1;
        state.max_live_handles = state.max_live_handles.max(state.live_handles);
        Ok(Box::new(ScriptedHandle {
            path: request.path.to_string(),
            state: self.state.clone(),
            progress: 0,
        }))
    }
}

struct ScriptedHandle {
    path: String,
    state: Arc<Mutex<ScriptState>>,
    progress: u64,
}

impl LoadHandle for ScriptedHandle {
    fn poll(&mut self) -> LoadPoll {
        let mut state = self.state.lock().unwrap();
        let step = state
            .scripts
            .get_mut(&self.path)
            .and_then(|s| s.pop_front());
        match step {
            Some(Step::Progress(p)) => {
                self.progress = p;
                LoadPoll::Pending { progress: p }
            }
            Some(Step::Succeed(bytes)) => LoadPoll::Fetched(bytes),
            Some(Step::Fail(msg)) => LoadPoll::Failed(LoadError::Transport(msg)),
            Some(Step::Reread) => LoadPoll::Reread,
            None if state.blocked.contains(&self.path) => LoadPoll::Pending {
                progress: self.progress,
            },
            None => match state.files.get(&self.path) {
                Some(bytes) => LoadPoll::Fetched(bytes.clone()),
                None => LoadPoll::Pending {
                    progress: self.progress,
                },
            },
        }
    }

    fn set_priority(&mut self, priority: LoadPriority) {
        self.state
            .lock()
            .unwrap()
            .priority_updates
            .push((self.path.clone(), priority));
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live_handles -= 1;
        }
    }
}
