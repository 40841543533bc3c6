//! Progress events for the slow paths: image building and key derivation.
//!
//! The container owns an optional callback; components that perform long
//! operations emit through [`EventSink`].  Events cannot cancel the
//! operation — they exist purely so a CLI or GUI can render progress.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Image formatting started; `blocks` slots will be written.
    ImageBuildStart { blocks: u64 },
    /// One more block slot has been written out.
    ImageBuildUpdate { blocks_written: u64 },
    ImageBuildEnd,
    /// Key stretching started.  This is the slow step (scrypt, ~1 GiB at the
    /// default cost) and fires at most once per container open.
    KeyDerivationStart,
    KeyDerivationEnd,
}

/// Cloneable handle to the container's optional progress callback.
#[derive(Clone, Default)]
pub struct EventSink(Option<Rc<dyn Fn(ProgressEvent)>>);

impl EventSink {
    pub fn new<F: Fn(ProgressEvent) + 'static>(f: F) -> Self {
        EventSink(Some(Rc::new(f)))
    }

    pub fn none() -> Self {
        EventSink(None)
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(f) = &self.0 {
            f(event);
        }
    }
}
