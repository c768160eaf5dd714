//! Runtime Configuration
//!
//! Each thread owns one reactive runtime. Its behaviour can be tuned with a
//! [`RuntimeConfig`] installed through [`Runtime::configure`].
//!
//! [`Runtime::configure`]: crate::reactive::Runtime::configure

use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;

/// Default ceiling for how often one subscriber may re-run within a flush.
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

/// Callback receiving errors that have no caller to be returned to.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

/// Callback invoked when the first subscriber is queued after an idle period.
pub type FlushHook = Rc<dyn Fn()>;

/// When queued subscribers get flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Flush as soon as the outermost write, run or batch completes.
    #[default]
    Sync,

    /// Only flush on an explicit [`flush`](crate::reactive::flush) call.
    ///
    /// The first enqueue after an idle period invokes the
    /// [`flush_requested`](RuntimeConfig::flush_requested) hook, so an event
    /// loop can schedule the flush.
    Deferred,
}

/// Per-thread runtime settings.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub flush_mode: FlushMode,
    pub recursion_limit: u32,
    pub error_handler: Option<ErrorHandler>,
    pub flush_requested: Option<FlushHook>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Sync,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            error_handler: None,
            flush_requested: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// Set the recursive-update ceiling. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ReactiveError) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    #[must_use]
    pub fn on_flush_requested<F>(mut self, hook: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.flush_requested = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("flush_mode", &self.flush_mode)
            .field("recursion_limit", &self.recursion_limit)
            .field("error_handler", &self.error_handler.is_some())
            .field("flush_requested", &self.flush_requested.is_some())
            .finish()
    }
}
