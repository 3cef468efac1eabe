//! Pages that have not been populated yet.
//!
//! Every page starts out uninitialized. It records what it will become and, optionally,
//! how to fill its first frame. The first claim that fills a frame successfully turns
//! the page into its concrete variant; a failed fill leaves it uninitialized.

use alloc::sync::Arc;
use core::{any::Any, fmt};

use pmm::FrameData;

use crate::{
    IoError,
    anon::AnonPage,
    file::FilePage,
    page::{PageKind, PageType},
};

/// Opaque, shared argument handed to an initializer.
pub type LoadPayload = Arc<dyn Any + Send + Sync>;

/// Fills a freshly claimed, zeroed frame.
pub type Initializer = fn(&mut FrameData, Option<&(dyn Any + Send + Sync)>) -> Result<(), IoError>;

/// A deferred initializer and its payload.
pub struct LazyLoad {
    init: Initializer,
    payload: Option<LoadPayload>,
}

impl LazyLoad {
    pub fn new(init: Initializer, payload: Option<LoadPayload>) -> Self {
        Self { init, payload }
    }

    pub fn payload(&self) -> Option<&LoadPayload> {
        self.payload.as_ref()
    }

    /// Returns a second descriptor for the same initializer, sharing the payload.
    pub fn share(&self) -> Self {
        Self {
            init: self.init,
            payload: self.payload.clone(),
        }
    }

    pub(crate) fn run(&self, data: &mut FrameData) -> Result<(), IoError> {
        (self.init)(data, self.payload.as_deref())
    }
}

impl fmt::Debug for LazyLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLoad")
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// The variant an uninitialized page turns into.
pub enum Target {
    Anonymous,
    File(FilePage),
}

impl Target {
    pub fn page_type(&self) -> PageType {
        match self {
            Self::Anonymous => PageType::Anonymous,
            Self::File(_) => PageType::File,
        }
    }

    fn duplicate(&self) -> Result<Self, IoError> {
        Ok(match self {
            Self::Anonymous => Self::Anonymous,
            Self::File(file) => Self::File(file.duplicate()?),
        })
    }
}

pub struct UninitPage {
    target: Target,
    init: Option<LazyLoad>,
}

impl UninitPage {
    pub fn new(target: Target, init: Option<LazyLoad>) -> Self {
        Self { target, init }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn lazy_load(&self) -> Option<&LazyLoad> {
        self.init.as_ref()
    }

    /// Fills the first frame: runs the initializer if there is one, otherwise reads a file
    /// target. Nothing is consumed, so a failed fill can be retried by a later claim.
    pub(crate) fn fill(&mut self, data: &mut FrameData) -> Result<(), IoError> {
        match (&self.init, &mut self.target) {
            (Some(init), _) => init.run(data),
            (None, Target::File(file)) => file.load(data),
            (None, Target::Anonymous) => Ok(()),
        }
    }

    /// Turns this page into its target variant. The initializer is dropped with it.
    pub fn promote(self) -> PageKind {
        match self.target {
            Target::Anonymous => PageKind::Anonymous(AnonPage::new()),
            Target::File(file) => PageKind::File(file),
        }
    }

    /// Copies the page for another address space. The payload is shared, not copied.
    pub(crate) fn duplicate(&self) -> Result<Self, IoError> {
        Ok(Self {
            target: self.target.duplicate()?,
            init: self.init.as_ref().map(LazyLoad::share),
        })
    }
}
