//! InitBlock - app ごとの共有リソース束

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Error type crossing the capability boundary (initializers, processors,
/// `close`). Business logic can use `?` on any error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application-owned bundle of shared resources (client handles, pools...).
///
/// Created once per application by its `Initializer`, owned by the
/// `InitBlockCache`, and lent to processors for one invocation at a time.
pub trait InitBlock: Send + Sync + 'static {
    /// Release resources. Called at engine shutdown or on eviction.
    fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl InitBlock for () {}

/// Type-erased, cheaply clonable handle to a cached `InitBlock`.
///
/// Keeps both an `Any` view (for downcasting to the processor's declared
/// block type) and an `InitBlock` view (for `close`) of the same allocation.
#[derive(Clone)]
pub struct SharedBlock {
    any: Arc<dyn Any + Send + Sync>,
    block: Arc<dyn InitBlock>,
    type_name: &'static str,
}

impl SharedBlock {
    pub fn new<B: InitBlock>(block: B) -> Self {
        let block = Arc::new(block);
        Self {
            any: block.clone(),
            block,
            type_name: type_name::<B>(),
        }
    }

    pub fn downcast_ref<B: InitBlock>(&self) -> Option<&B> {
        self.any.downcast_ref::<B>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn close(&self) -> Result<(), BoxError> {
        self.block.close()
    }
}

impl fmt::Debug for SharedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBlock")
            .field("type_name", &self.type_name)
            .finish()
    }
}
