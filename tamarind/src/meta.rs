use crate::Model;
use std::sync::Arc;

#[doc(hidden)]
pub use inventory;

#[doc(hidden)]
pub struct ModelMetadataWrapper(pub ModelMetadata);

inventory::collect!(ModelMetadataWrapper);

/// Compile-time registration of a model declared with
/// `#[model(register)]`.
pub struct ModelMetadata {
    collection_name: &'static str,
    model_ptr: fn() -> Arc<dyn Model>,
}

impl ModelMetadata {
    #[doc(hidden)]
    pub const fn new(collection_name: &'static str, model_ptr: fn() -> Arc<dyn Model>) -> Self {
        Self {
            collection_name,
            model_ptr,
        }
    }

    pub fn collection_name(&self) -> &'static str {
        self.collection_name
    }

    /// A fresh instance of the registered model.
    pub fn model(&self) -> Arc<dyn Model> {
        (self.model_ptr)()
    }
}

pub fn model_metadata() -> impl Iterator<Item = &'static ModelMetadata> {
    inventory::iter::<ModelMetadataWrapper>
        .into_iter()
        .map(|wrapper| &wrapper.0)
}

#[doc(hidden)]
pub fn model_of<M: Model + Default>() -> Arc<dyn Model> {
    Arc::new(M::default())
}
