use std::sync::Arc;

use ash::vk;
use derive_getters::Getters;

use crate::foundation::host::{GfxOwnedObject, HostDevice};

/// 不持有内存的资源，因此不会被 resource tracker 跟踪
#[derive(Getters)]
pub struct GfxSampler {
    handle: vk::Sampler,
    name: String,

    #[getter(skip)]
    owner: Option<Arc<dyn HostDevice>>,
}
impl GfxSampler {
    pub fn new(device: Option<Arc<dyn HostDevice>>, handle: vk::Sampler, name: impl AsRef<str>) -> Self {
        Self {
            handle,
            name: name.as_ref().to_string(),
            owner: device,
        }
    }
}
impl Drop for GfxSampler {
    fn drop(&mut self) {
        if let Some(device) = self.owner.take() {
            device.destroy_object(GfxOwnedObject::Sampler(self.handle));
        }
    }
}
impl std::fmt::Debug for GfxSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sampler({}, {:?})", self.name, self.handle)
    }
}
