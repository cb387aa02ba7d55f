pub mod ash_device;
pub mod ash_queue;
pub mod host;
pub mod null_device;
