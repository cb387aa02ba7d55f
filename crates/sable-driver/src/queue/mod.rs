pub mod gpu_queue;
pub mod pm4;
pub mod processor;
