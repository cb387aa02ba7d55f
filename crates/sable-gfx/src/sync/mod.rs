pub mod gpu_event;
