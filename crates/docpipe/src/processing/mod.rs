//! Background processing: durable task queue and worker pool

mod task_queue;
mod worker;

pub use task_queue::TaskQueue;
pub use worker::PipelineWorker;
