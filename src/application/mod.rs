pub mod alerts;
pub mod evaluate;
pub mod pricing;
pub mod profiles;
pub mod retry;
pub mod scheduler;
pub mod work_queue;
