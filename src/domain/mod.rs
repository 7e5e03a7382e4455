pub mod day_bucket;
pub mod models;
pub mod reconciler_state;
pub mod timer;
