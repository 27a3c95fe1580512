mod error_location;
mod snapshot;
mod worker_info;
