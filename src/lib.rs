pub mod cache;
pub mod enricher;
pub mod ingest;
pub mod ipinfo;
pub mod lookup;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod ratelimit;
pub mod spotify;
