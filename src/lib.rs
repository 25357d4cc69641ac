pub mod alpha;
pub mod bounds;
pub mod core;
pub mod delayed_rejection;
pub mod error;
pub mod model;
pub mod parameter_set;
pub mod proposal;
pub mod sampler;
