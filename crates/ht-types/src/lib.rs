pub mod dataset;
pub mod errors;
pub mod model;
pub mod statistic;
pub mod value;

pub use dataset::*;
pub use errors::*;
pub use model::*;
pub use statistic::*;
pub use value::*;
