pub mod errors;
pub mod frame;
pub mod model;
pub mod params;

pub use errors::*;
pub use frame::*;
pub use model::*;
pub use params::*;
