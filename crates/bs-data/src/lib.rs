pub mod loaders;
pub mod splits;
pub mod storage;

pub use loaders::*;
pub use splits::*;
pub use storage::*;
