// Silver processing: transformation rules, quality checks, and silver loads

pub mod quality_gate;
pub mod silver_loader;
pub mod transform;

pub use silver_loader::SilverLoader;
