pub mod backend;
pub mod builder;
pub mod config;
pub mod ir;

pub use backend::{Assembler, Decompiler, Optimizer, OptimizerOptions, SpirvBinary};
pub use builder::{BuildError, ModuleBuilder};
pub use config::BuilderConfig;
