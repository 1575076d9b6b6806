pub mod explorer;
pub mod report;
pub mod synth;

pub use explorer::*;
pub use report::*;
pub use synth::*;
