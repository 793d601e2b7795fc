pub mod speak;

pub use speak::*;
