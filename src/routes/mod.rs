pub mod speak;

pub use speak::create_speak_router;
