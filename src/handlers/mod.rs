pub mod health;
pub mod speak;
