pub mod stage;

pub use stage::Follower;
