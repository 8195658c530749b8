pub mod simulation;
pub mod story;
pub mod value;
