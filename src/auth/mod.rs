pub mod rotator;

pub use rotator::KeyRotator;
