pub mod reset;

pub use reset::EspRestart;
