pub mod fade;

pub use fade::FadeDriver;
