pub mod index;

pub use index::{ScreenBox, ScreenGrid};
