pub mod messenger;
pub mod serve;
