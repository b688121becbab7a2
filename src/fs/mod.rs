pub mod barrier;
pub mod cmd;
pub mod mount;
