pub mod command;
pub mod invoker;

pub use command::OverlayCommand;
pub use invoker::{FfmpegInvoker, TranscodeSuccess, Transcoder};
